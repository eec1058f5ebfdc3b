//! Logging initialization for the session client.

use crate::Paths;

/// Initialize logging for `service_name`.
///
/// Structured JSONL goes to `Paths::log_file()`; human-readable lines are
/// also written to stderr when `also_stderr` is set. `RUST_LOG` overrides
/// `level`.
///
/// ```ignore
/// init_logging("sessionctl", "info", &paths, false);
/// tracing::info!("ready");
/// ```
pub fn init_logging(service_name: &str, level: &str, paths: &Paths, also_stderr: bool) {
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).as_str().to_ascii_lowercase(),
        log_path: Some(paths.log_file()),
        also_stderr,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

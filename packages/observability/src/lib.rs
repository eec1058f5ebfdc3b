//! # Observability
//!
//! Tracing setup shared by the session client crates.
//!
//! Crates are **log producers**. They call `observability::init()` (or
//! `init_with_config`) once at startup and use standard `tracing` macros
//! everywhere else. Where the lines end up is decided here:
//!
//! - without a `log_path`, compact human-readable lines go to stderr;
//! - with a `log_path`, structured JSONL is appended to that file and stderr
//!   output becomes optional.
//!
//! Field values that look like credentials are redacted before they reach
//! the JSONL file. See [`redact`].
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "sessionctl".into(),
//!     default_level: "debug".into(),
//!     log_path: Some("/tmp/sessionctl.jsonl".into()),
//!     also_stderr: true,
//! });
//! ```

mod file_writer;
mod json_layer;
pub mod redact;

use std::io;
use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use file_writer::{FileLogWriter, WriterFactory};
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "sessionctl").
    /// Included in every JSONL line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional JSONL log file. When unset, logs go to stderr only.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr when a log file is configured.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with default settings for `service_name`.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Calling this more than once is harmless: only the first subscriber is
/// installed. If the log file cannot be opened, logging falls back to stderr.
pub fn init_with_config(config: LogConfig) {
    let Some(log_path) = config.log_path.clone() else {
        init_stderr_only(&config);
        return;
    };

    let writer = match FileLogWriter::new(&log_path) {
        Ok(writer) => writer,
        Err(e) => {
            init_stderr_only(&config);
            tracing::warn!(
                log_path = %log_path.display(),
                error = %e,
                "failed to open log file, logging to stderr only"
            );
            return;
        }
    };

    let json_layer = JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer));

    let stderr_layer = if config.also_stderr {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(io::stderr)
                .with_filter(env_filter(&config.default_level)),
        )
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(json_layer.with_filter(env_filter(&config.default_level)))
        .with(stderr_layer)
        .try_init();

    tracing::debug!(log_path = %log_path.display(), "observability initialized");
}

fn init_stderr_only(config: &LogConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.default_level))
        .with_target(true)
        .with_writer(io::stderr)
        .compact()
        .try_init();
}

/// `RUST_LOG` wins over the configured default.
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

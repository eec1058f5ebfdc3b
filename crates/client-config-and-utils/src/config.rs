//! Configuration management for the session client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default API base URL (can be overridden at compile time via SESSIONCTL_API_BASE_URL).
pub const DEFAULT_API_BASE_URL: &str = match option_env!("SESSIONCTL_API_BASE_URL") {
    Some(url) => url,
    None => "http://localhost:8000",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Tokens are renewed once less than this many minutes of lifetime remain.
pub const DEFAULT_REFRESH_WINDOW_MINUTES: u64 = 10;

/// Per-request timeout applied by the HTTP transport.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const ENV_LOG_LEVEL: &str = "SESSIONCTL_LOG_LEVEL";
const ENV_API_BASE_URL: &str = "SESSIONCTL_API_BASE_URL";

/// Main client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Backend origin, e.g. `https://api.example.com`. Paths such as
    /// `/api/v1/auth/login` are appended to it.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Minutes before expiry at which the access token is renewed.
    #[serde(default = "default_refresh_window_minutes")]
    pub refresh_window_minutes: u64,
    /// Treat a request that fails without any HTTP response as a possible
    /// hidden 401 and attempt one refresh-and-retry.
    #[serde(default = "default_retry_masked_network_failures")]
    pub retry_masked_network_failures: bool,
    /// Timeout for a single HTTP request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_refresh_window_minutes() -> u64 {
    DEFAULT_REFRESH_WINDOW_MINUTES
}

fn default_retry_masked_network_failures() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            api_base_url: default_api_base_url(),
            refresh_window_minutes: DEFAULT_REFRESH_WINDOW_MINUTES,
            retry_masked_network_failures: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(log_level) = lookup(ENV_LOG_LEVEL).and_then(non_empty) {
            self.log_level = log_level;
        }
        if let Some(api_base_url) = lookup(ENV_API_BASE_URL).and_then(non_empty) {
            self.api_base_url = api_base_url;
        }
    }

    /// Reject values the session layer cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_base_url()?;
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.refresh_window_minutes == 0 {
            return Err(CoreError::Config(
                "refresh_window_minutes must be greater than zero".to_string(),
            ));
        }
        if self.refresh_window_minutes.checked_mul(60).is_none() {
            return Err(CoreError::Config(format!(
                "refresh_window_minutes is too large: {}",
                self.refresh_window_minutes
            )));
        }
        Ok(())
    }

    /// Get the API base URL as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    /// Base URL without a trailing slash, ready for path concatenation.
    pub fn api_origin(&self) -> String {
        self.api_base_url.trim_end_matches('/').to_string()
    }

    pub fn refresh_window(&self) -> Duration {
        Duration::from_secs(self.refresh_window_minutes.saturating_mul(60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.refresh_window_minutes, 10);
        assert!(config.retry_masked_network_failures);
        assert_eq!(config.refresh_window(), Duration::from_secs(600));
    }

    #[test]
    fn test_config_load_from_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(&config_path, r#"{ "log_level": "debug" }"#).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            api_base_url: "https://api.example.com".to_string(),
            refresh_window_minutes: 5,
            retry_masked_network_failures: false,
            ..Config::default()
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.refresh_window_minutes, DEFAULT_REFRESH_WINDOW_MINUTES);
    }

    #[test]
    fn test_config_load_rejects_invalid_url() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        std::fs::write(
            paths.config_file(),
            r#"{ "log_level": "info", "api_base_url": "not a url" }"#,
        )
        .unwrap();

        assert!(matches!(
            Config::load(&paths),
            Err(CoreError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_refresh_window_bounds() {
        let zero = Config {
            refresh_window_minutes: 0,
            ..Config::default()
        };
        assert!(matches!(zero.validate(), Err(CoreError::Config(_))));

        let huge = Config {
            refresh_window_minutes: u64::MAX,
            ..Config::default()
        };
        assert!(matches!(huge.validate(), Err(CoreError::Config(_))));
        assert_eq!(huge.refresh_window(), Duration::from_secs(u64::MAX));

        let largest = Config {
            refresh_window_minutes: u64::MAX / 60,
            ..Config::default()
        };
        assert!(largest.validate().is_ok());
    }

    #[test]
    fn test_config_load_rejects_zero_refresh_window() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        std::fs::write(
            paths.config_file(),
            r#"{ "log_level": "info", "refresh_window_minutes": 0 }"#,
        )
        .unwrap();

        assert!(matches!(Config::load(&paths), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_overrides_ignore_blank_values() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            ENV_LOG_LEVEL => Some("  ".to_string()),
            ENV_API_BASE_URL => Some("https://staging.example.com/".to_string()),
            _ => None,
        });

        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, "https://staging.example.com/");
        assert_eq!(config.api_origin(), "https://staging.example.com");
    }
}

//! Configuration file parsing and structures.
//!
//! emberd uses TOML for declarative configuration. Integrations are native
//! Rust modules configured under `[integrations.*]`; an absent table disables
//! the integration entirely.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing_subscriber::filter::LevelFilter;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("invalid log level '{}'", other)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,
}

/// HTTP API server configuration
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind the API server to
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_listen(),
            port: default_port(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8565
}

/// Integration configuration container
#[derive(Debug, Default, Deserialize)]
pub struct IntegrationsConfig {
    /// Intellifire fireplace integration
    #[serde(default)]
    pub intellifire: Option<IntellifireConfig>,
}

/// Intellifire integration configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IntellifireConfig {
    /// Cloud account username
    pub username: String,

    /// Cloud account password
    pub password: String,

    /// Base URL of the vendor cloud API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Seconds between automatic state polls. Zero means the cached state is
    /// never trusted and every tick forces a live query.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Disable automatic polling entirely. The cached state is then only
    /// updated by explicit refresh requests or pushed notifications.
    #[serde(default)]
    pub never_poll: bool,

    /// Local network address per fireplace serial. A fireplace with an entry
    /// here is driven over the local challenge-response protocol instead of
    /// the cloud.
    #[serde(default)]
    pub local: HashMap<String, String>,
}

fn default_base_url() -> String {
    "https://iftapi.net/a".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

impl IntellifireConfig {
    /// The configured poll interval, or `None` for never-poll mode.
    pub fn poll_interval(&self) -> Option<Duration> {
        if self.never_poll {
            None
        } else {
            Some(Duration::from_secs(self.poll_interval_secs))
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [integrations.intellifire]
            username = "user@example.com"
            password = "hunter2"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.api.enabled);
        assert_eq!(config.api.port, 8565);

        let ift = config.integrations.intellifire.as_ref().unwrap();
        assert_eq!(ift.username, "user@example.com");
        assert_eq!(ift.base_url, "https://iftapi.net/a");
        assert_eq!(ift.poll_interval_secs, 60);
        assert!(!ift.never_poll);
        assert!(ift.local.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [logging]
            level = "debug"

            [api]
            listen = "0.0.0.0"
            port = 9000

            [integrations.intellifire]
            username = "user@example.com"
            password = "hunter2"
            base_url = "http://localhost:8080/a"
            poll_interval_secs = 30

            [integrations.intellifire.local]
            ABC123 = "192.168.1.40"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.api.listen, "0.0.0.0");
        assert_eq!(config.api.port, 9000);

        let ift = config.integrations.intellifire.as_ref().unwrap();
        assert_eq!(ift.poll_interval_secs, 30);
        assert_eq!(ift.local.get("ABC123").unwrap(), "192.168.1.40");
    }

    #[test]
    fn test_no_integrations() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.integrations.intellifire.is_none());
    }

    #[test]
    fn test_poll_interval_modes() {
        let base = |extra: &str| -> IntellifireConfig {
            let toml = format!(
                "username = \"u\"\npassword = \"p\"\n{}",
                extra
            );
            toml::from_str(&toml).unwrap()
        };

        assert_eq!(
            base("").poll_interval(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            base("poll_interval_secs = 0").poll_interval(),
            Some(Duration::ZERO)
        );
        assert_eq!(base("never_poll = true").poll_interval(), None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [integrations.intellifire]
            username = "user@example.com"
            password = "hunter2"
            "#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.integrations.intellifire.is_some());
    }

    #[test]
    fn test_missing_file_error() {
        let err = Config::from_file("/nonexistent/emberd.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
        assert!(err.to_string().contains("/nonexistent/emberd.toml"));
    }
}

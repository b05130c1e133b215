//! Configuration management for distributable-session.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::ServerConfig;
use crate::cli::Args;
use crate::manager::{max_from_signed, ManagerConfig, DEFAULT_DEPLOYMENT_NAME};

/// Process-wide switch allowing sessions whose owning node has left the
/// cluster to be served by this node.
pub const ALLOW_ORPHAN_SESSION_VAR: &str = "DIST_SESSION_ALLOW_ORPHAN_SESSION";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerSection,
    /// Session manager configuration.
    pub session: SessionSection,
    /// Logging configuration.
    pub logging: LoggingSection,
    /// Resolved once from [`ALLOW_ORPHAN_SESSION_VAR`] by [`Config::load`].
    #[serde(skip)]
    pub orphan_session_allowed: bool,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Session manager configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Name of the deployment the manager serves.
    pub deployment_name: String,
    /// Inactive interval given to new sessions; 0 disables expiration.
    pub default_timeout_secs: u64,
    /// Upper bound on active sessions. Null or negative means unbounded.
    pub max_active_sessions: Option<i64>,
    /// Collect session statistics.
    pub statistics_enabled: bool,
    /// Period of the background expiration sweep.
    pub expiration_interval_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            deployment_name: DEFAULT_DEPLOYMENT_NAME.to_string(),
            default_timeout_secs: 30 * 60,
            max_active_sessions: None,
            statistics_enabled: true,
            expiration_interval_secs: 60,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DIST_SESSION_HOST") {
            self.server.host = host;
        }

        if let Some(port) = lookup("DIST_SESSION_PORT") {
            self.server.port = parse_value("DIST_SESSION_PORT", &port)?;
        }

        if let Some(max) = lookup("DIST_SESSION_MAX_ACTIVE") {
            self.session.max_active_sessions = Some(parse_value("DIST_SESSION_MAX_ACTIVE", &max)?);
        }

        if let Some(timeout) = lookup("DIST_SESSION_DEFAULT_TIMEOUT") {
            self.session.default_timeout_secs =
                parse_value("DIST_SESSION_DEFAULT_TIMEOUT", &timeout)?;
        }

        if let Some(level) = lookup("DIST_SESSION_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }

        if let Some(port) = args.port {
            self.server.port = port;
        }

        if let Some(ref name) = args.deployment {
            self.session.deployment_name = name.clone();
        }

        if let Some(max) = args.max_sessions {
            self.session.max_active_sessions = Some(max);
        }

        if let Some(timeout) = args.timeout_secs {
            self.session.default_timeout_secs = timeout;
        }

        if args.no_statistics {
            self.session.statistics_enabled = false;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Config::default();

        // Load from config file if specified
        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        // Apply environment variable overrides
        config.apply_env()?;

        // Apply CLI argument overrides (highest priority)
        config.apply_args(args);

        config.orphan_session_allowed = std::env::var(ALLOW_ORPHAN_SESSION_VAR)
            .map(|value| parse_flag(&value))
            .unwrap_or(false);

        Ok(config)
    }

    /// Convert to the session manager configuration.
    pub fn to_manager_config(&self) -> ManagerConfig {
        let session = &self.session;
        ManagerConfig::new(session.deployment_name.clone())
            .with_default_timeout(Duration::from_secs(session.default_timeout_secs))
            .with_max_active_sessions(session.max_active_sessions.and_then(max_from_signed))
            .with_statistics(session.statistics_enabled)
            .with_orphan_session_allowed(self.orphan_session_allowed)
    }

    /// Convert to ServerConfig for the API server.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        Ok(ServerConfig::new(host.to_string(), self.server.port))
    }

    /// Period of the background expiration sweep. `None` disables it.
    pub fn expiration_interval(&self) -> Option<Duration> {
        match self.session.expiration_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn parse_value<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name, value.to_string()))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
    /// Environment variable with an unparsable value.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
            Self::InvalidValue(name, value) => write!(f, "invalid value for {}: '{}'", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.session.deployment_name, "ROOT");
        assert_eq!(config.session.default_timeout_secs, 1800);
        assert!(config.session.max_active_sessions.is_none());
        assert!(config.session.statistics_enabled);
        assert!(!config.orphan_session_allowed);
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "server": {
                "host": "0.0.0.0",
                "port": 8080
            },
            "session": {
                "deployment_name": "shop",
                "max_active_sessions": 500,
                "statistics_enabled": false
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.session.deployment_name, "shop");
        assert_eq!(config.session.max_active_sessions, Some(500));
        assert!(!config.session.statistics_enabled);
        assert_eq!(config.session.default_timeout_secs, 1800);
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{
            "server": {
                "port": 9000
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1"); // Default
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_orphan_flag_not_read_from_file() {
        let json = r#"{"orphan_session_allowed": true}"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(!config.orphan_session_allowed);
    }

    #[test]
    fn test_apply_env() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[
                ("DIST_SESSION_HOST", "10.0.0.1"),
                ("DIST_SESSION_PORT", "4000"),
                ("DIST_SESSION_MAX_ACTIVE", "25"),
                ("DIST_SESSION_DEFAULT_TIMEOUT", "120"),
                ("DIST_SESSION_LOG_LEVEL", "debug"),
            ]))
            .unwrap();

        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.session.max_active_sessions, Some(25));
        assert_eq!(config.session.default_timeout_secs, 120);
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_apply_env_invalid_port() {
        let mut config = Config::default();
        let result = config.apply_env_from(env(&[("DIST_SESSION_PORT", "http")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue("DIST_SESSION_PORT", _))
        ));
    }

    #[test]
    fn test_rust_log_fallback() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[("RUST_LOG", "trace")]))
            .unwrap();
        assert_eq!(config.log_filter(), "trace");
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        let args = Args {
            host: Some("192.168.1.1".parse().unwrap()),
            port: Some(5000),
            deployment: Some("cart".to_string()),
            max_sessions: Some(10),
            no_statistics: true,
            ..Args::default()
        };

        config.apply_args(&args);

        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.session.deployment_name, "cart");
        assert_eq!(config.session.max_active_sessions, Some(10));
        assert!(!config.session.statistics_enabled);
    }

    #[test]
    fn test_args_override_env() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[("DIST_SESSION_PORT", "4000")]))
            .unwrap();
        config.apply_args(&Args {
            port: Some(5000),
            ..Args::default()
        });
        assert_eq!(config.server.port, 5000);

        let mut config = Config::default();
        config
            .apply_env_from(env(&[("DIST_SESSION_PORT", "4000")]))
            .unwrap();
        config.apply_args(&Args::default());
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn test_to_manager_config() {
        let mut config = Config::default();
        config.session.deployment_name = "shop".to_string();
        config.session.default_timeout_secs = 60;
        config.session.max_active_sessions = Some(3);
        config.orphan_session_allowed = true;

        let manager = config.to_manager_config();
        assert_eq!(manager.deployment_name, "shop");
        assert_eq!(manager.default_timeout, Duration::from_secs(60));
        assert_eq!(manager.max_active_sessions, Some(3));
        assert!(manager.statistics_enabled);
        assert!(manager.orphan_session_allowed);
    }

    #[test]
    fn test_negative_max_is_unbounded() {
        let mut config = Config::default();
        config.session.max_active_sessions = Some(-1);
        assert_eq!(config.to_manager_config().max_active_sessions, None);
    }

    #[test]
    fn test_to_server_config() {
        let config = Config::default();
        let server_config = config.to_server_config().unwrap();

        assert_eq!(server_config.host, "127.0.0.1");
        assert_eq!(server_config.port, 3000);
    }

    #[test]
    fn test_invalid_host() {
        let mut config = Config::default();
        config.server.host = "not-an-ip".to_string();

        let result = config.to_server_config();
        assert!(result.is_err());
    }

    #[test]
    fn test_expiration_interval() {
        let mut config = Config::default();
        assert_eq!(config.expiration_interval(), Some(Duration::from_secs(60)));
        config.session.expiration_interval_secs = 0;
        assert_eq!(config.expiration_interval(), None);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"host\""));
        assert!(json.contains("\"deployment_name\""));
        assert!(!json.contains("orphan_session_allowed"));
    }
}

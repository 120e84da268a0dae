//! Configuration types for servers and their supervised launch.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::logging::LoggingConfig;

/// Default capacity of the task result pool.
pub const DEFAULT_MAX_POOL_SIZE: usize = 8192;
/// Default time-to-live of a task result, in seconds.
pub const DEFAULT_MAX_TIMEOUT_SECS: u64 = 1800;
/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Errors that can occur while validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value the platform cannot operate with.
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Configuration of one agent platform server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Hostname clients use to reach the server.
    pub host: String,
    /// Requested port; `None` auto-assigns at launch.
    pub port: Option<u16>,
    /// Bind the loopback interface only instead of all interfaces.
    pub local_mode: bool,
    /// Max number of task results the server can accommodate.
    pub max_pool_size: usize,
    /// Seconds before a task result expires.
    pub max_timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: None,
            local_mode: true,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            max_timeout_secs: DEFAULT_MAX_TIMEOUT_SECS,
        }
    }
}

impl PlatformConfig {
    /// Result TTL as a duration.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_timeout_secs)
    }

    /// Checks the configuration for values the platform cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Validation("host must not be empty".into()));
        }
        if self.max_pool_size == 0 {
            return Err(ConfigError::Validation(
                "max_pool_size must be at least 1".into(),
            ));
        }
        if self.max_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "max_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Process-wide settings a launched server replays at startup.
///
/// Passed explicitly over the launcher's bootstrap channel so the server
/// thread initializes exactly like its parent, without hidden globals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitConfig {
    /// Logging setup to replay; `None` leaves logging untouched.
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl InitConfig {
    /// Applies the settings, tolerating a process that is already set up.
    pub fn apply(&self) {
        if let Some(logging) = &self.logging {
            if super::logging::init_logging(logging).is_err() {
                tracing::debug!("logging already initialized, keeping existing setup");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlatformConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_pool_size, 8192);
        assert_eq!(config.max_age(), Duration::from_secs(1800));
        assert!(config.local_mode);
        assert!(config.port.is_none());
    }

    #[test]
    fn test_zero_pool_size_is_rejected() {
        let config = PlatformConfig {
            max_pool_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = PlatformConfig {
            port: Some(8123),
            local_mode: false,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let decoded: PlatformConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.port, Some(8123));
        assert!(!decoded.local_mode);
    }
}

//! Structured logging setup.
//!
//! Logs go to stdout through `tracing-subscriber`, either as JSON for
//! aggregation or in a human-readable format for development. The level is
//! overridable through `RUST_LOG`.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (structured).
    Json,
    /// Pretty format (human-readable).
    Pretty,
    /// Compact format (minimal).
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Base log level (TRACE, DEBUG, INFO, WARN, ERROR).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "INFO".to_string(),
        }
    }
}

/// Error type for logging operations.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Initialization error.
    #[error("Failed to initialize logging: {0}")]
    Initialization(String),
}

/// Initializes the logging system; call once at process startup.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(io::stdout),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(io::stdout))
            .try_init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(io::stdout))
            .try_init(),
    };
    result.map_err(|err| LoggingError::Initialization(err.to_string()))
}

/// Initializes JSON logging at INFO level.
pub fn init_default_logging() -> Result<(), LoggingError> {
    init_logging(&LoggingConfig::default())
}

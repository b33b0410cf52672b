//! Telemetry error types.

/// Errors from configuring or installing the log subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The logging configuration is invalid.
    #[error("invalid logging configuration: {0}")]
    ConfigError(String),

    /// The global subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    InitError(String),

    /// The log destination could not be prepared.
    #[error("log output error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

//! Telemetry error types

use thiserror::Error;

/// Errors that can occur while installing the subscriber
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Invalid configuration
    #[error("Invalid telemetry configuration: {0}")]
    InvalidConfiguration(String),

    /// A global subscriber is already installed, or installation failed
    #[error("Tracing subscriber error: {0}")]
    TracingError(String),
}

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while setting up a `tracing` subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The requested log level or filter directive could not be parsed.
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),

    /// A global subscriber was already installed for this process.
    #[error("global tracing subscriber already set")]
    AlreadyInitialized,
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

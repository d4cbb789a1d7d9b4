//! Configuration error types.

use thiserror::Error;

/// Errors from loading or validating [`crate::ClientConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but is not valid TOML.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path of the offending file.
        path: String,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// `server_url` is missing after merging every layer.
    #[error("no server_url configured (pass one explicitly, set AIM_SERVER_URL, or add it to ~/.aim/config.toml)")]
    MissingServerUrl,

    /// An `AIM_*` environment variable held a value of the wrong type
    /// (e.g. `AIM_MAX_RETRIES=not-a-number`).
    #[error("environment variable {name} has an invalid value: {value:?}")]
    InvalidEnvValue {
        /// Name of the offending variable.
        name: &'static str,
        /// Value that failed to parse.
        value: String,
    },

    /// Underlying filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

//! Detector error types.

use thiserror::Error;

/// Errors from capability/protocol/MCP detection (C6).
///
/// Detection is always best-effort by design (spec §4.6: "unknown packages
/// are ignored", §7: "logging/reporting calls are best-effort"), so callers
/// outside this crate rarely need to match on these — most detector entry
/// points swallow them internally and return an empty result instead.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The manifest at the given path could not be read.
    #[error("failed to read manifest at {path}: {source}")]
    ManifestRead {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest could not be parsed as TOML.
    #[error("failed to parse manifest as TOML: {0}")]
    ManifestParse(#[from] toml::de::Error),

    /// The source file could not be read for decorator scanning.
    #[error("failed to read source file at {path}: {source}")]
    SourceRead {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The source file could not be parsed as Rust.
    #[error("failed to parse source file as Rust: {0}")]
    SourceParse(#[from] syn::Error),

    /// The capabilities config file exists but is not valid JSON.
    #[error("malformed capabilities config: {0}")]
    ConfigMalformed(String),

    /// Underlying filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for detector operations.
pub type CapabilityResult<T> = Result<T, CapabilityError>;

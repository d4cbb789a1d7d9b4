//! Identity Store error types.

use thiserror::Error;

/// Errors from the Identity Store (C1).
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No usable credentials file exists at any discovery location.
    #[error("no credentials found for agent {0:?}")]
    NotFound(Option<String>),

    /// Ciphertext could not be decrypted — corrupt file or wrong key.
    /// Surfaced distinctly (spec §4.1) so the orchestrator can prompt for
    /// re-registration rather than treating it as a generic I/O failure.
    #[error("failed to decrypt credentials: {0}")]
    CorruptCredentials(String),

    /// A required secure-storage primitive (OS keyring) is unavailable.
    /// Fatal — the SDK must not fall back to plaintext storage.
    #[error("secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    /// The credentials file exists but is not valid JSON, or doesn't
    /// match either documented shape (spec §6).
    #[error("malformed credentials file: {0}")]
    Malformed(String),

    /// Underlying filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type for Identity Store operations.
pub type IdentityResult<T> = Result<T, IdentityError>;

impl From<std::io::Error> for IdentityError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

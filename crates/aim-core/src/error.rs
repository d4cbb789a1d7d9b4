//! Shared error taxonomy for the AIM SDK (spec §7).

use thiserror::Error;

/// The error kinds the SDK core raises, propagates, or converts.
///
/// Policy (spec §7): anything transient retries with capped exponential
/// backoff; anything authoritative (denied, 4xx other than 401/403) fails
/// fast. Logging/reporting calls are best-effort and swallow errors rather
/// than surfacing a variant here.
#[derive(Debug, Error)]
pub enum AimError {
    /// Missing/invalid inputs, key mismatch, missing secure storage.
    /// Fatal at entry; the caller must fix the configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 401/403 from the server, or a revoked token after recovery also
    /// failed. Never retried.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The server returned `denied` for a verification request.
    #[error("action denied: {0}")]
    ActionDenied(String),

    /// Timeout, repeated transport failure, or an unexpected server
    /// status while verifying/polling.
    #[error("verification error: {0}")]
    VerificationError(String),

    /// Ciphertext decryption failed; remediation is to re-register.
    #[error("corrupt credentials: {0}")]
    CorruptCredentials(String),

    /// A lower-level transport failure (connection refused, DNS, TLS).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type used throughout the AIM SDK's public surface.
pub type AimResult<T> = Result<T, AimError>;

impl From<aim_crypto::CryptoError> for AimError {
    fn from(err: aim_crypto::CryptoError) -> Self {
        Self::Configuration(err.to_string())
    }
}

//! Error conversions at the `aim-client` boundary (SPEC_FULL.md §10.1).
//!
//! [`AimError`] itself is defined in `aim-core` so that `aim-identity` and
//! `aim-capabilities` could, in principle, convert into it too without a
//! dependency cycle back through this crate. Orphan rules forbid `From`
//! impls here (neither `AimError` nor e.g. `IdentityError` is local to
//! this crate), so lower crates' errors are folded in with plain mapping
//! functions at each call site instead.

pub use aim_core::{AimError, AimResult};

pub(crate) fn configuration(err: impl std::fmt::Display) -> AimError {
    AimError::Configuration(err.to_string())
}

pub(crate) fn corrupt_credentials(err: impl std::fmt::Display) -> AimError {
    AimError::CorruptCredentials(err.to_string())
}

pub(crate) fn identity_err(err: aim_identity::IdentityError) -> AimError {
    match err {
        aim_identity::IdentityError::CorruptCredentials(msg) => AimError::CorruptCredentials(msg),
        other => AimError::Configuration(other.to_string()),
    }
}

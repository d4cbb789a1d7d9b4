//! AIM Identity - sealed, multi-agent credential storage (Identity Store, C1).
//!
//! Credentials are always sealed at rest with a Fernet-equivalent cipher
//! keyed from the OS keyring, and a legacy plaintext file is transparently
//! migrated (and then deleted) on first read (spec §4.1).

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod discovery;
mod error;
mod file_format;
mod sealed;
mod store;

pub use error::{IdentityError, IdentityResult};
pub use file_format::{CredentialsFile, EmbeddedSdkCredentials};
pub use store::{load_embedded_sdk_credentials, IdentityStore};

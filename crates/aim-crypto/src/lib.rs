//! AIM Crypto - Ed25519 signing primitives for the AIM SDK (spec §4.3).
//!
//! Two signing modes live here:
//! - Action-payload signing: canonical JSON over a [`VerificationRequest`]
//!   minus its signature fields (see [`canonical`]).
//! - HTTP envelope signing: `METHOD\n/path\ntimestamp[\nbody]` for any
//!   authenticated call lacking a bearer token (see [`envelope`]).
//!
//! [`VerificationRequest`]: https://docs.rs/aim-core (defined in `aim-core`)

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod canonical;
pub mod envelope;

mod error;
mod keypair;
mod signature;

pub use canonical::{to_canonical_json, to_canonical_string};
pub use envelope::{envelope_message, sign_envelope_raw, sign_envelope_with_body, verify_envelope, EnvelopeHeaders};
pub use error::{CryptoError, CryptoResult};
pub use keypair::{KeyPair, PublicKey};
pub use signature::Signature;

//! AIM Core - shared data model and error taxonomy for the AIM SDK (spec §3, §7).
//!
//! This crate has no I/O of its own; it defines the types that flow
//! between the Identity Store, Token Manager, Action Verifier, and
//! Detectors, so that none of those crates need to depend on each other
//! directly for data shapes.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod capability;
pub mod credentials;
pub mod detection;
pub mod risk;
pub mod verification;

mod error;

pub use capability::{Capability, CapabilityReport, Environment};
pub use credentials::AgentCredentials;
pub use detection::{DetectionEvent, DetectionMethod};
pub use error::{AimError, AimResult};
pub use risk::RiskLevel;
pub use verification::{VerificationDecision, VerificationRequest, VerificationStatus};

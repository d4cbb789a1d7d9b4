//! AIM Client - the AIM SDK's public entry point.
//!
//! [`AimClient`] ties together the lower-level components implemented in
//! this crate's other modules: the Registration Orchestrator
//! ([`registration`]), the Token Manager ([`token_manager`]), the Action
//! Verifier ([`verifier`]) and its [`wrappers`], the local audit trail
//! ([`audit`]), and the pluggable [`transport::Transport`] seam that keeps
//! all of the above unit-testable without a live server (spec §1, §4).

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod audit;
mod auth;
mod client;
mod error;
mod http;
mod jwt;
mod registration;
mod token_manager;
mod transport;
mod verifier;
mod wrappers;

#[cfg(test)]
mod test_support;

pub use client::AimClient;
pub use error::{AimError, AimResult};
pub use registration::{AuthMode, RegisterOptions};
pub use transport::{PreparedRequest, RawResponse, ReqwestTransport, Transport, TransportError};
pub use wrappers::{ActionDescriptor, ActionError, WrappedOutcome};

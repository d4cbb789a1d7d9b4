//! AIM Telemetry - `tracing` subscriber setup for the AIM SDK (spec §10.2).
//!
//! Library crates in this workspace only emit `tracing` events and spans;
//! they never install a global subscriber. This crate exists for binaries,
//! examples, and integration tests that want a ready one.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{setup_default_logging, setup_logging, LogConfig, LogFormat, LogTarget};

//! AIM Capabilities - capability, protocol, and MCP-server auto-detection
//! (Detectors, C6, spec §4.6).
//!
//! Three independently invocable capability-detection strategies
//! ([`imports`], [`decorators`], [`config`]), MCP server detection plus a
//! process-wide runtime call tracker ([`mcp`]), and communication-protocol
//! classification ([`protocol`]). [`detect_all_capabilities`] combines and
//! deduplicates the first three, matching `CapabilityDetector.detect_all`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod decorators;
pub mod imports;
pub mod mcp;
pub mod protocol;

mod error;

pub use error::{CapabilityError, CapabilityResult};

use std::collections::BTreeSet;
use std::path::Path;

use aim_core::Capability;

/// Run all capability-detection strategies and return the combined,
/// deduplicated, sorted result, matching `CapabilityDetector.detect_all`.
///
/// `caller_source` is the source file to scan for
/// `track_action`/`require_approval` call sites (spec §4.6: "for the
/// calling user module only"); pass `None` to skip decorator scanning,
/// matching the Python source's best-effort fallback when the caller's
/// module cannot be located.
#[must_use]
pub fn detect_all_capabilities(caller_source: Option<&Path>) -> Vec<Capability> {
    let mut capabilities: BTreeSet<Capability> = BTreeSet::new();

    capabilities.extend(imports::detect_from_env());
    capabilities.extend(config::detect_from_config());

    if let Some(source) = caller_source {
        if let Ok(decorator_caps) = decorators::detect_from_source(source) {
            capabilities.extend(decorator_caps);
        }
    }

    capabilities.into_iter().collect()
}

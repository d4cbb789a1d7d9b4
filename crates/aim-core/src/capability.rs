//! Capability report types (spec §3), grounded on
//! `original_source/sdks/python/aim_sdk/client.py::report_capabilities`'s
//! bulk reporting payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single named right an agent declares or is granted (spec §3,
/// GLOSSARY). Capabilities are additive; reporting the same capability
/// twice is idempotent (spec §8 law 8).
pub type Capability = String;

/// Environment metadata attached to a bulk capability report, mirroring
/// the Python source's `environment` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    /// Implementation language; always `"rust"` for this SDK.
    pub language: String,
    /// SDK crate version.
    pub version: String,
    /// Runtime identifier (e.g. `"tokio"`).
    pub runtime: String,
    /// Host OS family (`cfg!(target_os)`).
    pub platform: String,
    /// Host architecture (`cfg!(target_arch)`).
    pub arch: String,
    /// Frameworks detected in the host crate's dependency graph.
    #[serde(default)]
    pub frameworks: Vec<String>,
}

impl Environment {
    /// Build an environment snapshot for the current process.
    #[must_use]
    pub fn current(sdk_version: impl Into<String>, frameworks: Vec<String>) -> Self {
        Self {
            language: "rust".to_string(),
            version: sdk_version.into(),
            runtime: "tokio".to_string(),
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            frameworks,
        }
    }
}

/// A set of detected capabilities plus the environment they were detected
/// in, matching the shape of the bulk capability-reporting endpoint body
/// (spec §6 `/api/v1/detection/agents/{id}/capabilities/report`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityReport {
    /// When this report was assembled.
    #[serde(rename = "detectedAt")]
    pub detected_at: DateTime<Utc>,
    /// Environment the capabilities were detected in.
    pub environment: Environment,
    /// Deduplicated, sorted set of detected capability names.
    pub capabilities: BTreeSet<Capability>,
}

impl CapabilityReport {
    /// Build a report from a set of detected capability names.
    #[must_use]
    pub fn new(capabilities: BTreeSet<Capability>, environment: Environment) -> Self {
        Self {
            detected_at: Utc::now(),
            environment,
            capabilities,
        }
    }

    /// Merge another set of capabilities into this report. Idempotent:
    /// capabilities already present are not duplicated (spec §8 law 8).
    pub fn merge(&mut self, other: impl IntoIterator<Item = Capability>) {
        self.capabilities.extend(other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_idempotent() {
        let env = Environment::current("aim-rust-sdk@0.1.0", vec![]);
        let mut report = CapabilityReport::new(BTreeSet::new(), env);
        report.merge(["read_files".to_string()]);
        report.merge(["read_files".to_string()]);
        assert_eq!(report.capabilities.len(), 1);
    }
}

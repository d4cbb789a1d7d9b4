//! Detection event and capability report types (spec §3).
//!
//! These are produced by the detectors (C6, `aim-capabilities`) and
//! consumed by the registration orchestrator and action verifier (C4/C5,
//! `aim-client`) when reporting discoveries to the control plane. They
//! live here, rather than in `aim-capabilities`, because both the
//! detectors and the client need them without introducing a dependency
//! cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an upstream MCP server or SDK integration was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Explicitly reported by the caller.
    Manual,
    /// Found in the host's Claude-desktop config file.
    ClaudeConfig,
    /// Inferred from the host crate's declared dependencies.
    SdkImport,
    /// Observed via [`crate::risk::RiskLevel`]-independent runtime call
    /// tracking (`track_mcp_call`).
    SdkRuntime,
    /// Reported as part of SDK integration status, not a specific server.
    SdkIntegration,
}

/// Report of a discovered upstream MCP server or SDK integration (spec §3).
///
/// Field names follow the wire's camelCase convention (spec §6's
/// `/api/v1/detection/agents/{id}/report` body), not Rust's snake_case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Name/identifier of the MCP server.
    #[serde(rename = "mcpServer")]
    pub mcp_server: String,
    /// How this server was detected.
    #[serde(rename = "detectionMethod")]
    pub detection_method: DetectionMethod,
    /// Confidence score, 0–100.
    pub confidence: f64,
    /// Additional structured detail about the detection.
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
    /// SDK version string that produced this event.
    #[serde(rename = "sdkVersion")]
    pub sdk_version: String,
    /// When this detection occurred.
    pub timestamp: DateTime<Utc>,
}

impl DetectionEvent {
    /// Construct a detection event stamped with the current time.
    #[must_use]
    pub fn new(
        mcp_server: impl Into<String>,
        detection_method: DetectionMethod,
        confidence: f64,
        sdk_version: impl Into<String>,
    ) -> Self {
        Self {
            mcp_server: mcp_server.into(),
            detection_method,
            confidence: confidence.clamp(0.0, 100.0),
            details: BTreeMap::new(),
            sdk_version: sdk_version.into(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a detail field, builder-style.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped_to_0_100() {
        let event = DetectionEvent::new("svc", DetectionMethod::Manual, 150.0, "aim-rust-sdk@0.1.0");
        assert_eq!(event.confidence, 100.0);
        let event = DetectionEvent::new("svc", DetectionMethod::Manual, -5.0, "aim-rust-sdk@0.1.0");
        assert_eq!(event.confidence, 0.0);
    }

    #[test]
    fn wire_field_names_are_camel_case() {
        let event = DetectionEvent::new("fs-server", DetectionMethod::ClaudeConfig, 100.0, "aim-rust-sdk@0.1.0");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"mcpServer\""));
        assert!(json.contains("\"detectionMethod\""));
        assert!(json.contains("\"sdkVersion\""));
    }
}

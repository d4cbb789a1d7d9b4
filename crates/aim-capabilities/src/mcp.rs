//! MCP server detection and the process-wide runtime call tracker
//! (spec §3 `RuntimeCallTracker`, §4.6).
//!
//! Grounded on `demo-agent-aim-sdk/sdk/python/aim_sdk/detection.py`'s
//! `MCPDetector`: Claude-desktop config parsing produces 100%-confidence
//! `claude_config` events, dependency-name matching produces 90%-confidence
//! `sdk_import` events, and an explicit `track_mcp_call` helper feeds a
//! process-wide tracker that yields 100%-confidence `sdk_runtime` events on
//! demand. The tracker is a singleton owned by the process (spec §9's
//! design note), modeled here with `OnceLock<Mutex<HashMap<...>>>` — the
//! idiomatic Rust stand-in for Python's module-level mutable dict.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use aim_core::{DetectionEvent, DetectionMethod};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

/// Known MCP crate/package naming patterns, translated from the Python
/// source's `_mcp_packages` list and `_is_mcp_package` pattern check.
const MCP_PACKAGE_PATTERNS: &[&str] = &[
    "mcp-server-",
    "mcp_server_",
    "@modelcontextprotocol/",
    "modelcontextprotocol-",
];

/// Detect MCP servers configured in the host's Claude Desktop config file
/// (`~/.claude/claude_desktop_config.json`), if present.
#[must_use]
pub fn detect_from_claude_config(sdk_version: &str) -> Vec<DetectionEvent> {
    let Some(path) = claude_config_path() else {
        return Vec::new();
    };
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    let Ok(config) = serde_json::from_str::<ClaudeDesktopConfig>(&raw) else {
        return Vec::new();
    };

    config
        .mcp_servers
        .into_iter()
        .map(|(server_name, server_config)| {
            DetectionEvent::new(server_name, DetectionMethod::ClaudeConfig, 100.0, sdk_version)
                .with_detail("configPath", json!(path.display().to_string()))
                .with_detail("command", json!(server_config.command.unwrap_or_default()))
                .with_detail("args", json!(server_config.args))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ClaudeDesktopConfig {
    #[serde(default, rename = "mcpServers")]
    mcp_servers: BTreeMap<String, ClaudeMcpServerConfig>,
}

#[derive(Debug, Deserialize)]
struct ClaudeMcpServerConfig {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
}

fn claude_config_path() -> Option<PathBuf> {
    let dirs = directories::BaseDirs::new()?;
    let unix_path = dirs.home_dir().join(".claude").join("claude_desktop_config.json");
    if unix_path.exists() {
        return Some(unix_path);
    }
    if cfg!(windows) {
        if let Ok(appdata) = std::env::var("APPDATA") {
            let windows_path = PathBuf::from(appdata)
                .join("Claude")
                .join("claude_desktop_config.json");
            if windows_path.exists() {
                return Some(windows_path);
            }
        }
    }
    None
}

/// Detect MCP-named crates in the host crate's manifest — the Rust
/// analogue of the Python source's import/package-metadata scan.
#[must_use]
pub fn detect_from_dependencies(sdk_version: &str) -> Vec<DetectionEvent> {
    crate::imports::manifest_dependency_names()
        .into_iter()
        .filter(|name| is_mcp_package(name))
        .map(|name| {
            DetectionEvent::new(name.clone(), DetectionMethod::SdkImport, 90.0, sdk_version)
                .with_detail("packageName", json!(name))
                .with_detail("detectionSource", json!("manifest_scan"))
        })
        .collect()
}

fn is_mcp_package(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == "rmcp" || MCP_PACKAGE_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Run both static detection methods (Claude config + dependency scan).
#[must_use]
pub fn detect_all(sdk_version: &str) -> Vec<DetectionEvent> {
    let mut detections = detect_from_claude_config(sdk_version);
    detections.extend(detect_from_dependencies(sdk_version));
    detections
}

#[derive(Debug, Clone, Default)]
struct ServerCallStats {
    first_call: Option<DateTime<Utc>>,
    last_call: Option<DateTime<Utc>>,
    call_count: u64,
    tools_used: std::collections::BTreeSet<String>,
}

static RUNTIME_TRACKER: OnceLock<Mutex<HashMap<String, ServerCallStats>>> = OnceLock::new();

fn tracker() -> &'static Mutex<HashMap<String, ServerCallStats>> {
    RUNTIME_TRACKER.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Record a runtime MCP tool invocation for later auto-discovery (spec §3
/// `RuntimeCallTracker`, §4.6). Call this immediately before invoking the
/// MCP tool.
pub fn track_mcp_call(mcp_server: &str, tool_name: Option<&str>) {
    let mut guard = tracker().lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let stats = guard.entry(mcp_server.to_string()).or_default();
    let now = Utc::now();
    if stats.first_call.is_none() {
        stats.first_call = Some(now);
    }
    stats.last_call = Some(now);
    stats.call_count += 1;
    if let Some(tool) = tool_name {
        stats.tools_used.insert(tool.to_string());
    }
}

/// Produce 100%-confidence `sdk_runtime` detection events from everything
/// recorded via [`track_mcp_call`] so far.
#[must_use]
pub fn runtime_detections(sdk_version: &str) -> Vec<DetectionEvent> {
    let guard = tracker().lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    guard
        .iter()
        .map(|(server, stats)| {
            DetectionEvent::new(server.clone(), DetectionMethod::SdkRuntime, 100.0, sdk_version)
                .with_detail("callCount", json!(stats.call_count))
                .with_detail("firstCall", json!(stats.first_call))
                .with_detail("lastCall", json!(stats.last_call))
                .with_detail("toolsUsed", json!(stats.tools_used))
        })
        .collect()
}

/// Static detection plus runtime-tracked calls, matching
/// `detect_all_with_runtime`.
#[must_use]
pub fn detect_all_with_runtime(sdk_version: &str) -> Vec<DetectionEvent> {
    let mut detections = detect_all(sdk_version);
    detections.extend(runtime_detections(sdk_version));
    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_mcp_call_accumulates_stats() {
        track_mcp_call("test-server-unique-1", Some("read_file"));
        track_mcp_call("test-server-unique-1", Some("write_file"));
        track_mcp_call("test-server-unique-1", Some("read_file"));

        let detections = runtime_detections("aim-rust-sdk@0.1.0");
        let event = detections
            .iter()
            .find(|d| d.mcp_server == "test-server-unique-1")
            .unwrap();
        assert_eq!(event.confidence, 100.0);
        assert_eq!(event.details["callCount"], json!(3));
        let tools = event.details["toolsUsed"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
    }

    #[test]
    fn mcp_package_pattern_matching() {
        assert!(is_mcp_package("mcp-server-fetch"));
        assert!(is_mcp_package("rmcp"));
        assert!(!is_mcp_package("reqwest"));
    }
}

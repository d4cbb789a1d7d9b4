//! Capability detection from `~/.aim/capabilities.json`.
//!
//! Direct port of `capability_detection.py::detect_from_config`/
//! `save_capabilities_config`. Always uses the home directory, never the
//! current working directory, so declarations stay user-specific and are
//! never accidentally committed to version control.

use std::collections::BTreeSet;
use std::path::PathBuf;

use aim_core::Capability;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CapabilityResult;

#[derive(Debug, Deserialize, Serialize)]
struct CapabilitiesConfig {
    #[serde(default)]
    capabilities: Vec<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

fn config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".aim").join("capabilities.json"))
}

/// Read explicit capability declarations from `~/.aim/capabilities.json`.
///
/// Returns an empty list (rather than an error) if the file is absent —
/// this source is optional and additive, matching the Python source's
/// silent-fail-on-missing behavior.
#[must_use]
pub fn detect_from_config() -> Vec<Capability> {
    let Some(path) = config_path() else {
        return Vec::new();
    };
    if !path.exists() {
        return Vec::new();
    }
    match std::fs::read_to_string(&path) {
        Ok(raw) => match serde_json::from_str::<CapabilitiesConfig>(&raw) {
            Ok(config) => config.capabilities,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "ignoring malformed capabilities config");
                Vec::new()
            },
        },
        Err(e) => {
            warn!(error = %e, path = %path.display(), "failed to read capabilities config");
            Vec::new()
        },
    }
}

/// Persist an explicit capability declaration to `~/.aim/capabilities.json`,
/// restricted to owner read/write.
///
/// # Errors
///
/// Returns an error if the home `.aim` directory cannot be created or the
/// file cannot be written.
pub fn save_capabilities_config(capabilities: &[Capability]) -> CapabilityResult<()> {
    let path = config_path().ok_or_else(|| {
        crate::error::CapabilityError::ConfigMalformed("could not resolve home directory".into())
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let deduped: BTreeSet<_> = capabilities.iter().cloned().collect();
    let config = CapabilitiesConfig {
        capabilities: deduped.into_iter().collect(),
        last_updated: Some(Utc::now().to_rfc3339()),
        version: Some("1.0.0".to_string()),
    };
    let json = serde_json::to_string_pretty(&config)
        .map_err(|e| crate::error::CapabilityError::ConfigMalformed(e.to_string()))?;
    std::fs::write(&path, json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrips_through_json() {
        let json = r#"{"capabilities": ["read_files", "make_api_calls"], "version": "1.0.0"}"#;
        let parsed: CapabilitiesConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.capabilities.len(), 2);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let parsed: CapabilitiesConfig = serde_json::from_str("{}").unwrap();
        assert!(parsed.capabilities.is_empty());
    }
}

//! Capability detection from the host crate's declared dependencies.
//!
//! Grounded on `capability_detection.py::detect_from_imports`, which scans
//! `sys.modules` for loaded packages at runtime. Rust binaries have no such
//! registry once compiled, so this module reads the host crate's
//! `Cargo.toml` `[dependencies]` table instead — the nearest static
//! equivalent of "what this process has imported". The mapping table below
//! is translated package-for-crate from the Python source's
//! `import_to_capability` dict.

use std::collections::BTreeSet;
use std::path::Path;

use aim_core::Capability;

use crate::error::{CapabilityError, CapabilityResult};

/// Crate name → capability, translated from the Python source's
/// `import_to_capability` table. Process facilities with no Rust crate
/// equivalent (e.g. the stdlib `os`/`pathlib` entries) are instead covered
/// by always-available capabilities the orchestrator adds unconditionally;
/// see [`detect_from_dependencies`]'s doc comment.
const DEPENDENCY_CAPABILITIES: &[(&str, &str)] = &[
    // Email
    ("lettre", "send_email"),
    ("mail-send", "send_email"),
    // Database
    ("sqlx", "access_database"),
    ("diesel", "access_database"),
    ("rusqlite", "access_database"),
    ("postgres", "access_database"),
    ("mongodb", "access_database"),
    ("tokio-postgres", "access_database"),
    // HTTP/API
    ("reqwest", "make_api_calls"),
    ("hyper", "make_api_calls"),
    ("ureq", "make_api_calls"),
    ("surf", "make_api_calls"),
    // Code execution
    ("duct", "execute_code"),
    ("subprocess", "execute_code"),
    // Cloud services
    ("aws-sdk-s3", "access_cloud_services"),
    ("aws-config", "access_cloud_services"),
    ("azure_core", "access_cloud_services"),
    ("google-cloud-storage", "access_cloud_services"),
    // Web scraping / automation
    ("scraper", "web_scraping"),
    ("select", "web_scraping"),
    ("thirtyfour", "web_automation"),
    ("fantoccini", "web_automation"),
    // Data processing
    ("polars", "data_processing"),
    ("ndarray", "data_processing"),
    // AI/ML
    ("async-openai", "ai_model_access"),
    ("anthropic-sdk", "ai_model_access"),
    // File/serialization
    ("serde_yaml", "read_files"),
    ("csv", "read_files"),
];

/// Detect capabilities from the `[dependencies]` table of a `Cargo.toml`
/// manifest at `manifest_path`.
///
/// `read_files`/`write_files` are not derivable this way in Rust (every
/// crate can touch `std::fs`, unlike Python's import-gated filesystem
/// access), so this function only reports capabilities with a clear,
/// unambiguous dependency signal.
///
/// # Errors
///
/// Returns an error if `manifest_path` cannot be read or is not valid TOML.
pub fn detect_from_manifest(manifest_path: &Path) -> CapabilityResult<Vec<Capability>> {
    let contents = std::fs::read_to_string(manifest_path).map_err(|source| {
        CapabilityError::ManifestRead {
            path: manifest_path.display().to_string(),
            source,
        }
    })?;
    Ok(detect_from_manifest_str(&contents)?)
}

/// Same as [`detect_from_manifest`] but operating on already-loaded TOML
/// text, for callers that have the manifest in memory (tests, or a build
/// script that embeds it via `include_str!`).
///
/// # Errors
///
/// Returns an error if `contents` is not valid TOML.
pub fn detect_from_manifest_str(contents: &str) -> Result<Vec<Capability>, toml::de::Error> {
    let manifest: toml::Value = toml::from_str(contents)?;
    let mut caps = BTreeSet::new();

    for table_name in ["dependencies", "dev-dependencies", "build-dependencies"] {
        let Some(deps) = manifest.get(table_name).and_then(toml::Value::as_table) else {
            continue;
        };
        for dep_name in deps.keys() {
            for (crate_name, capability) in DEPENDENCY_CAPABILITIES {
                if dep_name == crate_name {
                    caps.insert((*capability).to_string());
                }
            }
        }
    }

    Ok(caps.into_iter().collect())
}

/// Detect capabilities from the manifest of the crate currently being
/// compiled, using `CARGO_MANIFEST_DIR` — set by Cargo for anything run
/// via `cargo build`/`cargo run`/`cargo test`, but absent from a
/// distributed release binary, in which case this returns an empty list
/// rather than failing.
#[must_use]
pub fn detect_from_env() -> Vec<Capability> {
    let Ok(dir) = std::env::var("CARGO_MANIFEST_DIR") else {
        return Vec::new();
    };
    let manifest_path = Path::new(&dir).join("Cargo.toml");
    detect_from_manifest(&manifest_path).unwrap_or_default()
}

/// Raw dependency names from the host crate's manifest (via
/// `CARGO_MANIFEST_DIR`), independent of the capability mapping table —
/// used by protocol and MCP detection, which key off different crate
/// names than the capability table does.
#[must_use]
pub fn manifest_dependency_names() -> BTreeSet<String> {
    let Ok(dir) = std::env::var("CARGO_MANIFEST_DIR") else {
        return BTreeSet::new();
    };
    let manifest_path = Path::new(&dir).join("Cargo.toml");
    let Ok(contents) = std::fs::read_to_string(manifest_path) else {
        return BTreeSet::new();
    };
    let Ok(manifest) = contents.parse::<toml::Value>() else {
        return BTreeSet::new();
    };

    let mut names = BTreeSet::new();
    for table_name in ["dependencies", "dev-dependencies", "build-dependencies"] {
        if let Some(deps) = manifest.get(table_name).and_then(toml::Value::as_table) {
            names.extend(deps.keys().cloned());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_dependency_to_capability() {
        let toml = r#"
            [dependencies]
            reqwest = "0.12"
            sqlx = "0.8"
        "#;
        let caps = detect_from_manifest_str(toml).unwrap();
        assert!(caps.contains(&"make_api_calls".to_string()));
        assert!(caps.contains(&"access_database".to_string()));
    }

    #[test]
    fn unknown_dependency_is_ignored() {
        let toml = r#"
            [dependencies]
            some-unrelated-crate = "1.0"
        "#;
        let caps = detect_from_manifest_str(toml).unwrap();
        assert!(caps.is_empty());
    }

    #[test]
    fn detect_from_manifest_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Cargo.toml");
        std::fs::write(&path, "[dependencies]\nreqwest = \"0.12\"\n").unwrap();
        let caps = detect_from_manifest(&path).unwrap();
        assert_eq!(caps, vec!["make_api_calls".to_string()]);
    }
}

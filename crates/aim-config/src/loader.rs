//! Layered configuration loading (spec §10.3).
//!
//! Precedence, highest to lowest: explicit overrides passed to [`load`] >
//! `AIM_*` environment variables > `~/.aim/config.toml` > built-in
//! defaults. Each layer is expressed as a [`ClientConfigOverrides`] (all
//! fields optional) and folded onto a base [`ClientConfig`] in increasing
//! priority order, simplified from the reference runtime's
//! defaults/system/user/workspace merge to this SDK's single-agent scope
//! (no workspace concept, spec §1).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::ClientConfig;

/// A sparse overlay for [`ClientConfig`]: every field is optional, so a
/// layer only needs to specify the fields it actually sets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfigOverrides {
    /// See [`ClientConfig::server_url`].
    pub server_url: Option<String>,
    /// See [`ClientConfig::api_key`].
    pub api_key: Option<String>,
    /// See [`ClientConfig::request_timeout_secs`].
    pub request_timeout_secs: Option<u64>,
    /// See [`ClientConfig::max_retries`].
    pub max_retries: Option<u32>,
    /// See [`ClientConfig::fail_open`].
    pub fail_open: Option<bool>,
    /// See [`ClientConfig::auto_detect_capabilities`].
    pub auto_detect_capabilities: Option<bool>,
    /// See [`ClientConfig::auto_retry`].
    pub auto_retry: Option<bool>,
}

/// Fold `overrides` onto `base`, replacing only the fields `overrides`
/// sets.
pub fn apply_overrides(base: &mut ClientConfig, overrides: &ClientConfigOverrides) {
    if let Some(v) = &overrides.server_url {
        base.server_url = Some(v.clone());
    }
    if let Some(v) = &overrides.api_key {
        base.api_key = Some(v.clone());
    }
    if let Some(v) = overrides.request_timeout_secs {
        base.request_timeout_secs = v;
    }
    if let Some(v) = overrides.max_retries {
        base.max_retries = v;
    }
    if let Some(v) = overrides.fail_open {
        base.fail_open = v;
    }
    if let Some(v) = overrides.auto_detect_capabilities {
        base.auto_detect_capabilities = v;
    }
    if let Some(v) = overrides.auto_retry {
        base.auto_retry = v;
    }
}

/// Load the merged client configuration.
///
/// `explicit` is the highest-priority layer — fields the caller passed
/// directly to `register()` (spec §10.3 tier 1).
///
/// # Errors
///
/// Returns [`ConfigError::ParseError`] if `~/.aim/config.toml` exists but
/// is not valid TOML, or [`ConfigError::InvalidEnvValue`] if an `AIM_*`
/// environment variable holds a value of the wrong type.
pub fn load(explicit: &ClientConfigOverrides) -> ConfigResult<ClientConfig> {
    let mut config = ClientConfig::default();

    if let Some(overrides) = load_file_overrides(&config_file_path())? {
        apply_overrides(&mut config, &overrides);
    }

    let env_overrides = load_env_overrides()?;
    apply_overrides(&mut config, &env_overrides);

    apply_overrides(&mut config, explicit);

    debug!(?config, "resolved client configuration");
    Ok(config)
}

fn config_file_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".aim").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".aim/config.toml"))
}

fn load_file_overrides(path: &Path) -> ConfigResult<Option<ClientConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    let overrides: ClientConfigOverrides =
        toml::from_str(&raw).map_err(|source| ConfigError::ParseError {
            path: path.display().to_string(),
            source,
        })?;
    info!(path = %path.display(), "loaded config file");
    Ok(Some(overrides))
}

/// Parse the `AIM_*` environment variables named in spec §10.3 into an
/// overlay.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvValue`] if `AIM_FAIL_OPEN`,
/// `AIM_MAX_RETRIES`, or `AIM_REQUEST_TIMEOUT_SECS` is set but not
/// parseable as its expected type.
pub fn load_env_overrides() -> ConfigResult<ClientConfigOverrides> {
    let mut overrides = ClientConfigOverrides::default();

    if let Ok(v) = std::env::var("AIM_SERVER_URL") {
        overrides.server_url = Some(v);
    }
    if let Ok(v) = std::env::var("AIM_API_KEY") {
        overrides.api_key = Some(v);
    }
    if let Ok(v) = std::env::var("AIM_FAIL_OPEN") {
        overrides.fail_open = Some(parse_bool("AIM_FAIL_OPEN", &v)?);
    }
    if let Ok(v) = std::env::var("AIM_MAX_RETRIES") {
        overrides.max_retries = Some(v.parse().map_err(|_| ConfigError::InvalidEnvValue {
            name: "AIM_MAX_RETRIES",
            value: v,
        })?);
    }
    if let Ok(v) = std::env::var("AIM_REQUEST_TIMEOUT_SECS") {
        overrides.request_timeout_secs =
            Some(v.parse().map_err(|_| ConfigError::InvalidEnvValue {
                name: "AIM_REQUEST_TIMEOUT_SECS",
                value: v,
            })?);
    }

    Ok(overrides)
}

fn parse_bool(name: &'static str, value: &str) -> ConfigResult<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvValue {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_overrides_win_over_defaults() {
        let explicit = ClientConfigOverrides {
            server_url: Some("https://explicit.example.com".to_string()),
            ..Default::default()
        };
        let mut config = ClientConfig::default();
        apply_overrides(&mut config, &explicit);
        assert_eq!(config.server_url.as_deref(), Some("https://explicit.example.com"));
    }

    #[test]
    fn file_overrides_applied_before_explicit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_url = \"https://file.example.com\"\nmax_retries = 7\n").unwrap();

        let overrides = load_file_overrides(&path).unwrap().unwrap();
        let mut config = ClientConfig::default();
        apply_overrides(&mut config, &overrides);
        assert_eq!(config.server_url.as_deref(), Some("https://file.example.com"));
        assert_eq!(config.max_retries, 7);
    }

    #[test]
    fn missing_file_yields_no_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");
        assert!(load_file_overrides(&path).unwrap().is_none());
    }

    #[test]
    fn invalid_bool_env_value_is_rejected() {
        assert!(parse_bool("AIM_FAIL_OPEN", "maybe").is_err());
        assert!(parse_bool("AIM_FAIL_OPEN", "true").unwrap());
        assert!(!parse_bool("AIM_FAIL_OPEN", "0").unwrap());
    }
}

//! [`ClientConfig`]: the merged, final configuration for an `AimClient`
//! (spec §10.3).

use serde::{Deserialize, Serialize};

/// Layered client configuration (spec §10.3).
///
/// Fields are merged explicit > `AIM_*` env vars > `~/.aim/config.toml` >
/// these built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base server URL (no trailing slash). `None` until a layer supplies
    /// one; [`crate::load`] errors if it's still unset after merging.
    pub server_url: Option<String>,
    /// API key for API-key-mode registration, if any.
    pub api_key: Option<String>,
    /// HTTP request timeout.
    pub request_timeout_secs: u64,
    /// Max retry attempts for idempotent/transport failures (spec §5).
    pub max_retries: u32,
    /// If `true`, network failure during `verify_action` returns a
    /// synthetic `pending` record instead of failing closed (spec §9's
    /// "graceful control-plane outage" design note, exposed as a toggle).
    pub fail_open: bool,
    /// Whether the Registration Orchestrator runs the Detectors pass by
    /// default (spec §4.4 step 3).
    pub auto_detect_capabilities: bool,
    /// Whether idempotent/transport failures are retried automatically
    /// (spec §5's retry policy) or surfaced to the caller on first
    /// failure.
    pub auto_retry: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            request_timeout_secs: 30,
            max_retries: 3,
            fail_open: true,
            auto_detect_capabilities: true,
            auto_retry: true,
        }
    }
}

impl ClientConfig {
    /// `server_url`, erroring if no layer supplied one.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError::MissingServerUrl`] if `server_url` is
    /// `None`.
    pub fn require_server_url(&self) -> crate::ConfigResult<&str> {
        self.server_url
            .as_deref()
            .ok_or(crate::ConfigError::MissingServerUrl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_10_3() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
        assert!(config.fail_open);
        assert!(config.auto_detect_capabilities);
        assert!(config.auto_retry);
    }
}

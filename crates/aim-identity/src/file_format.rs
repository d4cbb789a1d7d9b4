//! On-disk (post-decryption) credential file shapes (spec §6).

use aim_core::AgentCredentials;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The decrypted contents of `~/.aim/credentials.json`.
///
/// Two shapes are accepted on read, matching spec §6:
/// - [`CredentialsFile::Named`]: the normal multi-agent map this store
///   writes, keyed by the human-chosen agent name.
/// - [`CredentialsFile::EmbeddedSdk`]: a single-agent shape carrying only
///   SDK-download OAuth bootstrap fields, written by an externally
///   downloaded SDK bundle before this store has ever run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CredentialsFile {
    /// `{ "<agent name>": AgentCredentials, ... }`.
    Named(BTreeMap<String, AgentCredentials>),
    /// `{ aim_url, refresh_token, sdk_token_id, ... }`.
    EmbeddedSdk(EmbeddedSdkCredentials),
}

impl Default for CredentialsFile {
    fn default() -> Self {
        Self::Named(BTreeMap::new())
    }
}

/// The single-agent embedded-SDK-download credential shape (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedSdkCredentials {
    /// Base server URL this bundle was issued against.
    pub aim_url: String,
    /// OAuth-mode refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// OAuth-mode access token, if still cached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Opaque usage-metering identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_token_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_sdk_shape_parses_without_agent_map() {
        let json = r#"{"aim_url": "https://aim.example.com", "refresh_token": "rt", "sdk_token_id": "tok-1"}"#;
        let parsed: CredentialsFile = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed, CredentialsFile::EmbeddedSdk(_)));
    }

    #[test]
    fn empty_map_parses_as_named() {
        let parsed: CredentialsFile = serde_json::from_str("{}").unwrap();
        assert!(matches!(parsed, CredentialsFile::Named(m) if m.is_empty()));
    }
}

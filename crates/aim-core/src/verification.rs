//! Verification request/decision types (spec §3).

use aim_crypto::{to_canonical_json, CryptoResult, PublicKey, Signature};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Ephemeral, one-per-action request submitted to
/// `POST /api/v1/sdk-api/verifications`.
///
/// The canonical form used for signing is this struct with `signature` and
/// `public_key` **absent** (spec §3); see [`VerificationRequest::signing_payload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    /// The requesting agent's id.
    pub agent_id: Uuid,
    /// Short action identifier (e.g. `"read_files"`).
    pub action_type: String,
    /// Resource being accessed, if applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Free-form context, string keys to arbitrary JSON values.
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    /// ISO-8601 UTC timestamp with a trailing `Z`.
    pub timestamp: String,
    /// Base64 Ed25519 signature over [`Self::signing_payload`]. Absent
    /// until [`VerificationRequest::sign`] is called.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Base64 public key used to produce `signature`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// The subset of [`VerificationRequest`] that gets signed: everything
/// except `signature` and `public_key` (spec §3/§4.3(a)).
#[derive(Debug, Clone, Serialize)]
struct SigningPayload<'a> {
    agent_id: Uuid,
    action_type: &'a str,
    resource: &'a Option<String>,
    context: &'a BTreeMap<String, serde_json::Value>,
    timestamp: &'a str,
}

impl VerificationRequest {
    /// Construct a fresh, unsigned verification request.
    #[must_use]
    pub fn new(
        agent_id: Uuid,
        action_type: impl Into<String>,
        resource: Option<String>,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            agent_id,
            action_type: action_type.into(),
            resource,
            context,
            timestamp: now_iso8601_utc(),
            signature: None,
            public_key: None,
        }
    }

    /// Canonical JSON bytes to sign: sorted keys, `signature`/`public_key`
    /// excluded (spec §3, §4.3(a), §8 law 2).
    ///
    /// # Errors
    ///
    /// Returns an error only if the context map contains values that
    /// cannot be represented as JSON (effectively never, since `context`
    /// is already `serde_json::Value`).
    pub fn signing_payload(&self) -> CryptoResult<Vec<u8>> {
        let payload = SigningPayload {
            agent_id: self.agent_id,
            action_type: &self.action_type,
            resource: &self.resource,
            context: &self.context,
            timestamp: &self.timestamp,
        };
        to_canonical_json(&payload)
    }

    /// Sign this request in place with `keypair`, filling in `signature`
    /// and `public_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if [`Self::signing_payload`] fails.
    pub fn sign(&mut self, keypair: &aim_crypto::KeyPair) -> CryptoResult<()> {
        let payload = self.signing_payload()?;
        let signature = keypair.sign(&payload);
        self.signature = Some(signature.to_base64());
        self.public_key = Some(keypair.export_public_key().to_base64());
        Ok(())
    }

    /// Verify `signature`/`public_key` against [`Self::signing_payload`]
    /// (spec §8 law 3). Not used in normal client operation — the server
    /// is the verifier — but useful for tests and self-checks.
    ///
    /// # Errors
    ///
    /// Returns an error if signature/public key are missing, malformed, or
    /// don't match the payload.
    pub fn verify_signature(&self) -> CryptoResult<()> {
        let signature = self
            .signature
            .as_deref()
            .ok_or(aim_crypto::CryptoError::SignatureVerificationFailed)?;
        let public_key = self
            .public_key
            .as_deref()
            .ok_or(aim_crypto::CryptoError::SignatureVerificationFailed)?;
        let signature = Signature::from_base64(signature)?;
        let public_key = PublicKey::from_base64(public_key)?;
        let payload = self.signing_payload()?;
        public_key.verify(&payload, &signature)
    }
}

fn now_iso8601_utc() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Terminal or pending status of a [`VerificationRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Approved — the action may proceed.
    Approved,
    /// Denied — the action must not proceed.
    Denied,
    /// Awaiting a policy/human decision.
    Pending,
}

/// Server response to a [`VerificationRequest`] (spec §3).
///
/// Moves `pending` → `approved`|`denied` exactly once (spec §3 lifecycle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationDecision {
    /// Server-assigned verification id.
    pub verification_id: String,
    /// Current status.
    pub status: VerificationStatus,
    /// Who approved the action, if approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    /// Why the action was denied, if denied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<String>,
    /// When an approval expires; the action must not execute after this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Set only on the synthetic `pending` record returned by
    /// `verify_action` on 404/5xx/network failure (spec §4.5, §9 OQ3) —
    /// never present on a genuine server response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationDecision {
    /// `true` iff `status == Approved` and (if present) `expires_at` has
    /// not passed.
    #[must_use]
    pub fn verified(&self) -> bool {
        if self.status != VerificationStatus::Approved {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => Utc::now() <= expires_at,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aim_crypto::KeyPair;

    #[test]
    fn signing_payload_excludes_signature_fields() {
        let req = VerificationRequest::new(Uuid::nil(), "read_files", None, BTreeMap::new());
        let payload = req.signing_payload().unwrap();
        let text = String::from_utf8(payload).unwrap();
        assert!(!text.contains("signature"));
        assert!(!text.contains("public_key"));
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let keypair = KeyPair::generate();
        let mut req = VerificationRequest::new(Uuid::new_v4(), "send_email", None, BTreeMap::new());
        req.sign(&keypair).unwrap();
        assert!(req.signature.is_some());
        assert!(req.verify_signature().is_ok());
    }

    #[test]
    fn tampering_after_signing_breaks_verification() {
        let keypair = KeyPair::generate();
        let mut req =
            VerificationRequest::new(Uuid::new_v4(), "read_database", Some("users".into()), BTreeMap::new());
        req.sign(&keypair).unwrap();
        req.resource = Some("admin_table".into());
        assert!(req.verify_signature().is_err());
    }

    #[test]
    fn signing_is_deterministic_given_same_fields() {
        let agent_id = Uuid::new_v4();
        let mut ctx = BTreeMap::new();
        ctx.insert("key".to_string(), serde_json::json!("value"));
        let req1 = {
            let mut r = VerificationRequest::new(agent_id, "read_files", None, ctx.clone());
            r.timestamp = "2024-01-01T00:00:00Z".into();
            r
        };
        let req2 = {
            let mut r = VerificationRequest::new(agent_id, "read_files", None, ctx);
            r.timestamp = "2024-01-01T00:00:00Z".into();
            r
        };
        assert_eq!(req1.signing_payload().unwrap(), req2.signing_payload().unwrap());
    }

    #[test]
    fn verified_is_false_when_expired() {
        let decision = VerificationDecision {
            verification_id: "v1".into(),
            status: VerificationStatus::Approved,
            approved_by: None,
            denial_reason: None,
            expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            error: None,
        };
        assert!(!decision.verified());
    }

    #[test]
    fn verified_is_true_without_expiry() {
        let decision = VerificationDecision {
            verification_id: "v1".into(),
            status: VerificationStatus::Approved,
            approved_by: None,
            denial_reason: None,
            expires_at: None,
            error: None,
        };
        assert!(decision.verified());
    }
}

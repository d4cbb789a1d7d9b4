//! HTTP request envelope signing (spec §4.3(b)).
//!
//! Used for any authenticated API call that lacks a bearer token: the
//! agent signs `METHOD\n/path\nTIMESTAMP[\ncanonical-json-body]` with its
//! Ed25519 key and attaches the result as four headers. The body
//! transmitted on the wire must be byte-identical to what was signed —
//! callers must send `body` raw rather than re-serialize it.

use serde::Serialize;

use crate::canonical::to_canonical_json;
use crate::error::CryptoResult;
use crate::keypair::{KeyPair, PublicKey};
use crate::signature::Signature;

/// The four headers attached to an Ed25519-signed request.
#[derive(Debug, Clone)]
pub struct EnvelopeHeaders {
    /// `X-Agent-ID`
    pub agent_id: String,
    /// `X-Signature` (base64)
    pub signature: String,
    /// `X-Timestamp` (decimal Unix seconds, as sent)
    pub timestamp: String,
    /// `X-Public-Key` (base64)
    pub public_key: String,
}

/// Build the exact byte sequence that gets signed for an HTTP envelope.
///
/// `path` must begin with `/`. `body`, if present, must already be the
/// canonical-JSON bytes that will be transmitted — this function does not
/// re-serialize it.
#[must_use]
pub fn envelope_message(method: &str, path: &str, timestamp_unix: i64, body: Option<&[u8]>) -> Vec<u8> {
    let mut message = format!("{}\n{}\n{}", method.to_uppercase(), path, timestamp_unix).into_bytes();
    if let Some(body) = body {
        message.push(b'\n');
        message.extend_from_slice(body);
    }
    message
}

/// Serialize `body` to canonical JSON and sign the envelope in one step.
///
/// Returns both the headers to attach and the exact bytes that must be
/// sent as the request body (so the wire bytes are guaranteed identical to
/// the signed bytes).
///
/// # Errors
///
/// Returns an error if `body` cannot be canonically encoded.
pub fn sign_envelope_with_body<T: Serialize>(
    keypair: &KeyPair,
    agent_id: &str,
    method: &str,
    path: &str,
    timestamp_unix: i64,
    body: Option<&T>,
) -> CryptoResult<(EnvelopeHeaders, Option<Vec<u8>>)> {
    let body_bytes = body.map(to_canonical_json).transpose()?;
    let headers = sign_envelope_raw(
        keypair,
        agent_id,
        method,
        path,
        timestamp_unix,
        body_bytes.as_deref(),
    );
    Ok((headers, body_bytes))
}

/// Sign an envelope whose body (if any) is already pre-serialized bytes.
#[must_use]
pub fn sign_envelope_raw(
    keypair: &KeyPair,
    agent_id: &str,
    method: &str,
    path: &str,
    timestamp_unix: i64,
    body: Option<&[u8]>,
) -> EnvelopeHeaders {
    let message = envelope_message(method, path, timestamp_unix, body);
    let signature = keypair.sign(&message);
    EnvelopeHeaders {
        agent_id: agent_id.to_string(),
        signature: signature.to_base64(),
        timestamp: timestamp_unix.to_string(),
        public_key: keypair.export_public_key().to_base64(),
    }
}

/// Verify a previously-signed envelope (used in tests / server-side logic
/// that might run against this crate; normal client operation never calls
/// this — verification is the server's job per spec §4.3).
///
/// # Errors
///
/// Returns an error if the public key or signature are malformed, or
/// verification fails.
pub fn verify_envelope(
    public_key: &PublicKey,
    signature: &Signature,
    method: &str,
    path: &str,
    timestamp_unix: i64,
    body: Option<&[u8]>,
) -> CryptoResult<()> {
    let message = envelope_message(method, path, timestamp_unix, body);
    public_key.verify(&message, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_with_no_body_matches_spec_example() {
        // Spec §8 S6: "GET\n/api/v1/agents/{id}\n<ts>"
        let keypair = KeyPair::generate();
        let (headers, body) =
            sign_envelope_with_body::<()>(&keypair, "agent-1", "get", "/api/v1/agents/abc", 1_700_000_000, None)
                .unwrap();
        assert!(body.is_none());
        assert_eq!(headers.agent_id, "agent-1");
        assert_eq!(headers.timestamp, "1700000000");

        let message = envelope_message("GET", "/api/v1/agents/abc", 1_700_000_000, None);
        assert_eq!(message, b"GET\n/api/v1/agents/abc\n1700000000");
    }

    #[test]
    fn signed_envelope_verifies() {
        let keypair = KeyPair::generate();
        let body = serde_json::json!({"b": 1, "a": 2});
        let (headers, body_bytes) = sign_envelope_with_body(
            &keypair,
            "agent-1",
            "POST",
            "/api/v1/sdk-api/verifications",
            1_700_000_000,
            Some(&body),
        )
        .unwrap();

        let public_key = PublicKey::from_base64(&headers.public_key).unwrap();
        let signature = Signature::from_base64(&headers.signature).unwrap();
        assert!(verify_envelope(
            &public_key,
            &signature,
            "POST",
            "/api/v1/sdk-api/verifications",
            1_700_000_000,
            body_bytes.as_deref(),
        )
        .is_ok());
    }

    #[test]
    fn tampered_body_fails_verification() {
        let keypair = KeyPair::generate();
        let body = serde_json::json!({"a": 1});
        let (headers, _) =
            sign_envelope_with_body(&keypair, "agent-1", "POST", "/x", 1, Some(&body)).unwrap();

        let public_key = PublicKey::from_base64(&headers.public_key).unwrap();
        let signature = Signature::from_base64(&headers.signature).unwrap();
        let tampered = br#"{"a": 2}"#;
        assert!(verify_envelope(&public_key, &signature, "POST", "/x", 1, Some(tampered)).is_err());
    }
}

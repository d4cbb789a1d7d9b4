//! Minimal JWT payload peeking for the Token Manager (spec §4.2).
//!
//! The SDK never validates a JWT's signature — that's the server's job —
//! it only reads the `exp`/`jti` claims out of the access/refresh tokens
//! it already trusts, exactly as `oauth.py` does with a manual
//! `base64.urlsafe_b64decode` of the payload segment. No `jsonwebtoken`
//! dependency is warranted for this read-only peek.

use base64::Engine;
use serde_json::Value;

/// Decode a JWT's payload segment (the middle of its three dot-separated
/// parts) into a JSON value, without checking the signature.
///
/// Returns `None` if `token` doesn't have three segments or the payload
/// isn't valid base64url JSON — callers treat that as "undecodable" and
/// fall back to their own default (spec §4.2: "if the token is not
/// decodable, default to a one-hour window").
fn decode_payload(token: &str) -> Option<Value> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;
    if parts.next().is_none() {
        return None;
    }

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Extract the `exp` claim (Unix seconds) from a JWT, if present and
/// decodable.
#[must_use]
pub(crate) fn expiry(token: &str) -> Option<i64> {
    decode_payload(token)?.get("exp")?.as_i64()
}

/// Extract the `jti` claim from a JWT, if present and decodable.
#[must_use]
pub(crate) fn token_id(token: &str) -> Option<String> {
    decode_payload(token)?
        .get("jti")?
        .as_str()
        .map(str::to_string)
}

/// Build a fake signed-looking JWT carrying only an `exp` claim, for use
/// by other modules' test fixtures that need a token with a known expiry.
#[cfg(test)]
pub(crate) fn tests_support_jwt(exp: i64) -> String {
    make_jwt(&serde_json::json!({ "exp": exp }))
}

#[cfg(test)]
fn make_jwt(payload: &Value) -> String {
    let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{}");
    let body = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(payload).unwrap());
    format!("{header}.{body}.signature-not-checked")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_exp_and_jti() {
        let token = make_jwt(&serde_json::json!({"exp": 1_700_000_000, "jti": "tok-1"}));
        assert_eq!(expiry(&token), Some(1_700_000_000));
        assert_eq!(token_id(&token), Some("tok-1".to_string()));
    }

    #[test]
    fn non_jwt_string_is_undecodable() {
        assert_eq!(expiry("not-a-jwt"), None);
        assert_eq!(token_id("not-a-jwt"), None);
    }

    #[test]
    fn missing_claims_yield_none() {
        let token = make_jwt(&serde_json::json!({"sub": "agent-1"}));
        assert_eq!(expiry(&token), None);
        assert_eq!(token_id(&token), None);
    }
}

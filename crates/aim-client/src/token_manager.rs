//! Token Manager (C2, spec §4.2).
//!
//! Grounded on `oauth.py::OAuthTokenManager` nearly line-for-line: the
//! 60-second expiry buffer, `jti`-claim extraction on refresh-token
//! rotation, the revoked/invalid-triggers-recovery branch, and the
//! human-readable remediation message when recovery itself fails.
//! Concurrency is serialized through a single `tokio::sync::Mutex`
//! guarding the credentials, so at most one refresh is in flight per
//! agent (spec §4.2's concurrency note) without a separate single-flight
//! primitive.

use std::sync::Arc;

use aim_core::AgentCredentials;
use aim_identity::IdentityStore;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{identity_err, AimResult};
use crate::http::HttpCore;
use crate::jwt;

/// Seconds of slack required before a cached access token is considered
/// still usable (spec §4.2: "≥ 60 s away").
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Fallback lifetime assumed for an access token whose `exp` claim can't
/// be read (spec §4.2: "default to a one-hour window").
const UNDECODABLE_TOKEN_LIFETIME_SECS: i64 = 3600;

struct TokenState {
    credentials: AgentCredentials,
    access_expiry_unix: Option<i64>,
}

/// Owns one agent's OAuth refresh/access token lifetime.
pub(crate) struct TokenManager {
    agent_name: String,
    store: Arc<IdentityStore>,
    http: HttpCore,
    state: tokio::sync::Mutex<TokenState>,
}

impl TokenManager {
    pub(crate) fn new(agent_name: String, store: Arc<IdentityStore>, http: HttpCore, credentials: AgentCredentials) -> Self {
        let access_expiry_unix = credentials
            .access_token
            .as_deref()
            .map(|token| jwt::expiry(token).unwrap_or_else(|| Utc::now().timestamp() + UNDECODABLE_TOKEN_LIFETIME_SECS));
        Self {
            agent_name,
            store,
            http,
            state: tokio::sync::Mutex::new(TokenState {
                credentials,
                access_expiry_unix,
            }),
        }
    }

    /// Return a currently-valid access token, refreshing (and, if
    /// necessary, recovering) as needed. Returns `Ok(None)` only when no
    /// refresh token is available at all, or every recovery attempt was
    /// exhausted (spec §4.2: "surface a remediation message... and return
    /// no token" — the message is logged, not raised, so callers fall
    /// back to another auth mode if one exists).
    pub(crate) async fn get_access_token(&self) -> AimResult<Option<String>> {
        let mut state = self.state.lock().await;

        if let (Some(token), Some(expiry)) = (state.credentials.access_token.clone(), state.access_expiry_unix) {
            if expiry - Utc::now().timestamp() >= EXPIRY_BUFFER_SECS {
                return Ok(Some(token));
            }
        }

        self.refresh_locked(&mut state).await
    }

    /// The usage-metering identifier carried in `X-SDK-Token`, if known.
    pub(crate) async fn sdk_token_id(&self) -> Option<String> {
        self.state.lock().await.credentials.sdk_token_id.clone()
    }

    /// Best-effort revoke: always deletes local credentials even if the
    /// server call fails (spec §4.2).
    pub(crate) async fn revoke(&self) -> AimResult<()> {
        let state = self.state.lock().await;
        if let Some(refresh_token) = state.credentials.refresh_token.clone() {
            drop(state);
            let body = serde_json::to_vec(&json!({ "refresh_token": refresh_token })).ok();
            if let Err(e) = self
                .http
                .send_raw_status("POST", "/api/v1/auth/revoke", Vec::new(), body)
                .await
            {
                warn!(error = %e, "best-effort token revocation failed");
            }
        }
        self.store.delete(&self.agent_name).map_err(identity_err)?;
        Ok(())
    }

    async fn refresh_locked(&self, state: &mut TokenState) -> AimResult<Option<String>> {
        let Some(refresh_token) = state.credentials.refresh_token.clone() else {
            return Ok(None);
        };

        let body = serde_json::to_vec(&json!({ "refresh_token": refresh_token })).ok();
        let (status, value) = self
            .http
            .send_raw_status("POST", "/api/v1/auth/refresh", Vec::new(), body)
            .await?;

        if (200..300).contains(&status) {
            self.apply_token_response(state, &value)?;
            return Ok(state.credentials.access_token.clone());
        }

        if looks_revoked_or_invalid(status, &value) {
            info!(agent = %self.agent_name, "refresh token rejected as revoked/invalid, attempting recovery");
            return self.recover_locked(state, &refresh_token).await;
        }

        warn!(agent = %self.agent_name, status, "token refresh failed with no recovery signal");
        Ok(None)
    }

    async fn recover_locked(&self, state: &mut TokenState, old_refresh_token: &str) -> AimResult<Option<String>> {
        let body = serde_json::to_vec(&json!({ "refresh_token": old_refresh_token })).ok();
        let (status, value) = self
            .http
            .send_raw_status("POST", "/api/v1/auth/sdk/recover", Vec::new(), body)
            .await?;

        if (200..300).contains(&status) {
            self.apply_token_response(state, &value)?;
            info!(agent = %self.agent_name, "recovered OAuth credentials after revocation");
            return Ok(state.credentials.access_token.clone());
        }

        warn!(
            agent = %self.agent_name,
            "automatic recovery failed; download a fresh SDK credential bundle and re-register this agent"
        );
        Ok(None)
    }

    fn apply_token_response(&self, state: &mut TokenState, value: &serde_json::Value) -> AimResult<()> {
        if let Some(access_token) = value.get("access_token").and_then(|v| v.as_str()) {
            state.credentials.access_token = Some(access_token.to_string());
            state.access_expiry_unix = Some(
                jwt::expiry(access_token).unwrap_or_else(|| Utc::now().timestamp() + UNDECODABLE_TOKEN_LIFETIME_SECS),
            );
        }

        if let Some(new_refresh) = value.get("refresh_token").and_then(|v| v.as_str()) {
            let rotated = state.credentials.refresh_token.as_deref() != Some(new_refresh);
            state.credentials.refresh_token = Some(new_refresh.to_string());
            if rotated {
                if let Some(jti) = jwt::token_id(new_refresh) {
                    state.credentials.sdk_token_id = Some(jti);
                }
            }
        }

        self.store
            .write(&self.agent_name, state.credentials.clone())
            .map_err(identity_err)?;
        Ok(())
    }
}

fn looks_revoked_or_invalid(status: u16, body: &serde_json::Value) -> bool {
    if status == 401 || status == 403 {
        return body_mentions_revocation(body);
    }
    status == 400 && body_mentions_revocation(body)
}

fn body_mentions_revocation(body: &serde_json::Value) -> bool {
    let text = body.to_string().to_lowercase();
    text.contains("revoked") || text.contains("invalid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;
    use aim_crypto::KeyPair;
    use std::time::Duration;
    use uuid::Uuid;

    fn credentials_with(refresh_token: Option<&str>, access_token: Option<&str>) -> AgentCredentials {
        let kp = KeyPair::generate();
        use base64::Engine;
        AgentCredentials {
            agent_id: Uuid::new_v4(),
            public_key: kp.export_public_key(),
            private_key: base64::engine::general_purpose::STANDARD.encode(kp.export_seed_and_public()),
            server_url: "https://aim.example.com".into(),
            refresh_token: refresh_token.map(str::to_string),
            access_token: access_token.map(str::to_string),
            sdk_token_id: None,
            status: None,
            trust_score: None,
            registered_at: Utc::now(),
        }
    }

    fn manager(store: Arc<IdentityStore>, transport: Arc<ScriptedTransport>, creds: AgentCredentials) -> TokenManager {
        let http = HttpCore {
            transport,
            server_url: "https://aim.example.com".into(),
            request_timeout: Duration::from_secs(5),
            max_retries: 3,
            auto_retry: true,
        };
        TokenManager::new("agent-a".into(), store, http, creds)
    }

    #[tokio::test]
    async fn no_refresh_token_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(IdentityStore::at(dir.path().join("credentials.json")));
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let mgr = manager(store, transport, credentials_with(None, None));
        assert!(mgr.get_access_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refresh_rotates_and_persists_new_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(IdentityStore::at(dir.path().join("credentials.json")));
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(
            200,
            json!({"access_token": "new-access", "refresh_token": "rotated-refresh"}),
        )]));
        let creds = credentials_with(Some("old-refresh"), None);
        store.write("agent-a", creds.clone()).unwrap();
        let mgr = manager(store.clone(), transport, creds);

        let token = mgr.get_access_token().await.unwrap();
        assert_eq!(token.as_deref(), Some("new-access"));

        let persisted = store.read("agent-a").unwrap();
        assert_eq!(persisted.refresh_token.as_deref(), Some("rotated-refresh"));
    }

    #[tokio::test]
    async fn cached_token_is_reused_without_a_call() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(IdentityStore::at(dir.path().join("credentials.json")));
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let far_future_exp = Utc::now().timestamp() + 3600;
        let token = crate::jwt::tests_support_jwt(far_future_exp);
        let creds = credentials_with(Some("rt"), Some(&token));
        let mgr = manager(store, transport.clone(), creds);

        let returned = mgr.get_access_token().await.unwrap();
        assert_eq!(returned.as_deref(), Some(token.as_str()));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn revoked_refresh_triggers_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(IdentityStore::at(dir.path().join("credentials.json")));
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedTransport::ok(401, json!({"error": "token_revoked"})),
            ScriptedTransport::ok(200, json!({"access_token": "recovered-access", "refresh_token": "recovered-refresh"})),
        ]));
        let creds = credentials_with(Some("old-refresh"), None);
        store.write("agent-a", creds.clone()).unwrap();
        let mgr = manager(store.clone(), transport.clone(), creds);

        let token = mgr.get_access_token().await.unwrap();
        assert_eq!(token.as_deref(), Some("recovered-access"));
        assert_eq!(transport.call_count(), 2);
        assert_eq!(
            store.read("agent-a").unwrap().refresh_token.as_deref(),
            Some("recovered-refresh")
        );
    }

    #[tokio::test]
    async fn recovery_failure_returns_none_without_raising() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(IdentityStore::at(dir.path().join("credentials.json")));
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedTransport::ok(401, json!({"error": "invalid_grant"})),
            ScriptedTransport::ok(400, json!({"error": "no_such_recovery"})),
        ]));
        let creds = credentials_with(Some("old-refresh"), None);
        store.write("agent-a", creds.clone()).unwrap();
        let mgr = manager(store, transport, creds);

        let token = mgr.get_access_token().await.unwrap();
        assert!(token.is_none());
    }
}

//! Registration Orchestrator (C4, spec §4.4).
//!
//! Grounded on `client.py`'s constructor and `register_keys`: the
//! load-existing short-circuit, the auth-mode precedence rule resolved in
//! [Open Question 2](../../../DESIGN.md), capability/MCP auto-detection via
//! [`aim_capabilities`], local Ed25519 key generation, and the two
//! registration endpoints.

use std::collections::BTreeMap;
use std::path::PathBuf;

use aim_core::AgentCredentials;
use aim_crypto::KeyPair;
use aim_identity::IdentityStore;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::error::{configuration, identity_err, AimResult};
use crate::http::HttpCore;

/// Which credential the Registration Orchestrator ultimately used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Bearer access token obtained from embedded SDK credentials.
    OAuth,
    /// `X-AIM-API-Key` header.
    ApiKey,
}

/// Caller-supplied inputs to [`register`] (spec §4.4).
#[derive(Debug, Clone)]
pub struct RegisterOptions {
    /// API key for API-key mode.
    pub api_key: Option<String>,
    /// Skip the load-existing short-circuit and always re-register.
    pub force_new: bool,
    /// Force API-key mode even if embedded SDK credentials exist (spec
    /// §4.4 step 2's "requests non-SDK mode").
    pub force_api_key: bool,
    /// Human-readable display name sent at registration.
    pub display_name: Option<String>,
    /// Description sent at registration.
    pub description: Option<String>,
    /// Agent type/category sent at registration.
    pub agent_type: Option<String>,
    /// Arbitrary metadata sent at registration.
    pub metadata: BTreeMap<String, Value>,
    /// Explicit capability list; skips the detector pass when present.
    pub capabilities: Option<Vec<String>>,
    /// Other agents/services this agent talks to.
    pub talks_to: Option<Vec<String>>,
    /// Run the C6 detector pass when `capabilities`/MCP lists aren't
    /// explicitly supplied. Default on (spec §4.4 step 3).
    pub auto_detect: bool,
    /// Source file to scan for `track_action`/`require_approval` call
    /// sites (spec §4.6); `None` skips decorator-based detection.
    pub caller_source: Option<PathBuf>,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            force_new: false,
            force_api_key: false,
            display_name: None,
            description: None,
            agent_type: None,
            metadata: BTreeMap::new(),
            capabilities: None,
            talks_to: None,
            auto_detect: true,
            caller_source: None,
        }
    }
}

/// Outcome of a completed registration or load (spec §4.4).
pub(crate) struct RegistrationOutcome {
    pub(crate) credentials: AgentCredentials,
    pub(crate) auth_mode: AuthMode,
}

/// Run the Registration Orchestrator: load existing credentials for
/// `name`, or register a fresh agent with the server.
pub(crate) async fn register(
    name: &str,
    options: RegisterOptions,
    store: &IdentityStore,
    http: &HttpCore,
    sdk_version: &str,
) -> AimResult<RegistrationOutcome> {
    if !options.force_new {
        if let Ok(credentials) = store.read(name) {
            let auth_mode = if credentials.has_oauth_tokens() {
                AuthMode::OAuth
            } else {
                AuthMode::ApiKey
            };
            return Ok(RegistrationOutcome { credentials, auth_mode });
        }
    }

    let embedded = aim_identity::load_embedded_sdk_credentials();

    let auth_mode = if options.force_api_key {
        if options.api_key.is_none() {
            return Err(configuration("force_api_key was set but no api_key was supplied"));
        }
        AuthMode::ApiKey
    } else if embedded.is_ok() {
        AuthMode::OAuth
    } else if options.api_key.is_some() {
        AuthMode::ApiKey
    } else {
        return Err(configuration(
            "no api_key supplied and no embedded SDK credentials were found; cannot select an auth mode",
        ));
    };

    let capabilities = match &options.capabilities {
        Some(explicit) => explicit.clone(),
        None if options.auto_detect => {
            aim_capabilities::detect_all_capabilities(options.caller_source.as_deref())
        },
        None => Vec::new(),
    };

    let mcp_detections = if options.auto_detect {
        aim_capabilities::mcp::detect_all(sdk_version)
    } else {
        Vec::new()
    };

    let keypair = KeyPair::generate();

    let (agent_id, server_public_key, status, trust_score, refresh_token, access_token, sdk_token_id) =
        match auth_mode {
            AuthMode::OAuth => {
                let embedded = embedded.map_err(identity_err)?;
                let access_token = oauth_access_token(http, &embedded).await?;
                let body = registration_body(name, &options, &capabilities, &keypair);
                let mut headers = vec![("Authorization".to_string(), format!("Bearer {access_token}"))];
                if let Some(token_id) = &embedded.sdk_token_id {
                    headers.push(("X-SDK-Token".to_string(), token_id.clone()));
                }
                let (status_code, value) = http
                    .send_with_retry("POST", "/api/v1/agents", headers, Some(body))
                    .await?;
                let parsed = parse_registration_response(status_code, &value)?;
                (
                    parsed.0,
                    parsed.1,
                    parsed.2,
                    parsed.3,
                    embedded.refresh_token,
                    Some(access_token),
                    embedded.sdk_token_id,
                )
            },
            AuthMode::ApiKey => {
                let api_key = options
                    .api_key
                    .clone()
                    .expect("api_key presence checked during auth-mode selection");
                let body = registration_body(name, &options, &capabilities, &keypair);
                let headers = vec![("X-AIM-API-Key".to_string(), api_key)];
                let (status_code, value) = http
                    .send_with_retry("POST", "/api/v1/public/agents/register", headers, Some(body))
                    .await?;
                let parsed = parse_registration_response(status_code, &value)?;
                (parsed.0, parsed.1, parsed.2, parsed.3, None, None, None)
            },
        };

    if server_public_key.as_bytes() != keypair.public_key_bytes() {
        return Err(configuration(
            "server-returned public key does not match the locally generated key pair",
        ));
    }

    let credentials = AgentCredentials {
        agent_id,
        public_key: server_public_key,
        private_key: encode_private_key(&keypair),
        server_url: http.server_url.clone(),
        refresh_token,
        access_token,
        sdk_token_id,
        status,
        trust_score,
        registered_at: Utc::now(),
    };

    store.write(name, credentials.clone()).map_err(identity_err)?;

    if !mcp_detections.is_empty() {
        report_mcp_detections(http, agent_id, auth_mode, &credentials, &mcp_detections).await;
    }

    Ok(RegistrationOutcome { credentials, auth_mode })
}

fn encode_private_key(keypair: &KeyPair) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(keypair.export_seed_and_public())
}

fn registration_body(
    name: &str,
    options: &RegisterOptions,
    capabilities: &[String],
    keypair: &KeyPair,
) -> Vec<u8> {
    let mut body = json!({
        "name": name,
        "public_key": keypair.export_public_key().to_base64(),
        "capabilities": capabilities,
    });
    let obj = body.as_object_mut().expect("constructed as an object above");
    if let Some(display_name) = &options.display_name {
        obj.insert("display_name".to_string(), json!(display_name));
    }
    if let Some(description) = &options.description {
        obj.insert("description".to_string(), json!(description));
    }
    if let Some(agent_type) = &options.agent_type {
        obj.insert("type".to_string(), json!(agent_type));
    }
    if !options.metadata.is_empty() {
        obj.insert("metadata".to_string(), json!(options.metadata));
    }
    if let Some(talks_to) = &options.talks_to {
        obj.insert("talks_to".to_string(), json!(talks_to));
    }
    serde_json::to_vec(&body).expect("json::Value serialization is infallible")
}

type ParsedRegistration = (Uuid, aim_crypto::PublicKey, Option<String>, Option<f64>);

fn parse_registration_response(status: u16, value: &Value) -> AimResult<ParsedRegistration> {
    if !(200..300).contains(&status) {
        return Err(configuration(format!(
            "agent registration failed with status {status}: {value}"
        )));
    }

    let id_str = value
        .get("agent_id")
        .or_else(|| value.get("id"))
        .and_then(Value::as_str)
        .ok_or_else(|| configuration("registration response missing agent id"))?;
    let agent_id =
        Uuid::parse_str(id_str).map_err(|e| configuration(format!("registration response has an invalid agent id: {e}")))?;

    let public_key_str = value
        .get("public_key")
        .and_then(Value::as_str)
        .ok_or_else(|| configuration("registration response missing public_key"))?;
    let public_key = aim_crypto::PublicKey::from_base64(public_key_str)
        .map_err(|e| configuration(format!("registration response has an invalid public_key: {e}")))?;

    let status_field = value.get("status").and_then(Value::as_str).map(str::to_string);
    let trust_score = value.get("trust_score").and_then(Value::as_f64);

    Ok((agent_id, public_key, status_field, trust_score))
}

/// Obtain an access token suitable for the registration call itself, using
/// whatever embedded-SDK token is already fresh, or refreshing once if
/// only a refresh token is present. This is intentionally independent of
/// [`crate::token_manager::TokenManager`], which requires a fully
/// registered [`AgentCredentials`] that doesn't exist yet at this point.
async fn oauth_access_token(
    http: &HttpCore,
    embedded: &aim_identity::EmbeddedSdkCredentials,
) -> AimResult<String> {
    if let Some(access_token) = &embedded.access_token {
        return Ok(access_token.clone());
    }

    let Some(refresh_token) = &embedded.refresh_token else {
        return Err(configuration(
            "embedded SDK credentials carry neither an access token nor a refresh token",
        ));
    };

    let body = serde_json::to_vec(&json!({ "refresh_token": refresh_token })).ok();
    let (status, value) = http
        .send_raw_status("POST", "/api/v1/auth/refresh", Vec::new(), body)
        .await?;
    if !(200..300).contains(&status) {
        return Err(configuration(format!(
            "could not obtain an access token from embedded SDK credentials (status {status})"
        )));
    }
    value
        .get("access_token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| configuration("refresh response missing access_token"))
}

async fn report_mcp_detections(
    http: &HttpCore,
    agent_id: Uuid,
    auth_mode: AuthMode,
    credentials: &AgentCredentials,
    detections: &[aim_core::DetectionEvent],
) {
    let path = format!("/api/v1/detection/agents/{agent_id}/report");
    let body = match serde_json::to_vec(&json!({ "detections": detections })) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "failed to serialize MCP detections, skipping best-effort report");
            return;
        },
    };

    let headers = match auth_mode {
        AuthMode::OAuth => credentials
            .access_token
            .as_ref()
            .map(|token| vec![("Authorization".to_string(), format!("Bearer {token}"))]),
        AuthMode::ApiKey => None,
    };
    let Some(headers) = headers else {
        warn!("no bearer token available to report MCP detections after registration, skipping");
        return;
    };

    if let Err(e) = http.send_with_retry("POST", &path, headers, Some(body)).await {
        warn!(error = %e, "best-effort MCP detection report failed after registration");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;
    use std::sync::Arc;
    use std::time::Duration;

    fn http_with(transport: Arc<dyn crate::transport::Transport>) -> HttpCore {
        HttpCore {
            transport,
            server_url: "https://aim.example.com".into(),
            request_timeout: Duration::from_secs(5),
            max_retries: 3,
            auto_retry: true,
        }
    }

    #[tokio::test]
    async fn api_key_mode_registers_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::at(dir.path().join("credentials.json"));

        // The scripted transport echoes back whatever public key it
        // receives, since the key pair is generated inside register() and
        // isn't known to the test ahead of time.
        let echo_transport = Arc::new(EchoingRegistrationTransport::default());
        let http = http_with(echo_transport.clone());

        let options = RegisterOptions {
            api_key: Some("k".into()),
            auto_detect: false,
            ..Default::default()
        };

        let outcome = register("svc-a", options, &store, &http, "aim-rust-sdk@0.1.0")
            .await
            .unwrap();

        assert_eq!(outcome.auth_mode, AuthMode::ApiKey);
        assert_eq!(echo_transport.requests().len(), 1);
        let req = &echo_transport.requests()[0];
        assert_eq!(req.url, "https://aim.example.com/api/v1/public/agents/register");
        assert!(req.headers.iter().any(|(k, v)| k == "X-AIM-API-Key" && v == "k"));

        let persisted = store.read("svc-a").unwrap();
        assert_eq!(persisted.agent_id, outcome.credentials.agent_id);
    }

    #[tokio::test]
    async fn existing_credentials_short_circuit_without_a_network_call() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::at(dir.path().join("credentials.json"));
        let kp = KeyPair::generate();
        use base64::Engine;
        let creds = AgentCredentials {
            agent_id: Uuid::new_v4(),
            public_key: kp.export_public_key(),
            private_key: base64::engine::general_purpose::STANDARD.encode(kp.export_seed_and_public()),
            server_url: "https://aim.example.com".into(),
            refresh_token: None,
            access_token: None,
            sdk_token_id: None,
            status: None,
            trust_score: None,
            registered_at: Utc::now(),
        };
        store.write("svc-a", creds.clone()).unwrap();

        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let http = http_with(transport.clone());
        let outcome = register("svc-a", RegisterOptions::default(), &store, &http, "v")
            .await
            .unwrap();

        assert_eq!(outcome.credentials.agent_id, creds.agent_id);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn no_api_key_and_no_embedded_credentials_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::at(dir.path().join("credentials.json"));
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let http = http_with(transport);

        let result = register("svc-a", RegisterOptions::default(), &store, &http, "v").await;
        assert!(matches!(result, Err(aim_core::AimError::Configuration(_))));
    }

    /// A transport used only by [`api_key_mode_registers_and_persists`]
    /// that echoes the generated public key back in the registration
    /// response, since the key is generated inside `register()` itself.
    #[derive(Default)]
    struct EchoingRegistrationTransport {
        received: std::sync::Mutex<Vec<crate::transport::PreparedRequest>>,
    }

    impl EchoingRegistrationTransport {
        fn requests(&self) -> Vec<crate::transport::PreparedRequest> {
            self.received.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl crate::transport::Transport for EchoingRegistrationTransport {
        async fn send(
            &self,
            request: crate::transport::PreparedRequest,
        ) -> Result<crate::transport::RawResponse, crate::transport::TransportError> {
            let body: Value = request
                .body
                .as_deref()
                .and_then(|b| serde_json::from_slice(b).ok())
                .unwrap_or(Value::Null);
            let public_key = body.get("public_key").cloned().unwrap_or(Value::Null);
            self.received.lock().unwrap().push(request);
            let response = json!({
                "agent_id": Uuid::new_v4().to_string(),
                "public_key": public_key,
                "status": "active",
                "trust_score": 50.0,
            });
            Ok(crate::transport::RawResponse {
                status: 201,
                body: serde_json::to_vec(&response).unwrap(),
            })
        }
    }
}

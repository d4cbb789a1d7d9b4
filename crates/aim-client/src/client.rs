//! `AimClient`: the SDK's single public entry point (spec §1, §4.4).
//!
//! `AimClient::register` ties together the Identity Store (C1), Token
//! Manager (C2), Signing Engine (C3), Registration Orchestrator (C4),
//! Action Verifier (C5), and Detectors (C6) behind one call, matching
//! `client.py`'s `AIMClient.__init__`/`register_keys` flow collapsed into
//! a single async constructor idiomatic for Rust.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use aim_config::{ClientConfig, ClientConfigOverrides};
use aim_core::{AimError, Capability, CapabilityReport, DetectionEvent, Environment, RiskLevel, VerificationDecision};
use aim_crypto::KeyPair;
use aim_identity::IdentityStore;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::audit::{default_audit_path, AuditLog};
use crate::auth::AuthHeaderSource;
use crate::error::{configuration, identity_err, AimResult};
use crate::http::{self, HttpCore};
use crate::registration::{self, AuthMode, RegisterOptions};
use crate::token_manager::TokenManager;
use crate::transport::{ReqwestTransport, Transport};
use crate::verifier::{FailOpen, Verifier};
use crate::wrappers::{self, ActionDescriptor, WrappedOutcome};

/// A registered agent identity plus its verification/registration
/// surface. The only public type most applications need to construct.
pub struct AimClient {
    name: String,
    agent_id: Uuid,
    keypair: KeyPair,
    http: HttpCore,
    store: Arc<IdentityStore>,
    token_manager: Option<TokenManager>,
    api_key: Option<String>,
    audit: AuditLog,
    fail_open: FailOpen,
}

impl AimClient {
    /// Register a fresh agent, or load one already registered under
    /// `name`, using OS credential discovery and a pooled `reqwest`
    /// transport (spec §4.4).
    ///
    /// # Errors
    ///
    /// Returns [`AimError::Configuration`] if no auth mode can be
    /// selected, no `server_url` is configured, or the server-returned
    /// public key doesn't match the locally generated key pair.
    pub async fn register(name: impl Into<String>, options: RegisterOptions) -> AimResult<Self> {
        let store = IdentityStore::discover().map_err(identity_err)?;
        let config = aim_config::load(&ClientConfigOverrides::default()).map_err(|e| configuration(e.to_string()))?;
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new());
        Self::register_with(name, options, store, transport, config).await
    }

    /// Same as [`Self::register`], with the Identity Store, transport,
    /// and merged configuration supplied by the caller — the seam tests
    /// (and embedders that want a non-default transport) use instead of
    /// touching the real filesystem or network.
    ///
    /// # Errors
    ///
    /// See [`Self::register`].
    pub async fn register_with(
        name: impl Into<String>,
        mut options: RegisterOptions,
        store: IdentityStore,
        transport: Arc<dyn Transport>,
        config: ClientConfig,
    ) -> AimResult<Self> {
        let name = name.into();
        let store = Arc::new(store);

        if options.api_key.is_none() {
            options.api_key = config.api_key.clone();
        }
        let api_key_for_headers = options.api_key.clone();

        let server_url = if !options.force_new {
            store.read(&name).ok().map(|creds| creds.server_url)
        } else {
            None
        }
        .or_else(|| config.server_url.clone())
        .ok_or_else(|| configuration("no server_url configured and no existing credentials to load"))?;

        let http = HttpCore {
            transport,
            server_url,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries,
            auto_retry: config.auto_retry,
        };

        let outcome = registration::register(&name, options, &store, &http, &http::sdk_version()).await?;

        let keypair = outcome.credentials.keypair()?;
        if keypair.public_key_bytes() != outcome.credentials.public_key.as_bytes() {
            return Err(AimError::CorruptCredentials(
                "stored public_key does not derive from the stored private_key".into(),
            ));
        }

        let token_manager = match outcome.auth_mode {
            AuthMode::OAuth => Some(TokenManager::new(
                name.clone(),
                store.clone(),
                http.clone(),
                outcome.credentials.clone(),
            )),
            AuthMode::ApiKey => None,
        };
        let api_key = match outcome.auth_mode {
            AuthMode::ApiKey => api_key_for_headers,
            AuthMode::OAuth => None,
        };

        let audit = AuditLog::at(default_audit_path(&name));
        if let Err(e) = audit.append(
            &keypair,
            "registered",
            json!({
                "agent_id": outcome.credentials.agent_id,
                "auth_mode": format!("{:?}", outcome.auth_mode),
            }),
        ) {
            warn!(error = %e, "failed to append registration event to local audit trail");
        }

        Ok(Self {
            name,
            agent_id: outcome.credentials.agent_id,
            keypair,
            http,
            store,
            token_manager,
            api_key,
            audit,
            fail_open: config.fail_open.into(),
        })
    }

    /// This agent's server-assigned id.
    #[must_use]
    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    /// The name this client was registered/loaded under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn verifier(&self) -> Verifier<'_> {
        Verifier {
            http: &self.http,
            agent_id: self.agent_id,
            keypair: &self.keypair,
            auth: self,
            fail_open: self.fail_open,
        }
    }

    /// Submit a signed verification request and resolve it to a terminal
    /// decision, polling if the server returns `pending` (spec §4.5).
    ///
    /// # Errors
    ///
    /// Returns [`AimError::ActionDenied`], [`AimError::Authentication`],
    /// or [`AimError::VerificationError`] per spec §4.5/§7.
    pub async fn verify_action(
        &self,
        action_type: &str,
        resource: Option<String>,
        context: BTreeMap<String, Value>,
        timeout_seconds: u64,
    ) -> AimResult<VerificationDecision> {
        let decision = self.verifier().verify_action(action_type, resource, context, timeout_seconds).await;
        let append_result = match &decision {
            Ok(d) => self.audit.append(
                &self.keypair,
                "verify_action",
                json!({"action_type": action_type, "verification_id": d.verification_id, "status": format!("{:?}", d.status)}),
            ),
            Err(e) => self
                .audit
                .append(&self.keypair, "verify_action_failed", json!({"action_type": action_type, "error": e.to_string()})),
        };
        if let Err(e) = append_result {
            warn!(error = %e, "failed to append verify_action event to local audit trail");
        }
        decision
    }

    /// Report the outcome of executing an approved action (spec §4.5).
    /// Best-effort: errors are swallowed.
    pub async fn log_action_result(&self, verification_id: &str, success: bool, summary: Option<&str>, error: Option<&str>) {
        self.verifier().log_action_result(verification_id, success, summary, error).await;
    }

    /// Wrap `body` with verify-then-execute-then-log for low/medium-risk
    /// actions (spec §4.5's `track_action`).
    pub async fn track_action<T, E, F, Fut>(
        &self,
        risk_level: RiskLevel,
        action_name: Option<&str>,
        resource: Option<String>,
        body: F,
    ) -> WrappedOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let descriptor = ActionDescriptor {
            risk_level,
            function_name: action_name.map(str::to_string).unwrap_or_else(|| "anonymous_action".to_string()),
            resource,
            extra_context: BTreeMap::new(),
        };
        wrappers::track_action(&self.verifier(), descriptor, body).await
    }

    /// Wrap `body` with verify-then-execute-then-log for high/critical-risk
    /// actions, waiting up to `timeout_seconds` (default one hour) for
    /// human approval (spec §4.5's `require_approval`).
    pub async fn require_approval<T, E, F, Fut>(
        &self,
        risk_level: RiskLevel,
        action_name: Option<&str>,
        resource: Option<String>,
        timeout_seconds: Option<u64>,
        body: F,
    ) -> WrappedOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let descriptor = ActionDescriptor {
            risk_level,
            function_name: action_name.map(str::to_string).unwrap_or_else(|| "anonymous_action".to_string()),
            resource,
            extra_context: BTreeMap::new(),
        };
        wrappers::require_approval(&self.verifier(), descriptor, timeout_seconds, body).await
    }

    /// Best-effort revoke: invalidates the refresh token server-side (OAuth
    /// mode) and always deletes local credentials (spec §4.2).
    ///
    /// # Errors
    ///
    /// Returns an error only if deleting the local credential entry fails.
    pub async fn revoke(&self) -> AimResult<()> {
        if let Err(e) = self.audit.append(&self.keypair, "revoked", json!({"agent_id": self.agent_id})) {
            warn!(error = %e, "failed to append revoke event to local audit trail");
        }
        match &self.token_manager {
            Some(token_manager) => token_manager.revoke().await,
            None => self.store.delete(&self.name).map_err(identity_err),
        }
    }

    async fn call(&self, method: &str, path: &str, body: Option<Vec<u8>>) -> AimResult<(u16, Value)> {
        let headers = self.auth_headers(method, path, body.as_deref()).await?;
        self.http.send_with_retry(method, path, headers, body).await
    }

    fn expect_success(method: &str, path: &str, status: u16, value: Value) -> AimResult<Value> {
        if (200..300).contains(&status) {
            Ok(value)
        } else {
            Err(configuration(format!("{method} {path} failed with status {status}: {value}")))
        }
    }

    /// `GET /api/v1/agents/{id}` (spec §6, SPEC_FULL §11.4).
    ///
    /// # Errors
    ///
    /// Returns [`AimError::Configuration`] on a non-2xx response.
    pub async fn get_agent_details(&self) -> AimResult<Value> {
        let path = format!("/api/v1/agents/{}", self.agent_id);
        let (status, value) = self.call("GET", &path, None).await?;
        Self::expect_success("GET", &path, status, value)
    }

    /// `PUT /api/v1/agents/{id}` (spec §6, SPEC_FULL §11.4).
    ///
    /// # Errors
    ///
    /// Returns [`AimError::Configuration`] on a non-2xx response.
    pub async fn update_agent(&self, updates: Value) -> AimResult<Value> {
        let path = format!("/api/v1/agents/{}", self.agent_id);
        let body = serde_json::to_vec(&updates).map_err(|e| configuration(e.to_string()))?;
        let (status, value) = self.call("PUT", &path, Some(body)).await?;
        Self::expect_success("PUT", &path, status, value)
    }

    /// `DELETE /api/v1/agents/{id}` — soft-deletes the agent record on the
    /// control plane (spec §6, SPEC_FULL §11.4). Local credentials are
    /// untouched; call [`Self::revoke`] separately to remove them.
    ///
    /// # Errors
    ///
    /// Returns [`AimError::Configuration`] on a non-2xx response.
    pub async fn delete_agent(&self) -> AimResult<()> {
        let path = format!("/api/v1/agents/{}", self.agent_id);
        let (status, value) = self.call("DELETE", &path, None).await?;
        Self::expect_success("DELETE", &path, status, value).map(|_| ())
    }

    /// `GET /api/v1/agents?page=..&page_size=..` (spec §6, SPEC_FULL §11.4).
    ///
    /// # Errors
    ///
    /// Returns [`AimError::Configuration`] on a non-2xx response.
    pub async fn list_agents(&self, page: Option<u32>, page_size: Option<u32>) -> AimResult<Value> {
        let mut query = Vec::new();
        if let Some(page) = page {
            query.push(format!("page={page}"));
        }
        if let Some(page_size) = page_size {
            query.push(format!("page_size={page_size}"));
        }
        let path = if query.is_empty() {
            "/api/v1/agents".to_string()
        } else {
            format!("/api/v1/agents?{}", query.join("&"))
        };
        let (status, value) = self.call("GET", &path, None).await?;
        Self::expect_success("GET", &path, status, value)
    }

    /// Grant one named capability, idempotently (spec §8 law 8,
    /// SPEC_FULL §11.1's `POST .../capabilities`).
    ///
    /// # Errors
    ///
    /// Returns [`AimError::Configuration`] on a non-2xx response.
    pub async fn grant_capability(&self, capability: &Capability, scope: Value) -> AimResult<()> {
        let path = format!("/api/v1/sdk-api/agents/{}/capabilities", self.agent_id);
        let body = serde_json::to_vec(&json!({"capability": capability, "scope": scope})).map_err(|e| configuration(e.to_string()))?;
        let (status, value) = self.call("POST", &path, Some(body)).await?;
        Self::expect_success("POST", &path, status, value).map(|_| ())
    }

    /// Submit a bulk capability report assembled from the Detectors
    /// (spec §3 `CapabilityReport`, §6's `/detection/agents/{id}/report`
    /// endpoint also carries capability reports for this SDK's bulk path).
    ///
    /// # Errors
    ///
    /// Returns [`AimError::Configuration`] on a non-2xx response.
    pub async fn report_capabilities(&self, capabilities: impl IntoIterator<Item = Capability>) -> AimResult<()> {
        let environment = Environment::current(http::sdk_version(), Vec::new());
        let report = CapabilityReport::new(capabilities.into_iter().collect(), environment);
        let path = format!("/api/v1/detection/agents/{}/report", self.agent_id);
        let body = serde_json::to_vec(&report).map_err(|e| configuration(e.to_string()))?;
        let (status, value) = self.call("POST", &path, Some(body)).await?;
        Self::expect_success("POST", &path, status, value).map(|_| ())
    }

    /// Attach a discovered MCP server to this agent's record (spec §4.6,
    /// SPEC_FULL §11.2), distinct from the bulk detection report.
    ///
    /// # Errors
    ///
    /// Returns [`AimError::Configuration`] on a non-2xx response.
    pub async fn attach_mcp_server(&self, detection: &DetectionEvent) -> AimResult<()> {
        let path = format!("/api/v1/sdk-api/agents/{}/mcp-servers", self.agent_id);
        let body = serde_json::to_vec(detection).map_err(|e| configuration(e.to_string()))?;
        let (status, value) = self.call("POST", &path, Some(body)).await?;
        Self::expect_success("POST", &path, status, value).map(|_| ())
    }

    /// Record one MCP tool invocation in the process-wide runtime tracker
    /// and report it to the control plane (spec §3 `RuntimeCallTracker`,
    /// SPEC_FULL §11.2).
    ///
    /// # Errors
    ///
    /// Returns [`AimError::Configuration`] on a non-2xx response.
    pub async fn report_mcp_connection(&self, mcp_server: &str, tool_name: Option<&str>) -> AimResult<()> {
        aim_capabilities::mcp::track_mcp_call(mcp_server, tool_name);
        let path = format!("/api/v1/sdk-api/agents/{}/mcp-connections", self.agent_id);
        let body = serde_json::to_vec(&json!({"mcpServer": mcp_server, "tool": tool_name}))
            .map_err(|e| configuration(e.to_string()))?;
        let (status, value) = self.call("POST", &path, Some(body)).await?;
        Self::expect_success("POST", &path, status, value).map(|_| ())
    }

    /// Submit a signed attestation about an MCP server's identity/version
    /// (spec §6, SPEC_FULL §11.3). `claim` must be a JSON object; this
    /// method stamps `agent_id` onto it and signs the resulting canonical
    /// JSON, the same action-payload signing primitive used for
    /// verification requests.
    ///
    /// # Errors
    ///
    /// Returns [`AimError::Configuration`] if `claim` is not a JSON object
    /// or the server responds with a non-2xx status.
    pub async fn attest_mcp_server(&self, server_id: &str, mut claim: Value) -> AimResult<Value> {
        let obj = claim
            .as_object_mut()
            .ok_or_else(|| configuration("attestation claim must be a JSON object"))?;
        obj.insert("agent_id".to_string(), json!(self.agent_id));
        let payload = aim_crypto::to_canonical_json(&claim)?;
        let signature = self.keypair.sign(&payload);
        obj.insert("signature".to_string(), json!(signature.to_base64()));
        obj.insert("public_key".to_string(), json!(self.keypair.export_public_key().to_base64()));

        let path = format!("/api/v1/mcp-servers/{server_id}/attest");
        let body = serde_json::to_vec(&claim).map_err(|e| configuration(e.to_string()))?;
        let (status, value) = self.call("POST", &path, Some(body)).await?;
        Self::expect_success("POST", &path, status, value)
    }
}

#[async_trait]
impl AuthHeaderSource for AimClient {
    /// The header-priority rule from spec §6: `Authorization: Bearer`
    /// first if an OAuth access token is available, then `X-API-Key`,
    /// then the Ed25519 envelope quartet as the last resort. `X-SDK-Token`
    /// is attached alongside whichever of those is chosen, when known.
    async fn auth_headers(&self, method: &str, path: &str, body: Option<&[u8]>) -> AimResult<Vec<(String, String)>> {
        if let Some(token_manager) = &self.token_manager {
            if let Some(token) = token_manager.get_access_token().await? {
                let mut headers = vec![("Authorization".to_string(), format!("Bearer {token}"))];
                if let Some(sdk_token_id) = token_manager.sdk_token_id().await {
                    headers.push(("X-SDK-Token".to_string(), sdk_token_id));
                }
                return Ok(headers);
            }
        }

        if let Some(api_key) = &self.api_key {
            return Ok(vec![("X-API-Key".to_string(), api_key.clone())]);
        }

        let timestamp = Utc::now().timestamp();
        let envelope = aim_crypto::sign_envelope_raw(&self.keypair, &self.agent_id.to_string(), method, path, timestamp, body);
        Ok(vec![
            ("X-Agent-ID".to_string(), envelope.agent_id),
            ("X-Signature".to_string(), envelope.signature),
            ("X-Timestamp".to_string(), envelope.timestamp),
            ("X-Public-Key".to_string(), envelope.public_key),
        ])
    }
}

//! Action Verifier (C5, spec §4.5).
//!
//! Grounded on `client.py::verify_action`/`_wait_for_approval`/
//! `log_action_result`: submit a signed verification, interpret the
//! immediate response, poll on exponential backoff when pending, and
//! best-effort log the post-execution outcome. Endpoint paths follow
//! spec §6's `sdk-api` family rather than the older paths seen elsewhere
//! in the source.

use std::collections::BTreeMap;
use std::time::Duration;

use aim_core::{VerificationDecision, VerificationRequest, VerificationStatus};
use aim_crypto::KeyPair;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthHeaderSource;
use crate::error::{AimError, AimResult};
use crate::http::HttpCore;

/// Initial polling interval (spec §5).
const POLL_INITIAL: Duration = Duration::from_secs(2);
/// Polling backoff multiplier per iteration (spec §5).
const POLL_BACKOFF_FACTOR: f64 = 1.5;
/// Polling interval ceiling (spec §5).
const POLL_MAX: Duration = Duration::from_secs(10);

/// Whether the control plane should be treated as reachable-but-denying
/// when it cannot be reached at all (spec §9's "graceful control-plane
/// outage" design note, surfaced as [`aim_config::ClientConfig::fail_open`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailOpen {
    /// Network/404/5xx failures synthesize a pending decision.
    Yes,
    /// Network/404/5xx failures raise [`AimError::VerificationError`].
    No,
}

impl From<bool> for FailOpen {
    fn from(value: bool) -> Self {
        if value { FailOpen::Yes } else { FailOpen::No }
    }
}

pub(crate) struct Verifier<'a> {
    pub(crate) http: &'a HttpCore,
    pub(crate) agent_id: Uuid,
    pub(crate) keypair: &'a KeyPair,
    pub(crate) auth: &'a dyn AuthHeaderSource,
    pub(crate) fail_open: FailOpen,
}

impl<'a> Verifier<'a> {
    /// Submit a signed [`VerificationRequest`] and either return
    /// immediately (approved/denied) or enter the poll loop (pending).
    ///
    /// # Errors
    ///
    /// Returns [`AimError::Authentication`] on 401/403, or
    /// [`AimError::ActionDenied`] on a `denied` decision.
    pub(crate) async fn verify_action(
        &self,
        action_type: &str,
        resource: Option<String>,
        context: BTreeMap<String, Value>,
        timeout_seconds: u64,
    ) -> AimResult<VerificationDecision> {
        let mut request = VerificationRequest::new(self.agent_id, action_type, resource, context);
        request.sign(self.keypair)?;

        let body = serde_json::to_vec(&request).map_err(|e| AimError::Configuration(e.to_string()))?;
        let headers = self
            .auth
            .auth_headers("POST", "/api/v1/sdk-api/verifications", Some(&body))
            .await?;

        let send_result = self
            .http
            .send_with_retry("POST", "/api/v1/sdk-api/verifications", headers, Some(body))
            .await;

        let (status, value) = match send_result {
            Ok(ok) => ok,
            Err(AimError::Authentication(msg)) => return Err(AimError::Authentication(msg)),
            Err(e) => return self.synthesize_or_raise(e.to_string()),
        };

        if status == 404 || status >= 500 {
            return self.synthesize_or_raise(format!("server returned status {status}"));
        }

        let decision = decision_from_value(&value)?;
        match decision.status {
            VerificationStatus::Approved => Ok(decision),
            VerificationStatus::Denied => Err(AimError::ActionDenied(
                decision.denial_reason.unwrap_or_else(|| "denied".to_string()),
            )),
            VerificationStatus::Pending => self.wait_for_approval(&decision.verification_id, timeout_seconds).await,
        }
    }

    fn synthesize_or_raise(&self, reason: String) -> AimResult<VerificationDecision> {
        match self.fail_open {
            FailOpen::Yes => {
                warn!(reason = %reason, "verification request failed, synthesizing a pending decision (fail-open)");
                Ok(VerificationDecision {
                    verification_id: format!("synthetic-{}", Uuid::new_v4()),
                    status: VerificationStatus::Pending,
                    approved_by: None,
                    denial_reason: None,
                    expires_at: None,
                    error: Some(reason),
                })
            },
            FailOpen::No => Err(AimError::VerificationError(reason)),
        }
    }

    /// Poll `GET /api/v1/sdk-api/verifications/{id}` on exponential
    /// backoff (2 s initial, ×1.5, capped at 10 s) until a terminal
    /// decision or `timeout_seconds` elapses.
    async fn wait_for_approval(&self, verification_id: &str, timeout_seconds: u64) -> AimResult<VerificationDecision> {
        let path = format!("/api/v1/sdk-api/verifications/{verification_id}");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_seconds);
        let mut interval = POLL_INITIAL;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(AimError::VerificationError(format!(
                    "verification {verification_id} did not reach a terminal state within {timeout_seconds}s"
                )));
            }

            tokio::time::sleep(interval.min(time_remaining(deadline))).await;
            interval = next_interval(interval);

            let headers = match self.auth.auth_headers("GET", &path, None).await {
                Ok(headers) => headers,
                Err(e) => {
                    info!(error = %e, "could not build auth headers for poll, continuing until deadline");
                    continue;
                },
            };

            match self.http.send_with_retry("GET", &path, headers, None).await {
                Ok((status, value)) if (200..300).contains(&status) => match decision_from_value(&value) {
                    Ok(decision) => match decision.status {
                        VerificationStatus::Approved => return Ok(decision),
                        VerificationStatus::Denied => {
                            return Err(AimError::ActionDenied(
                                decision.denial_reason.unwrap_or_else(|| "denied".to_string()),
                            ))
                        },
                        VerificationStatus::Pending => continue,
                    },
                    Err(e) => {
                        info!(error = %e, "malformed poll response, continuing until deadline");
                        continue;
                    },
                },
                Ok((status, _)) => {
                    info!(status, "non-terminal poll response, continuing until deadline");
                    continue;
                },
                Err(e) => {
                    info!(error = %e, "poll request failed, continuing until deadline");
                    continue;
                },
            }
        }
    }

    /// Report the outcome of executing an approved action. Best-effort:
    /// failures are swallowed and never propagate to the caller (spec
    /// §4.5, §7).
    pub(crate) async fn log_action_result(
        &self,
        verification_id: &str,
        success: bool,
        summary: Option<&str>,
        error: Option<&str>,
    ) {
        let path = format!("/api/v1/sdk-api/verifications/{verification_id}/result");
        let body = json!({
            "status": if success { "success" } else { "failure" },
            "summary": summary,
            "error": error,
        });
        let Ok(bytes) = serde_json::to_vec(&body) else {
            return;
        };
        let Ok(headers) = self.auth.auth_headers("POST", &path, Some(&bytes)).await else {
            warn!(verification_id, "failed to build auth headers for result logging (swallowed)");
            return;
        };
        if let Err(e) = self.http.send_with_retry("POST", &path, headers, Some(bytes)).await {
            warn!(error = %e, verification_id, "failed to log action result (swallowed)");
        }
    }
}

fn next_interval(current: Duration) -> Duration {
    let scaled = current.mul_f64(POLL_BACKOFF_FACTOR);
    scaled.min(POLL_MAX)
}

fn time_remaining(deadline: tokio::time::Instant) -> Duration {
    deadline.saturating_duration_since(tokio::time::Instant::now())
}

fn decision_from_value(value: &Value) -> AimResult<VerificationDecision> {
    serde_json::from_value(value.clone())
        .map_err(|e| AimError::VerificationError(format!("could not parse verification decision: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;
    use std::sync::Arc;

    struct FixedBearer;

    #[async_trait::async_trait]
    impl AuthHeaderSource for FixedBearer {
        async fn auth_headers(&self, _method: &str, _path: &str, _body: Option<&[u8]>) -> AimResult<Vec<(String, String)>> {
            Ok(vec![("Authorization".to_string(), "Bearer t".to_string())])
        }
    }

    fn verifier<'a>(
        http: &'a HttpCore,
        keypair: &'a KeyPair,
        agent_id: Uuid,
        auth: &'a dyn AuthHeaderSource,
        fail_open: FailOpen,
    ) -> Verifier<'a> {
        Verifier {
            http,
            agent_id,
            keypair,
            auth,
            fail_open,
        }
    }

    fn http_with(transport: Arc<ScriptedTransport>) -> HttpCore {
        HttpCore {
            transport,
            server_url: "https://aim.example.com".into(),
            request_timeout: Duration::from_secs(5),
            max_retries: 3,
            auto_retry: true,
        }
    }

    #[tokio::test]
    async fn approved_returns_immediately_with_no_poll() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(
            200,
            json!({"verification_id": "v1", "status": "approved"}),
        )]));
        let http = http_with(transport.clone());
        let keypair = KeyPair::generate();
        let v = verifier(&http, &keypair, Uuid::new_v4(), &FixedBearer, FailOpen::Yes);

        let decision = v.verify_action("read_files", None, BTreeMap::new(), 5).await.unwrap();
        assert!(decision.verified());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn denied_raises_action_denied() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(
            200,
            json!({"verification_id": "v1", "status": "denied", "denial_reason": "policy:write"}),
        )]));
        let http = http_with(transport);
        let keypair = KeyPair::generate();
        let v = verifier(&http, &keypair, Uuid::new_v4(), &FixedBearer, FailOpen::Yes);

        let err = v.verify_action("write_files", None, BTreeMap::new(), 5).await.unwrap_err();
        assert!(matches!(err, AimError::ActionDenied(reason) if reason == "policy:write"));
    }

    #[tokio::test]
    async fn pending_then_approved_after_polling() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ScriptedTransport::ok(200, json!({"verification_id": "v1", "status": "pending"})),
            ScriptedTransport::ok(200, json!({"verification_id": "v1", "status": "pending"})),
            ScriptedTransport::ok(200, json!({"verification_id": "v1", "status": "approved"})),
        ]));
        let http = http_with(transport.clone());
        let keypair = KeyPair::generate();
        let v = verifier(&http, &keypair, Uuid::new_v4(), &FixedBearer, FailOpen::Yes);

        let decision = v
            .verify_action("read_files", None, BTreeMap::new(), 30)
            .await
            .unwrap();
        assert!(decision.verified());
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn network_failure_synthesizes_pending_when_fail_open() {
        // auto_retry off so the single scripted 500 is the final answer
        // rather than being retried away.
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(500, json!({}))]));
        let mut http = http_with(transport);
        http.auto_retry = false;
        let keypair = KeyPair::generate();
        let v = verifier(&http, &keypair, Uuid::new_v4(), &FixedBearer, FailOpen::Yes);

        let decision = v.verify_action("read_files", None, BTreeMap::new(), 1).await.unwrap();
        assert!(!decision.verified());
        assert_eq!(decision.status, VerificationStatus::Pending);
        assert!(decision.error.is_some());
    }

    #[tokio::test]
    async fn authentication_error_is_never_synthesized() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(401, json!({}))]));
        let http = http_with(transport);
        let keypair = KeyPair::generate();
        let v = verifier(&http, &keypair, Uuid::new_v4(), &FixedBearer, FailOpen::Yes);

        let err = v.verify_action("read_files", None, BTreeMap::new(), 1).await.unwrap_err();
        assert!(matches!(err, AimError::Authentication(_)));
    }

    #[tokio::test]
    async fn log_action_result_swallows_errors() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let http = http_with(transport);
        let keypair = KeyPair::generate();
        let v = verifier(&http, &keypair, Uuid::new_v4(), &FixedBearer, FailOpen::Yes);
        v.log_action_result("v1", true, Some("ok"), None).await;
    }
}

//! Shared request execution: header-less sends with the retry/backoff
//! policy from spec §5, reused by both the Token Manager (unauthenticated
//! auth endpoints) and [`crate::client::AimClient`] (authenticated calls).

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AimError;
use crate::transport::{PreparedRequest, Transport, TransportError};

/// User-Agent value sent on every request (spec §6).
pub(crate) fn user_agent() -> String {
    format!("aim-rust-sdk/{}", env!("CARGO_PKG_VERSION"))
}

/// SDK version string stamped into `DetectionEvent::sdk_version` and
/// `CapabilityReport`'s `environment.version` (spec §3).
#[must_use]
pub(crate) fn sdk_version() -> String {
    format!("aim-rust-sdk@{}", env!("CARGO_PKG_VERSION"))
}

/// The pieces every HTTP-issuing component needs: a transport, a base
/// URL, and the retry knobs from [`aim_config::ClientConfig`].
#[derive(Clone)]
pub(crate) struct HttpCore {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) server_url: String,
    pub(crate) request_timeout: Duration,
    pub(crate) max_retries: u32,
    pub(crate) auto_retry: bool,
}

impl HttpCore {
    /// Send `body` (already-serialized bytes, or none) to `path` with
    /// `headers`, retrying idempotent server/transport failures with
    /// `2^n` backoff up to `max_retries` (spec §5). 401/403 short-circuit
    /// immediately as [`AimError::Authentication`].
    ///
    /// Returns the final status code and the parsed JSON body (an empty
    /// object if the body isn't valid JSON, matching endpoints that
    /// return no content on success).
    pub(crate) async fn send_with_retry(
        &self,
        method: &str,
        path: &str,
        mut headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> Result<(u16, Value), AimError> {
        headers.push(("User-Agent".to_string(), user_agent()));
        if body.is_some() && !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        let mut attempt = 0u32;
        loop {
            let request = PreparedRequest {
                method: method.to_string(),
                url: format!("{}{}", self.server_url, path),
                headers: headers.clone(),
                body: body.clone(),
                timeout: self.request_timeout,
            };

            match self.transport.send(request).await {
                Ok(response) => {
                    if response.status == 401 || response.status == 403 {
                        return Err(AimError::Authentication(format!(
                            "server returned {} for {method} {path}",
                            response.status
                        )));
                    }
                    if response.status >= 500 && self.should_retry(attempt) {
                        self.backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    let value = parse_body(&response.body);
                    return Ok((response.status, value));
                },
                Err(TransportError::Failed(reason)) => {
                    if self.should_retry(attempt) {
                        warn!(error = %reason, attempt, "transport error, retrying");
                        self.backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(AimError::Transport(reason));
                },
            }
        }
    }

    /// Like [`Self::send_with_retry`], but never special-cases 401/403 —
    /// used for the `/auth/*` endpoints (spec §6), where the Token
    /// Manager itself needs the response body of a 401 to tell a revoked
    /// token apart from any other rejection (spec §4.2, §8 S5).
    pub(crate) async fn send_raw_status(
        &self,
        method: &str,
        path: &str,
        mut headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> Result<(u16, Value), AimError> {
        headers.push(("User-Agent".to_string(), user_agent()));
        if body.is_some() && !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        let mut attempt = 0u32;
        loop {
            let request = PreparedRequest {
                method: method.to_string(),
                url: format!("{}{}", self.server_url, path),
                headers: headers.clone(),
                body: body.clone(),
                timeout: self.request_timeout,
            };

            match self.transport.send(request).await {
                Ok(response) => {
                    if response.status >= 500 && self.should_retry(attempt) {
                        self.backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok((response.status, parse_body(&response.body)));
                },
                Err(TransportError::Failed(reason)) => {
                    if self.should_retry(attempt) {
                        warn!(error = %reason, attempt, "transport error, retrying");
                        self.backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(AimError::Transport(reason));
                },
            }
        }
    }

    fn should_retry(&self, attempt: u32) -> bool {
        self.auto_retry && attempt < self.max_retries
    }

    async fn backoff(&self, attempt: u32) {
        let delay = Duration::from_secs(2u64.saturating_pow(attempt));
        debug!(attempt, delay_secs = delay.as_secs(), "backing off before retry");
        tokio::time::sleep(delay).await;
    }
}

fn parse_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

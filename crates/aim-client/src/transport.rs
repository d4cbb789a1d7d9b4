//! Pluggable HTTP transport (SPEC_FULL.md §11.5).
//!
//! The Python source hard-codes a `requests.Session`; Rust's idiomatic
//! seam for this is a narrow `async_trait`, the same pattern the
//! reference runtime uses at integration boundaries (`IdentityStore`,
//! `Frontend`). Everything above this trait — retry/backoff, polling,
//! header construction — is pure and can be unit-tested against a fake
//! `Transport` without a live network.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// A fully-built request, ready to hand to a [`Transport`].
///
/// `body`, when present, must be the exact bytes that were signed (spec
/// §4.3(b), §9: "the client must transmit exactly the bytes it signed,
/// not re-serialize").
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Uppercase HTTP method (`GET`, `POST`, `PUT`, `DELETE`).
    pub method: String,
    /// Absolute URL (`server_url` joined with the endpoint path).
    pub url: String,
    /// Header name/value pairs, in the order they should be attached.
    pub headers: Vec<(String, String)>,
    /// Raw request body, if any.
    pub body: Option<Vec<u8>>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// The raw result of sending a [`PreparedRequest`].
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body bytes.
    pub body: Vec<u8>,
}

/// Transport-level failure: the request never produced an HTTP response
/// (DNS, connection refused, TLS handshake, timeout).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Wraps whatever the underlying HTTP client reported.
    #[error("request failed: {0}")]
    Failed(String),
}

/// A pluggable sender of [`PreparedRequest`]s.
///
/// Implemented by default with [`ReqwestTransport`]; tests substitute a
/// fake implementation to exercise retry/backoff/polling logic
/// deterministically.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the raw response, or a transport-level
    /// error if no response was obtained at all.
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, TransportError>;
}

/// Default [`Transport`] backed by a pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with a fresh connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?
            .to_vec();
        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;

    #[tokio::test]
    async fn scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::new(vec![Ok(RawResponse {
            status: 200,
            body: b"{}".to_vec(),
        })]);
        let request = PreparedRequest {
            method: "GET".into(),
            url: "https://example.com/x".into(),
            headers: vec![],
            body: None,
            timeout: Duration::from_secs(1),
        };
        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status, 200);
    }
}

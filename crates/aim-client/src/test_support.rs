//! Shared test fixtures (spec §10.4: orchestration logic is tested
//! through the injectable [`Transport`] seam rather than a live server).

use std::sync::Mutex;

use async_trait::async_trait;

use crate::transport::{PreparedRequest, RawResponse, Transport, TransportError};

/// Replays a fixed, ordered sequence of responses and records every
/// request it receives, so tests can assert both on the outcome and on
/// exactly what was sent.
pub(crate) struct ScriptedTransport {
    responses: Mutex<Vec<Result<RawResponse, TransportError>>>,
    received: Mutex<Vec<PreparedRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(responses: Vec<Result<RawResponse, TransportError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            received: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn ok(status: u16, body: serde_json::Value) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status,
            body: serde_json::to_vec(&body).unwrap(),
        })
    }

    pub(crate) fn requests(&self) -> Vec<PreparedRequest> {
        self.received.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        self.received.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(TransportError::Failed("scripted transport exhausted".into()));
        }
        responses.remove(0)
    }
}

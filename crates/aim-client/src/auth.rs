//! The header-priority rule shared by every authenticated call (spec §6):
//! exactly one of `Authorization: Bearer`, `X-API-Key`, or the Ed25519
//! quartet, chosen in that order when available. `X-SDK-Token`
//! accompanies all calls when an id is known.
//!
//! [`crate::client::AimClient`] is the only implementor; this trait exists
//! so [`crate::verifier::Verifier`] can ask for freshly computed headers
//! per request (method/path/timestamp all vary across a poll loop) without
//! depending on the concrete client type.

use async_trait::async_trait;

use crate::error::AimResult;

/// Produces the auth headers for one outgoing request.
#[async_trait]
pub(crate) trait AuthHeaderSource: Send + Sync {
    /// Build headers for `method METHOD path`, signing `body` if the
    /// Ed25519 envelope fallback is used.
    async fn auth_headers(&self, method: &str, path: &str, body: Option<&[u8]>) -> AimResult<Vec<(String, String)>>;
}

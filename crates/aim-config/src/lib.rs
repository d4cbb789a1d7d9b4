//! AIM Config - layered client configuration (spec §10.3).
//!
//! [`ClientConfig`] merges, from highest to lowest priority: explicit
//! overrides passed by the caller, `AIM_*` environment variables,
//! `~/.aim/config.toml`, and built-in defaults — a single-agent-scoped
//! simplification of the reference runtime's multi-layer precedence model.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod loader;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, load_env_overrides, ClientConfigOverrides};
pub use types::ClientConfig;

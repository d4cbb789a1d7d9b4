//! `tracing` subscriber setup (spec §10.2).
//!
//! Library code in this workspace only emits `tracing` events/spans and
//! never installs a global subscriber itself; this module exists for
//! binaries and tests that want a ready one. Private key material, bearer
//! tokens, and raw signatures are never logged anywhere in this
//! workspace — `aim_crypto::KeyPair`'s `Debug` impl only exposes a key id,
//! and HTTP bodies are not logged at `info` or above.

use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::{TelemetryError, TelemetryResult};

/// Output format for logged events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, compact single-line output.
    Compact,
    /// Human-readable, multi-line output with source locations.
    Pretty,
    /// Newline-delimited JSON, suited to log aggregation.
    Json,
}

/// Where logged events are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Standard error (the default).
    Stderr,
    /// Standard output.
    Stdout,
}

/// Configuration for [`setup_logging`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    level: String,
    format: LogFormat,
    target: LogTarget,
    directives: Vec<String>,
}

impl LogConfig {
    /// Start from a base level (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`, or any `tracing_subscriber::EnvFilter` directive string).
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::Compact,
            target: LogTarget::Stderr,
            directives: Vec::new(),
        }
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output target.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Append an additional per-module filter directive (e.g.
    /// `"aim_client=trace"`), layered on top of the base level.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn filter_string(&self) -> String {
        if self.directives.is_empty() {
            self.level.clone()
        } else {
            format!("{},{}", self.level, self.directives.join(","))
        }
    }
}

/// Install a global `tracing` subscriber built from `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] if the level/directives don't
/// parse as an `EnvFilter`, or [`TelemetryError::AlreadyInitialized`] if a
/// global subscriber is already set.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = EnvFilter::try_new(config.filter_string())
        .map_err(|e| TelemetryError::InvalidFilter(e.to_string()))?;

    let is_stdout = matches!(config.target, LogTarget::Stdout);

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Compact if is_stdout => registry
            .with(fmt::layer().compact().with_writer(std::io::stdout))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty if is_stdout => registry
            .with(fmt::layer().pretty().with_writer(std::io::stdout))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json if is_stdout => registry
            .with(fmt::layer().json().with_writer(std::io::stdout))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|_| TelemetryError::AlreadyInitialized)
}

/// Install a global subscriber at `info` level, compact format, stderr —
/// the default for examples and integration tests.
///
/// # Errors
///
/// Returns [`TelemetryError::AlreadyInitialized`] if a global subscriber
/// is already set.
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_string_combines_level_and_directives() {
        let config = LogConfig::new("info").with_directive("aim_client=trace");
        assert_eq!(config.filter_string(), "info,aim_client=trace");
    }

    #[test]
    fn filter_string_is_bare_level_without_directives() {
        let config = LogConfig::new("debug");
        assert_eq!(config.filter_string(), "debug");
    }
}

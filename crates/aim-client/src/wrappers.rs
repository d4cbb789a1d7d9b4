//! Function wrappers (spec §4.5, §9's "decorators as higher-order
//! adapters" design note).
//!
//! `client.py`'s `@track_action`/`@require_approval` decorators wrap a
//! user function with verify-then-execute-then-log. There is no
//! language-level metaprogramming equivalent in Rust, so these take the
//! same shape as ordinary higher-order functions: a closure in, a
//! [`WrappedOutcome`] out, never a raised error for anything the control
//! plane decided.

use std::collections::BTreeMap;
use std::future::Future;

use aim_core::RiskLevel;
use serde_json::{json, Value};

use crate::error::AimError;
use crate::verifier::Verifier;

/// Default polling timeout for [`require_approval`] (spec §4.5).
const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 3600;
/// Default polling timeout for [`track_action`] — short, since low/medium
/// risk actions are not expected to need a human in the loop.
const DEFAULT_TRACK_TIMEOUT_SECS: u64 = 30;

/// The result of a wrapped call: either the wrapped function's own
/// output, or a structured record describing why it didn't run (spec
/// §4.5: "return an error result record (do not raise)").
#[derive(Debug, Clone)]
pub enum WrappedOutcome<T> {
    /// The wrapped function ran and returned this value.
    Value(T),
    /// Verification failed, was denied, or the function itself panicked
    /// at the error-propagation boundary; the body never ran, or ran and
    /// failed.
    Error(ActionError),
}

impl<T> WrappedOutcome<T> {
    /// `true` if the wrapped body actually executed and returned a value.
    #[must_use]
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

/// Structured description of why a wrapped call did not produce a value
/// (spec §4.5, §7: "wrappers never raise for control-plane faults").
#[derive(Debug, Clone)]
pub struct ActionError {
    /// `true`, always, to distinguish this from a successful domain value
    /// when the record is serialized alongside one (mirrors the Python
    /// source's `{"error": true, ...}` shape).
    pub error: bool,
    /// Short machine-readable kind, e.g. `"ActionDenied"`, `"VerificationError"`.
    pub error_type: String,
    /// Human-readable detail.
    pub message: String,
    /// The verification's terminal (or synthetic) status, if one was
    /// obtained before the failure.
    pub status: Option<String>,
}

impl ActionError {
    fn from_aim_error(err: &AimError) -> Self {
        let (error_type, status) = match err {
            AimError::ActionDenied(_) => ("ActionDenied", Some("denied")),
            AimError::Authentication(_) => ("Authentication", None),
            AimError::VerificationError(_) => ("VerificationError", None),
            AimError::Configuration(_) => ("Configuration", None),
            AimError::CorruptCredentials(_) => ("CorruptCredentials", None),
            AimError::Transport(_) => ("Transport", None),
        };
        Self {
            error: true,
            error_type: error_type.to_string(),
            message: err.to_string(),
            status: status.map(str::to_string),
        }
    }

    fn execution_failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            error_type: "ExecutionFailed".to_string(),
            message: message.into(),
            status: Some("approved".to_string()),
        }
    }
}

/// Metadata describing the call site, mirroring the Python source's
/// auto-built `{risk_level, function_name, module, args, kwargs}` context.
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    /// The risk level to submit for verification.
    pub risk_level: RiskLevel,
    /// Name of the wrapped function, for audit/context purposes.
    pub function_name: String,
    /// Resource the action targets, if any.
    pub resource: Option<String>,
    /// Additional free-form context merged into the verification request.
    pub extra_context: BTreeMap<String, Value>,
}

impl ActionDescriptor {
    fn context(&self) -> BTreeMap<String, Value> {
        let mut ctx = self.extra_context.clone();
        ctx.insert("risk_level".to_string(), json!(self.risk_level.to_string()));
        ctx.insert("function_name".to_string(), json!(self.function_name));
        ctx
    }
}

/// Wrap `body` with verify-then-execute-then-log for low/medium-risk
/// actions (spec §4.5's `track_action`).
///
/// `body` is only invoked after a `verified=true` decision; on any error
/// returned by `body`, a failure result is logged before the error record
/// is returned to the caller (spec §4.5, §8 law 6).
pub async fn track_action<T, E, F, Fut>(
    verifier: &Verifier<'_>,
    descriptor: ActionDescriptor,
    body: F,
) -> WrappedOutcome<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    if !descriptor.risk_level.allowed_for_track_action() {
        return WrappedOutcome::Error(ActionError::execution_failure(format!(
            "risk level {} is not valid for track_action (expected low or medium)",
            descriptor.risk_level
        )));
    }

    run_wrapped(verifier, descriptor, DEFAULT_TRACK_TIMEOUT_SECS, body).await
}

/// Wrap `body` with verify-then-execute-then-log for high/critical-risk
/// actions, waiting up to `timeout_seconds` (default one hour) for human
/// approval (spec §4.5's `require_approval`).
pub async fn require_approval<T, E, F, Fut>(
    verifier: &Verifier<'_>,
    descriptor: ActionDescriptor,
    timeout_seconds: Option<u64>,
    body: F,
) -> WrappedOutcome<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    if !descriptor.risk_level.allowed_for_require_approval() {
        return WrappedOutcome::Error(ActionError::execution_failure(format!(
            "risk level {} is not valid for require_approval (expected high or critical)",
            descriptor.risk_level
        )));
    }

    tracing::info!(
        function = %descriptor.function_name,
        "execution paused, awaiting human approval"
    );
    run_wrapped(
        verifier,
        descriptor,
        timeout_seconds.unwrap_or(DEFAULT_APPROVAL_TIMEOUT_SECS),
        body,
    )
    .await
}

async fn run_wrapped<T, E, F, Fut>(
    verifier: &Verifier<'_>,
    descriptor: ActionDescriptor,
    timeout_seconds: u64,
    body: F,
) -> WrappedOutcome<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let action_type = descriptor.function_name.clone();
    let resource = descriptor.resource.clone();
    let context = descriptor.context();

    let decision = match verifier
        .verify_action(&action_type, resource, context, timeout_seconds)
        .await
    {
        Ok(decision) if decision.verified() => decision,
        Ok(decision) => {
            return WrappedOutcome::Error(ActionError {
                error: true,
                error_type: "NotVerified".to_string(),
                message: "verification did not resolve to an executable approval".to_string(),
                status: Some(format!("{:?}", decision.status).to_lowercase()),
            })
        },
        Err(err) => return WrappedOutcome::Error(ActionError::from_aim_error(&err)),
    };

    match body().await {
        Ok(value) => {
            verifier
                .log_action_result(&decision.verification_id, true, Some("executed successfully"), None)
                .await;
            WrappedOutcome::Value(value)
        },
        Err(e) => {
            let message = e.to_string();
            verifier
                .log_action_result(&decision.verification_id, false, None, Some(&message))
                .await;
            WrappedOutcome::Error(ActionError::execution_failure(message))
        },
    }
}

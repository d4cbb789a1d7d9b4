//! Risk level shared by the verifier's two function wrappers (spec §4.5).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Advisory risk level attached to a verification request.
///
/// `track_action` only accepts `Low`/`Medium`; `require_approval` only
/// accepts `High`/`Critical` (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Routine, reversible actions.
    Low,
    /// Moderate-impact actions.
    Medium,
    /// High-impact actions that should require human sign-off.
    High,
    /// Irreversible or highly sensitive actions.
    Critical,
}

impl RiskLevel {
    /// Whether this level is valid for [`track_action`](crate) (low-risk track).
    #[must_use]
    pub fn allowed_for_track_action(self) -> bool {
        matches!(self, Self::Low | Self::Medium)
    }

    /// Whether this level is valid for `require_approval` (high-risk track).
    #[must_use]
    pub fn allowed_for_require_approval(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_action_accepts_low_and_medium_only() {
        assert!(RiskLevel::Low.allowed_for_track_action());
        assert!(RiskLevel::Medium.allowed_for_track_action());
        assert!(!RiskLevel::High.allowed_for_track_action());
        assert!(!RiskLevel::Critical.allowed_for_track_action());
    }

    #[test]
    fn require_approval_accepts_high_and_critical_only() {
        assert!(RiskLevel::High.allowed_for_require_approval());
        assert!(RiskLevel::Critical.allowed_for_require_approval());
        assert!(!RiskLevel::Low.allowed_for_require_approval());
        assert!(!RiskLevel::Medium.allowed_for_require_approval());
    }
}

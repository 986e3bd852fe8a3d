//! Caller-facing authorization decisions.
//!
//! # Security Note
//! Deny reasons name requirements by their label. They are meant for audit
//! logs and administrators; the web layer decides how much of this to show an
//! end user.

use crate::requirement::Requirement;
use serde::Serialize;
use std::fmt;

/// Why a requirement contributed to a Deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReasonKind {
    /// Every eligible handler failed or abstained.
    Failed,
    /// No handler is registered for the requirement's kind.
    Unsatisfiable,
    /// A handler raised a fault while judging the requirement.
    HandlerError,
}

/// One entry of a Deny decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DenyReason {
    pub kind: DenyReasonKind,
    /// Label of the requirement, e.g. `ClaimRequirement:EditAlbums`
    pub requirement: String,
    /// Handler that faulted, for `HandlerError`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DenyReason {
    pub fn failed(requirement: &Requirement) -> Self {
        Self {
            kind: DenyReasonKind::Failed,
            requirement: requirement.label(),
            handler: None,
            detail: None,
        }
    }

    pub fn unsatisfiable(requirement: &Requirement) -> Self {
        Self {
            kind: DenyReasonKind::Unsatisfiable,
            requirement: requirement.label(),
            handler: None,
            detail: None,
        }
    }

    pub fn handler_error(
        requirement: &Requirement,
        handler: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind: DenyReasonKind::HandlerError,
            requirement: requirement.label(),
            handler: Some(handler.into()),
            detail: Some(detail.into()),
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DenyReasonKind::Failed => f.write_str(&self.requirement),
            DenyReasonKind::Unsatisfiable => {
                write!(f, "{} (unsatisfiable: no eligible handler)", self.requirement)
            }
            DenyReasonKind::HandlerError => write!(
                f,
                "{} (handler error in {}: {})",
                self.requirement,
                self.handler.as_deref().unwrap_or("unknown"),
                self.detail.as_deref().unwrap_or("no detail")
            ),
        }
    }
}

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reasons", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    /// At least one requirement was not satisfied. Never empty.
    Deny(Vec<DenyReason>),
    /// The request was cancelled before a decision was reached. This is not a
    /// negative decision.
    Cancelled,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Decision::Deny(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Decision::Cancelled)
    }

    /// Human-readable Deny reasons in policy order; empty unless denied.
    pub fn reasons(&self) -> Vec<String> {
        match self {
            Decision::Deny(reasons) => reasons.iter().map(ToString::to_string).collect(),
            _ => Vec::new(),
        }
    }

    pub fn deny_reasons(&self) -> &[DenyReason] {
        match self {
            Decision::Deny(reasons) => reasons,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_display() {
        let requirement = Requirement::claim("EditAlbums");

        assert_eq!(
            DenyReason::failed(&requirement).to_string(),
            "ClaimRequirement:EditAlbums"
        );
        assert_eq!(
            DenyReason::unsatisfiable(&requirement).to_string(),
            "ClaimRequirement:EditAlbums (unsatisfiable: no eligible handler)"
        );
        assert_eq!(
            DenyReason::handler_error(&requirement, "claim", "directory offline").to_string(),
            "ClaimRequirement:EditAlbums (handler error in claim: directory offline)"
        );
    }

    #[test]
    fn test_decision_helpers() {
        assert!(Decision::Allow.is_allowed());
        assert!(Decision::Allow.reasons().is_empty());
        assert!(Decision::Cancelled.is_cancelled());
        assert!(!Decision::Cancelled.is_denied());

        let deny = Decision::Deny(vec![DenyReason::failed(&Requirement::role("Administrators"))]);
        assert!(deny.is_denied());
        assert_eq!(deny.reasons(), vec!["RoleRequirement:Administrators"]);
    }
}

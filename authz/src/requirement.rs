//! Requirement variants and their dispatch tags.
//!
//! A policy is a list of requirements. Each requirement reports a
//! [`RequirementKind`], and the handler registry dispatches on that tag alone.
//! Adding a new kind of requirement means registering a handler for a new
//! [`Requirement::Extension`] kind; the evaluator does not change.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Dispatch tag naming a requirement variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequirementKind(Cow<'static, str>);

impl RequirementKind {
    pub const ROLE: Self = Self(Cow::Borrowed("RoleRequirement"));
    pub const CLAIM: Self = Self(Cow::Borrowed("ClaimRequirement"));
    pub const ASSERTION: Self = Self(Cow::Borrowed("AssertionRequirement"));
    pub const DOMAIN: Self = Self(Cow::Borrowed("DomainRequirement"));

    /// A kind outside the built-in set.
    pub fn custom(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One atomic condition a policy demands.
///
/// Serialized with an internal `type` tag so policies can be written in YAML:
///
/// ```yaml
/// - type: claim
///   claim_type: Edit Albums
/// - type: role
///   role_name: Administrators
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    /// The principal must hold a role with this exact name.
    Role { role_name: String },

    /// The principal must hold at least one claim of this type, and if a
    /// value is given, at least one such claim must carry it.
    Claim {
        claim_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        claim_value: Option<String>,
    },

    /// Opaque, handler-defined predicate identified by a tag.
    Assertion { predicate: String },

    /// The principal's identifying address must end with this suffix.
    Domain { suffix: String },

    /// A requirement kind contributed by an application-specific handler.
    Extension {
        kind: String,
        #[serde(default)]
        argument: String,
    },
}

impl Requirement {
    pub fn role(role_name: impl Into<String>) -> Self {
        Self::Role {
            role_name: role_name.into(),
        }
    }

    pub fn claim(claim_type: impl Into<String>) -> Self {
        Self::Claim {
            claim_type: claim_type.into(),
            claim_value: None,
        }
    }

    pub fn claim_with_value(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Claim {
            claim_type: claim_type.into(),
            claim_value: Some(value.into()),
        }
    }

    pub fn assertion(predicate: impl Into<String>) -> Self {
        Self::Assertion {
            predicate: predicate.into(),
        }
    }

    pub fn domain(suffix: impl Into<String>) -> Self {
        Self::Domain {
            suffix: suffix.into(),
        }
    }

    pub fn extension(kind: impl Into<String>, argument: impl Into<String>) -> Self {
        Self::Extension {
            kind: kind.into(),
            argument: argument.into(),
        }
    }

    /// The tag handlers are registered under.
    pub fn kind(&self) -> RequirementKind {
        match self {
            Self::Role { .. } => RequirementKind::ROLE,
            Self::Claim { .. } => RequirementKind::CLAIM,
            Self::Assertion { .. } => RequirementKind::ASSERTION,
            Self::Domain { .. } => RequirementKind::DOMAIN,
            Self::Extension { kind, .. } => RequirementKind::custom(kind.clone()),
        }
    }

    /// Diagnostic label, e.g. `ClaimRequirement:Edit Albums`.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role { role_name } => write!(f, "{}:{}", RequirementKind::ROLE, role_name),
            Self::Claim {
                claim_type,
                claim_value: None,
            } => write!(f, "{}:{}", RequirementKind::CLAIM, claim_type),
            Self::Claim {
                claim_type,
                claim_value: Some(value),
            } => write!(f, "{}:{}={}", RequirementKind::CLAIM, claim_type, value),
            Self::Assertion { predicate } => {
                write!(f, "{}:{}", RequirementKind::ASSERTION, predicate)
            }
            Self::Domain { suffix } => write!(f, "{}:{}", RequirementKind::DOMAIN, suffix),
            Self::Extension { kind, argument } if argument.is_empty() => f.write_str(kind),
            Self::Extension { kind, argument } => write!(f, "{}:{}", kind, argument),
        }
    }
}

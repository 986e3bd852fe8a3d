//! Principal, role and claim types consumed by the authorization engine.
//!
//! # Security Considerations
//!
//! ## Principal snapshots
//! A [`Principal`] is a point-in-time snapshot taken from the principal
//! directory. The engine evaluates a whole policy against one snapshot and
//! never re-reads the directory mid-decision, so a concurrent membership edit
//! cannot produce a decision that mixes old and new facts.
//!
//! ## Roles
//! Roles are referenced by id. The snapshot also carries the role name because
//! policies name roles, not ids. Role names are case-sensitive.
//!
//! ## Claims
//! Claim types are not unique per principal. Attaching a claim never removes an
//! existing claim of the same type, so claim checks must be written as "at least
//! one claim of this type matches", never "the claim of this type is X".

use serde::{Deserialize, Serialize};

/// A role as stored in the principal directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    /// Stable identifier (ULID for directory-created roles)
    pub id: String,

    /// Unique, case-sensitive display name (e.g. "Administrators")
    pub name: String,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A (type, value) pair attached to a principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// Represents an authenticated actor making an authorization request.
///
/// # Security Note
/// Principals must come from the principal directory after authentication.
/// Never build one from request data supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Principal {
    /// The unique identifier for this principal
    pub id: String,

    /// Human-readable name (the user name in the back office)
    pub display_name: String,

    /// Identifying address, used by domain requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Roles held, unique by role id
    #[serde(default)]
    pub roles: Vec<Role>,

    /// Claims held, duplicates of a claim type allowed
    #[serde(default)]
    pub claims: Vec<Claim>,
}

impl Principal {
    /// Creates a principal with no roles, claims or address.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Adds a role unless a role with the same id is already held.
    pub fn with_role(mut self, role: Role) -> Self {
        if !self.roles.iter().any(|r| r.id == role.id) {
            self.roles.push(role);
        }
        self
    }

    pub fn with_claim(mut self, claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.push(Claim::new(claim_type, value));
        self
    }

    /// Case-sensitive role name check.
    pub fn has_role_named(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name == name)
    }

    pub fn has_role_id(&self, role_id: &str) -> bool {
        self.roles.iter().any(|r| r.id == role_id)
    }

    /// True if at least one claim of `claim_type` exists, and, when `value` is
    /// given, at least one of them carries that value.
    pub fn has_claim(&self, claim_type: &str, value: Option<&str>) -> bool {
        self.claims_of_type(claim_type)
            .any(|c| value.map_or(true, |v| c.value == v))
    }

    pub fn claims_of_type<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a Claim> {
        self.claims.iter().filter(move |c| c.claim_type == claim_type)
    }
}

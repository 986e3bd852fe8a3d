use thiserror::Error;

/// A query against the principal directory could not be answered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .reasons.join("; "))]
pub struct DirectoryError {
    pub reasons: Vec<String>,
}

impl DirectoryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reasons: vec![reason.into()],
        }
    }
}

/// Failure of a membership operation.
///
/// Every variant renders a human-readable reason. Idempotent no-ops are
/// successes and never produce one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MembershipError {
    #[error("Role already exists: {0}")]
    DuplicateRole(String),

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Principal {principal_id} is not a member of role {role_id}")]
    NotAMember {
        principal_id: String,
        role_id: String,
    },

    #[error("Principal not found: {0}")]
    PrincipalNotFound(String),

    #[error("Invalid role name: {0:?}")]
    InvalidRoleName(String),

    #[error("Invalid claim type: {0:?}")]
    InvalidClaimType(String),

    /// Passthrough of the directory's own failure reasons.
    #[error("Directory failure: {}", .0.join("; "))]
    DirectoryFailure(Vec<String>),

    #[error("Membership operation cancelled")]
    Cancelled,
}

impl MembershipError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MembershipError::Cancelled)
    }
}

impl From<DirectoryError> for MembershipError {
    fn from(err: DirectoryError) -> Self {
        MembershipError::DirectoryFailure(err.reasons)
    }
}

impl From<cancellation::Cancelled> for MembershipError {
    fn from(_: cancellation::Cancelled) -> Self {
        MembershipError::Cancelled
    }
}

pub type Result<T> = std::result::Result<T, MembershipError>;

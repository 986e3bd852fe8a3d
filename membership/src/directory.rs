//! The principal directory interface consumed by the reconciler.
//!
//! The directory owns principals, roles and claims. Every call may leave the
//! process, so the whole interface is async. Queries return
//! [`DirectoryResult`]; mutations return a [`DirectoryOutcome`] carrying a
//! success flag and the directory's own error texts.

use crate::error::DirectoryError;
use async_trait::async_trait;
use authz::{Claim, Principal, Role};

pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// Aggregate result of one directory mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryOutcome {
    pub succeeded: bool,
    pub errors: Vec<String>,
}

impl DirectoryOutcome {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            errors: Vec::new(),
        }
    }

    pub fn failed<I, S>(errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut errors: Vec<String> = errors.into_iter().map(Into::into).collect();
        if errors.is_empty() {
            errors.push("directory reported failure without a reason".to_string());
        }
        Self {
            succeeded: false,
            errors,
        }
    }

    pub fn into_result(self) -> DirectoryResult<()> {
        if self.succeeded {
            Ok(())
        } else {
            Err(DirectoryError {
                reasons: self.errors,
            })
        }
    }
}

/// Repository-style access to principals, roles and claims.
///
/// Implementations provide their own atomicity. Callers add no locking, so
/// two concurrent edits of one principal resolve however the directory
/// resolves them.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    /// Snapshot of a principal with resolved roles and all claims.
    async fn find_principal(&self, principal_id: &str) -> DirectoryResult<Option<Principal>>;

    async fn principals(&self) -> DirectoryResult<Vec<Principal>>;

    async fn find_role(&self, role_id: &str) -> DirectoryResult<Option<Role>>;

    /// Case-sensitive lookup by name.
    async fn find_role_by_name(&self, name: &str) -> DirectoryResult<Option<Role>>;

    async fn roles(&self) -> DirectoryResult<Vec<Role>>;

    async fn is_member(&self, principal_id: &str, role_id: &str) -> DirectoryResult<bool>;

    async fn create_role(&self, role: &Role) -> DirectoryOutcome;

    async fn update_role(&self, role: &Role) -> DirectoryOutcome;

    /// Deletes the role and detaches it from every principal holding it.
    async fn delete_role(&self, role_id: &str) -> DirectoryOutcome;

    async fn add_member(&self, principal_id: &str, role_id: &str) -> DirectoryOutcome;

    async fn remove_member(&self, principal_id: &str, role_id: &str) -> DirectoryOutcome;

    /// Appends a claim. Existing claims of the same type are kept.
    async fn attach_claim(&self, principal_id: &str, claim: &Claim) -> DirectoryOutcome;

    /// Removes every claim of `claim_type`. Succeeds when none match.
    async fn detach_claims(&self, principal_id: &str, claim_type: &str) -> DirectoryOutcome;

    /// Overwrites display name and email. Roles and claims are untouched.
    async fn update_principal(&self, principal: &Principal) -> DirectoryOutcome;

    /// Deletes the principal together with its memberships and claims.
    async fn delete_principal(&self, principal_id: &str) -> DirectoryOutcome;
}

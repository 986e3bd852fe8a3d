//! Role and claim administration over a [`PrincipalDirectory`].
//!
//! Every operation checks its preconditions against the directory, applies a
//! single mutation and maps the directory's outcome onto [`MembershipError`].
//! Idempotent no-ops (adding an existing member, detaching a claim type the
//! principal does not hold) are successes.
//!
//! The reconciler takes no locks of its own. Two administrators editing the
//! same principal concurrently race inside the directory, and the directory's
//! own atomicity decides the result. When a mutation fails, the precondition
//! is checked again, so the loser of a race gets `DuplicateRole` or
//! `NotAMember` rather than the directory's raw reasons.

use crate::directory::{DirectoryOutcome, PrincipalDirectory};
use crate::error::{MembershipError, Result};
use authz::{Claim, Principal, Role};
use cancellation::CancelSignal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use ulid::Ulid;

fn not_a_member(principal_id: &str, role_id: &str) -> MembershipError {
    MembershipError::NotAMember {
        principal_id: principal_id.to_string(),
        role_id: role_id.to_string(),
    }
}

pub struct MembershipReconciler<D: ?Sized> {
    directory: Arc<D>,
}

impl<D: ?Sized> Clone for MembershipReconciler<D> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
        }
    }
}

impl<D> MembershipReconciler<D>
where
    D: PrincipalDirectory + ?Sized,
{
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    async fn principal(&self, principal_id: &str, cancel: &CancelSignal) -> Result<Principal> {
        cancel
            .run(self.directory.find_principal(principal_id))
            .await??
            .ok_or_else(|| MembershipError::PrincipalNotFound(principal_id.to_string()))
    }

    async fn role(&self, role_id: &str, cancel: &CancelSignal) -> Result<Role> {
        cancel
            .run(self.directory.find_role(role_id))
            .await??
            .ok_or_else(|| MembershipError::RoleNotFound(role_id.to_string()))
    }

    /// Create a role with a fresh id.
    pub async fn add_role(&self, name: &str, cancel: &CancelSignal) -> Result<Role> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MembershipError::InvalidRoleName(name.to_string()));
        }

        if cancel
            .run(self.directory.find_role_by_name(name))
            .await??
            .is_some()
        {
            warn!("Role creation rejected, name already taken: {}", name);
            return Err(MembershipError::DuplicateRole(name.to_string()));
        }

        let role = Role::new(Ulid::new().to_string(), name);
        let outcome = cancel.run(self.directory.create_role(&role)).await?;
        if let Err(failure) = outcome.into_result() {
            // Lost a race with another creation of the same name
            if self.role_exists(name, cancel).await? {
                warn!("Role creation lost to a concurrent one: {}", name);
                return Err(MembershipError::DuplicateRole(name.to_string()));
            }
            return Err(failure.into());
        }

        info!("Created role {} ({})", role.name, role.id);
        Ok(role)
    }

    /// Delete a role. The directory detaches it from every member.
    pub async fn remove_role(&self, role_id: &str, cancel: &CancelSignal) -> Result<()> {
        let role = self.role(role_id, cancel).await?;

        let outcome = cancel.run(self.directory.delete_role(role_id)).await?;
        if let Err(failure) = outcome.into_result() {
            if cancel.run(self.directory.find_role(role_id)).await??.is_none() {
                return Err(MembershipError::RoleNotFound(role_id.to_string()));
            }
            return Err(failure.into());
        }

        info!("Deleted role {} ({})", role.name, role.id);
        Ok(())
    }

    /// Rename a role, keeping its id and memberships.
    pub async fn rename_role(
        &self,
        role_id: &str,
        new_name: &str,
        cancel: &CancelSignal,
    ) -> Result<Role> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(MembershipError::InvalidRoleName(new_name.to_string()));
        }

        let role = self.role(role_id, cancel).await?;
        if role.name == new_name {
            debug!("Role {} already named {}", role_id, new_name);
            return Ok(role);
        }

        if let Some(other) = cancel
            .run(self.directory.find_role_by_name(new_name))
            .await??
        {
            if other.id != role.id {
                warn!("Role rename rejected, name already taken: {}", new_name);
                return Err(MembershipError::DuplicateRole(new_name.to_string()));
            }
        }

        let renamed = Role::new(role.id.clone(), new_name);
        let outcome = cancel.run(self.directory.update_role(&renamed)).await?;
        if let Err(failure) = outcome.into_result() {
            let taken = cancel
                .run(self.directory.find_role_by_name(new_name))
                .await??
                .is_some_and(|other| other.id != role.id);
            if taken {
                warn!("Role rename lost to a concurrent one: {}", new_name);
                return Err(MembershipError::DuplicateRole(new_name.to_string()));
            }
            if cancel.run(self.directory.find_role(role_id)).await??.is_none() {
                return Err(MembershipError::RoleNotFound(role_id.to_string()));
            }
            return Err(failure.into());
        }

        info!("Renamed role {} from {} to {}", role.id, role.name, renamed.name);
        Ok(renamed)
    }

    /// Case-sensitive existence check by name.
    pub async fn role_exists(&self, name: &str, cancel: &CancelSignal) -> Result<bool> {
        Ok(cancel
            .run(self.directory.find_role_by_name(name))
            .await??
            .is_some())
    }

    pub async fn roles(&self, cancel: &CancelSignal) -> Result<Vec<Role>> {
        Ok(cancel.run(self.directory.roles()).await??)
    }

    /// Add (`present = true`) or remove a principal's membership of a role.
    ///
    /// Adding an existing member succeeds without touching the directory.
    /// Removing a non-member fails with [`MembershipError::NotAMember`].
    pub async fn set_role_membership(
        &self,
        principal_id: &str,
        role_id: &str,
        present: bool,
        cancel: &CancelSignal,
    ) -> Result<()> {
        self.principal(principal_id, cancel).await?;
        self.role(role_id, cancel).await?;

        let is_member = cancel
            .run(self.directory.is_member(principal_id, role_id))
            .await??;

        match (present, is_member) {
            (true, true) => {
                debug!("{} already in role {}", principal_id, role_id);
                Ok(())
            }
            (true, false) => {
                let outcome = cancel
                    .run(self.directory.add_member(principal_id, role_id))
                    .await?;
                if outcome.succeeded {
                    info!("Added {} to role {}", principal_id, role_id);
                    return Ok(());
                }
                self.reconcile_failed_membership(principal_id, role_id, present, outcome, cancel)
                    .await
            }
            (false, true) => {
                let outcome = cancel
                    .run(self.directory.remove_member(principal_id, role_id))
                    .await?;
                if outcome.succeeded {
                    info!("Removed {} from role {}", principal_id, role_id);
                    return Ok(());
                }
                self.reconcile_failed_membership(principal_id, role_id, present, outcome, cancel)
                    .await
            }
            (false, false) => Err(not_a_member(principal_id, role_id)),
        }
    }

    /// A membership write failed. If a concurrent edit already moved the
    /// membership, report what the edit would have reported against the new
    /// state; otherwise surface the directory's reasons.
    async fn reconcile_failed_membership(
        &self,
        principal_id: &str,
        role_id: &str,
        present: bool,
        outcome: DirectoryOutcome,
        cancel: &CancelSignal,
    ) -> Result<()> {
        let is_member = cancel
            .run(self.directory.is_member(principal_id, role_id))
            .await??;
        match (present, is_member) {
            (true, true) => {
                debug!("{} joined role {} concurrently", principal_id, role_id);
                Ok(())
            }
            (false, false) => Err(not_a_member(principal_id, role_id)),
            _ => Err(MembershipError::DirectoryFailure(outcome.errors)),
        }
    }

    /// Append a claim. Claims already held, even of the same type, are kept.
    pub async fn attach_claim(
        &self,
        principal_id: &str,
        claim_type: &str,
        value: &str,
        cancel: &CancelSignal,
    ) -> Result<()> {
        if claim_type.trim().is_empty() {
            return Err(MembershipError::InvalidClaimType(claim_type.to_string()));
        }
        self.principal(principal_id, cancel).await?;

        let claim = Claim::new(claim_type, value);
        cancel
            .run(self.directory.attach_claim(principal_id, &claim))
            .await?
            .into_result()?;

        info!("Attached claim {}={} to {}", claim_type, value, principal_id);
        Ok(())
    }

    /// Remove every claim of `claim_type`. Succeeds when none are held.
    pub async fn detach_claim(
        &self,
        principal_id: &str,
        claim_type: &str,
        cancel: &CancelSignal,
    ) -> Result<()> {
        let principal = self.principal(principal_id, cancel).await?;
        if !principal.has_claim(claim_type, None) {
            debug!("{} holds no {} claims", principal_id, claim_type);
            return Ok(());
        }

        cancel
            .run(self.directory.detach_claims(principal_id, claim_type))
            .await?
            .into_result()?;

        info!("Detached {} claims from {}", claim_type, principal_id);
        Ok(())
    }

    /// Change a principal's display name and/or email. `None` keeps the
    /// current value.
    pub async fn edit_principal(
        &self,
        principal_id: &str,
        display_name: Option<&str>,
        email: Option<&str>,
        cancel: &CancelSignal,
    ) -> Result<Principal> {
        let mut principal = self.principal(principal_id, cancel).await?;
        if let Some(name) = display_name {
            principal.display_name = name.to_string();
        }
        if let Some(email) = email {
            principal.email = Some(email.to_string());
        }

        let outcome = cancel
            .run(self.directory.update_principal(&principal))
            .await?;
        if let Err(failure) = outcome.into_result() {
            self.principal(principal_id, cancel).await?;
            return Err(failure.into());
        }

        info!("Updated principal {}", principal_id);
        Ok(principal)
    }

    /// Delete a principal with its memberships and claims.
    pub async fn remove_principal(&self, principal_id: &str, cancel: &CancelSignal) -> Result<()> {
        self.principal(principal_id, cancel).await?;

        let outcome = cancel
            .run(self.directory.delete_principal(principal_id))
            .await?;
        if let Err(failure) = outcome.into_result() {
            self.principal(principal_id, cancel).await?;
            return Err(failure.into());
        }

        info!("Deleted principal {}", principal_id);
        Ok(())
    }

    /// Principals holding the role.
    pub async fn members_of(&self, role_id: &str, cancel: &CancelSignal) -> Result<Vec<Principal>> {
        self.role(role_id, cancel).await?;
        let principals = cancel.run(self.directory.principals()).await??;
        Ok(principals
            .into_iter()
            .filter(|p| p.has_role_id(role_id))
            .collect())
    }

    /// Principals that could be added to the role.
    pub async fn candidates_for(
        &self,
        role_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<Principal>> {
        self.role(role_id, cancel).await?;
        let principals = cancel.run(self.directory.principals()).await??;
        Ok(principals
            .into_iter()
            .filter(|p| !p.has_role_id(role_id))
            .collect())
    }

    /// Catalogue claim types the principal does not hold yet, in catalogue
    /// order.
    pub async fn available_claims(
        &self,
        principal_id: &str,
        catalogue: &[String],
        cancel: &CancelSignal,
    ) -> Result<Vec<String>> {
        let principal = self.principal(principal_id, cancel).await?;
        let held: HashSet<&str> = principal
            .claims
            .iter()
            .map(|c| c.claim_type.as_str())
            .collect();
        Ok(catalogue
            .iter()
            .filter(|t| !held.contains(t.as_str()))
            .cloned()
            .collect())
    }
}

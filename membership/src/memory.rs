//! In-process principal directory.
//!
//! Each call takes the state lock for the duration of that call only, which
//! makes every single mutation atomic. Used by tests and by deployments that
//! do not need persistence.

use crate::directory::{DirectoryOutcome, DirectoryResult, PrincipalDirectory};
use async_trait::async_trait;
use authz::{Claim, Principal, Role};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredPrincipal {
    id: String,
    display_name: String,
    email: Option<String>,
    role_ids: BTreeSet<String>,
    claims: Vec<Claim>,
}

#[derive(Debug, Default)]
struct State {
    principals: BTreeMap<String, StoredPrincipal>,
    roles: BTreeMap<String, Role>,
    /// Reasons returned by the next mutation instead of applying it
    injected_failure: Option<Vec<String>>,
}

impl State {
    fn snapshot(&self, stored: &StoredPrincipal) -> Principal {
        let mut principal = Principal::new(&stored.id, &stored.display_name);
        principal.email = stored.email.clone();
        principal.roles = stored
            .role_ids
            .iter()
            .filter_map(|id| self.roles.get(id).cloned())
            .collect();
        principal.claims = stored.claims.clone();
        principal
    }

    fn take_failure(&mut self) -> Option<DirectoryOutcome> {
        self.injected_failure.take().map(DirectoryOutcome::failed)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: RwLock<State>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a principal together with its roles and claims. Roles not yet
    /// known to the directory are added.
    pub async fn add_principal(&self, principal: Principal) -> DirectoryOutcome {
        let mut state = self.state.write().await;
        if state.principals.contains_key(&principal.id) {
            return DirectoryOutcome::failed([format!(
                "Principal '{}' already exists",
                principal.id
            )]);
        }
        for role in &principal.roles {
            state
                .roles
                .entry(role.id.clone())
                .or_insert_with(|| role.clone());
        }
        let stored = StoredPrincipal {
            id: principal.id.clone(),
            display_name: principal.display_name,
            email: principal.email,
            role_ids: principal.roles.into_iter().map(|r| r.id).collect(),
            claims: principal.claims,
        };
        state.principals.insert(stored.id.clone(), stored);
        DirectoryOutcome::success()
    }

    /// Make the next mutation fail with `reasons` without applying it.
    pub async fn fail_next_mutation<I, S>(&self, reasons: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.write().await.injected_failure =
            Some(reasons.into_iter().map(Into::into).collect());
    }
}

#[async_trait]
impl PrincipalDirectory for InMemoryDirectory {
    async fn find_principal(&self, principal_id: &str) -> DirectoryResult<Option<Principal>> {
        let state = self.state.read().await;
        Ok(state
            .principals
            .get(principal_id)
            .map(|stored| state.snapshot(stored)))
    }

    async fn principals(&self) -> DirectoryResult<Vec<Principal>> {
        let state = self.state.read().await;
        Ok(state
            .principals
            .values()
            .map(|stored| state.snapshot(stored))
            .collect())
    }

    async fn find_role(&self, role_id: &str) -> DirectoryResult<Option<Role>> {
        Ok(self.state.read().await.roles.get(role_id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> DirectoryResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().find(|r| r.name == name).cloned())
    }

    async fn roles(&self) -> DirectoryResult<Vec<Role>> {
        let state = self.state.read().await;
        let mut roles: Vec<Role> = state.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn is_member(&self, principal_id: &str, role_id: &str) -> DirectoryResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .principals
            .get(principal_id)
            .map_or(false, |p| p.role_ids.contains(role_id)))
    }

    async fn create_role(&self, role: &Role) -> DirectoryOutcome {
        let mut state = self.state.write().await;
        if let Some(failure) = state.take_failure() {
            return failure;
        }
        if state.roles.contains_key(&role.id) {
            return DirectoryOutcome::failed([format!("Role id '{}' already exists", role.id)]);
        }
        if state.roles.values().any(|r| r.name == role.name) {
            return DirectoryOutcome::failed([format!("Role name '{}' is already taken", role.name)]);
        }
        state.roles.insert(role.id.clone(), role.clone());
        debug!("Directory: created role {} ({})", role.name, role.id);
        DirectoryOutcome::success()
    }

    async fn update_role(&self, role: &Role) -> DirectoryOutcome {
        let mut state = self.state.write().await;
        if let Some(failure) = state.take_failure() {
            return failure;
        }
        if state
            .roles
            .values()
            .any(|r| r.name == role.name && r.id != role.id)
        {
            return DirectoryOutcome::failed([format!("Role name '{}' is already taken", role.name)]);
        }
        match state.roles.get_mut(&role.id) {
            Some(existing) => {
                existing.name = role.name.clone();
                DirectoryOutcome::success()
            }
            None => DirectoryOutcome::failed([format!("Role '{}' not found", role.id)]),
        }
    }

    async fn delete_role(&self, role_id: &str) -> DirectoryOutcome {
        let mut state = self.state.write().await;
        if let Some(failure) = state.take_failure() {
            return failure;
        }
        if state.roles.remove(role_id).is_none() {
            return DirectoryOutcome::failed([format!("Role '{}' not found", role_id)]);
        }
        for principal in state.principals.values_mut() {
            principal.role_ids.remove(role_id);
        }
        debug!("Directory: deleted role {}", role_id);
        DirectoryOutcome::success()
    }

    async fn add_member(&self, principal_id: &str, role_id: &str) -> DirectoryOutcome {
        let mut state = self.state.write().await;
        if let Some(failure) = state.take_failure() {
            return failure;
        }
        if !state.roles.contains_key(role_id) {
            return DirectoryOutcome::failed([format!("Role '{}' not found", role_id)]);
        }
        match state.principals.get_mut(principal_id) {
            Some(principal) => {
                principal.role_ids.insert(role_id.to_string());
                DirectoryOutcome::success()
            }
            None => DirectoryOutcome::failed([format!("Principal '{}' not found", principal_id)]),
        }
    }

    async fn remove_member(&self, principal_id: &str, role_id: &str) -> DirectoryOutcome {
        let mut state = self.state.write().await;
        if let Some(failure) = state.take_failure() {
            return failure;
        }
        let Some(principal) = state.principals.get_mut(principal_id) else {
            return DirectoryOutcome::failed([format!("Principal '{}' not found", principal_id)]);
        };
        if principal.role_ids.remove(role_id) {
            DirectoryOutcome::success()
        } else {
            DirectoryOutcome::failed([format!(
                "Principal '{}' is not in role '{}'",
                principal_id, role_id
            )])
        }
    }

    async fn attach_claim(&self, principal_id: &str, claim: &Claim) -> DirectoryOutcome {
        let mut state = self.state.write().await;
        if let Some(failure) = state.take_failure() {
            return failure;
        }
        match state.principals.get_mut(principal_id) {
            Some(principal) => {
                principal.claims.push(claim.clone());
                DirectoryOutcome::success()
            }
            None => DirectoryOutcome::failed([format!("Principal '{}' not found", principal_id)]),
        }
    }

    async fn detach_claims(&self, principal_id: &str, claim_type: &str) -> DirectoryOutcome {
        let mut state = self.state.write().await;
        if let Some(failure) = state.take_failure() {
            return failure;
        }
        match state.principals.get_mut(principal_id) {
            Some(principal) => {
                principal.claims.retain(|c| c.claim_type != claim_type);
                DirectoryOutcome::success()
            }
            None => DirectoryOutcome::failed([format!("Principal '{}' not found", principal_id)]),
        }
    }

    async fn update_principal(&self, principal: &Principal) -> DirectoryOutcome {
        let mut state = self.state.write().await;
        if let Some(failure) = state.take_failure() {
            return failure;
        }
        match state.principals.get_mut(&principal.id) {
            Some(stored) => {
                stored.display_name = principal.display_name.clone();
                stored.email = principal.email.clone();
                DirectoryOutcome::success()
            }
            None => DirectoryOutcome::failed([format!("Principal '{}' not found", principal.id)]),
        }
    }

    async fn delete_principal(&self, principal_id: &str) -> DirectoryOutcome {
        let mut state = self.state.write().await;
        if let Some(failure) = state.take_failure() {
            return failure;
        }
        if state.principals.remove(principal_id).is_none() {
            return DirectoryOutcome::failed([format!("Principal '{}' not found", principal_id)]);
        }
        debug!("Directory: deleted principal {}", principal_id);
        DirectoryOutcome::success()
    }
}

//! Built-in handlers for the standard requirement kinds.

use crate::registry::{HandlerFault, HandlerRegistry, RequirementHandler, Verdict};
use crate::requirement::{Requirement, RequirementKind};
use crate::types::Principal;

/// Judges [`Requirement::Role`] by case-sensitive role name.
#[derive(Debug, Default)]
pub struct RoleHandler;

impl RequirementHandler for RoleHandler {
    fn name(&self) -> &str {
        "role"
    }

    fn kinds(&self) -> Vec<RequirementKind> {
        vec![RequirementKind::ROLE]
    }

    fn evaluate(
        &self,
        principal: &Principal,
        requirement: &Requirement,
    ) -> Result<Verdict, HandlerFault> {
        match requirement {
            Requirement::Role { role_name } => Ok(principal.has_role_named(role_name).into()),
            _ => Ok(Verdict::Abstain),
        }
    }
}

/// Judges [`Requirement::Claim`]: any matching claim satisfies it.
#[derive(Debug, Default)]
pub struct ClaimHandler;

impl RequirementHandler for ClaimHandler {
    fn name(&self) -> &str {
        "claim"
    }

    fn kinds(&self) -> Vec<RequirementKind> {
        vec![RequirementKind::CLAIM]
    }

    fn evaluate(
        &self,
        principal: &Principal,
        requirement: &Requirement,
    ) -> Result<Verdict, HandlerFault> {
        match requirement {
            Requirement::Claim {
                claim_type,
                claim_value,
            } => Ok(principal
                .has_claim(claim_type, claim_value.as_deref())
                .into()),
            _ => Ok(Verdict::Abstain),
        }
    }
}

/// Judges [`Requirement::Domain`] against the principal's e-mail address.
///
/// Comparison is ASCII case-insensitive. A principal without an address fails.
#[derive(Debug, Default)]
pub struct DomainHandler;

impl RequirementHandler for DomainHandler {
    fn name(&self) -> &str {
        "domain"
    }

    fn kinds(&self) -> Vec<RequirementKind> {
        vec![RequirementKind::DOMAIN]
    }

    fn evaluate(
        &self,
        principal: &Principal,
        requirement: &Requirement,
    ) -> Result<Verdict, HandlerFault> {
        let Requirement::Domain { suffix } = requirement else {
            return Ok(Verdict::Abstain);
        };
        if suffix.trim().is_empty() {
            return Err(HandlerFault::new("domain requirement has an empty suffix"));
        }
        let Some(email) = principal.email.as_deref() else {
            return Ok(Verdict::Fail);
        };
        let email = email.to_ascii_lowercase();
        Ok(email.ends_with(&suffix.to_ascii_lowercase()).into())
    }
}

type Predicate = dyn Fn(&Principal) -> Result<bool, HandlerFault> + Send + Sync;

/// Judges one [`Requirement::Assertion`] tag with an arbitrary predicate.
///
/// Abstains on every other tag, so several assertion handlers can share the
/// assertion kind. Two handlers registered for the same tag are independent
/// grounds: either one succeeding satisfies the requirement.
pub struct AssertionHandler {
    name: String,
    predicate_tag: String,
    predicate: Box<Predicate>,
}

impl AssertionHandler {
    pub fn new<F>(name: impl Into<String>, predicate_tag: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Principal) -> Result<bool, HandlerFault> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate_tag: predicate_tag.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl std::fmt::Debug for AssertionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssertionHandler")
            .field("name", &self.name)
            .field("predicate_tag", &self.predicate_tag)
            .finish_non_exhaustive()
    }
}

impl RequirementHandler for AssertionHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn kinds(&self) -> Vec<RequirementKind> {
        vec![RequirementKind::ASSERTION]
    }

    fn evaluate(
        &self,
        principal: &Principal,
        requirement: &Requirement,
    ) -> Result<Verdict, HandlerFault> {
        match requirement {
            Requirement::Assertion { predicate } if *predicate == self.predicate_tag => {
                (self.predicate)(principal).map(Verdict::from)
            }
            _ => Ok(Verdict::Abstain),
        }
    }
}

/// Registry with the role, claim and domain handlers.
///
/// Assertion and extension handlers are application-specific and must be
/// registered by the caller.
pub fn standard_registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .with(RoleHandler)
        .with(ClaimHandler)
        .with(DomainHandler)
}

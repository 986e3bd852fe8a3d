//! Policy-based authorization engine for the Heavy back office.
//!
//! This crate decides whether a principal may perform a protected action. A
//! protected action names a policy; a policy is an ordered, non-empty list of
//! requirements; each requirement is judged by the handlers registered for its
//! kind.
//!
//! # Architecture Overview
//!
//! 1. **Start-up** builds a [`PolicyRegistry`] and a [`HandlerRegistry`] and
//!    moves both into an [`AuthzEngine`], shared afterwards behind an `Arc`
//! 2. **Request arrives** carrying a policy name
//! 3. **Caller** fetches a [`Principal`] snapshot from the principal directory
//! 4. **AuthzEngine** evaluates the policy against that snapshot
//! 5. **Decision** is returned: Allow, Deny(reasons) or Cancelled
//!
//! # Combination rules
//!
//! - OR within a requirement: the first handler that succeeds satisfies it and
//!   the remaining handlers are skipped.
//! - AND across requirements: the policy allows only if every requirement is
//!   satisfied.
//! - A requirement with no registered handler is unsatisfiable.
//! - A handler fault fails that handler only.
//!
//! # Example
//!
//! ```rust
//! use authz::{AuthzEngine, Policy, PolicyRegistry, Principal, Requirement};
//! use authz::handlers::standard_registry;
//! use cancellation::CancelSignal;
//!
//! let policies = PolicyRegistry::new()
//!     .with(Policy::new("EditCatalog", vec![Requirement::claim("EditAlbums")]).unwrap())
//!     .unwrap();
//! let engine = AuthzEngine::new(policies, standard_registry());
//!
//! let editor = Principal::new("u1", "dave").with_claim("EditAlbums", "EditAlbums");
//! let decision = engine
//!     .evaluate(&editor, "EditCatalog", &CancelSignal::never())
//!     .unwrap();
//! assert!(decision.is_allowed());
//! ```

pub mod decision;
pub mod error;
pub mod handlers;
pub mod policy;
pub mod registry;
pub mod requirement;
pub mod types;

use cancellation::CancelSignal;
use tracing::{debug, info, warn};

pub use decision::{Decision, DenyReason, DenyReasonKind};
pub use error::{AuthzError, Result};
pub use policy::{Policy, PolicyRegistry};
pub use registry::{HandlerFault, HandlerRegistry, RequirementHandler, Verdict};
pub use requirement::{Requirement, RequirementKind};
pub use types::{Claim, Principal, Role};

/// How one requirement came out.
enum RequirementOutcome {
    Satisfied,
    Failed(Vec<DenyReason>),
    Unsatisfiable,
}

/// The core authorization engine.
///
/// Holds the policy and handler registries built at start-up. Both are
/// read-only afterwards, so an engine behind an `Arc` can serve any number of
/// concurrent evaluations without locking.
#[derive(Debug)]
pub struct AuthzEngine {
    policies: PolicyRegistry,
    handlers: HandlerRegistry,
}

impl AuthzEngine {
    /// Creates an engine from fully populated registries.
    ///
    /// Requirements that no handler can judge are logged here as configuration
    /// defects; they still evaluate (to Unsatisfiable) at request time.
    pub fn new(policies: PolicyRegistry, handlers: HandlerRegistry) -> Self {
        let engine = Self { policies, handlers };
        for (policy, requirement) in engine.unsatisfiable_requirements() {
            warn!(
                "AUTHZ: policy '{}' requirement {} has no eligible handler",
                policy, requirement
            );
        }
        info!(
            "Authorization engine initialized with {} policies",
            engine.policies.len()
        );
        engine
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Every `(policy name, requirement label)` with no registered handler.
    pub fn unsatisfiable_requirements(&self) -> Vec<(String, String)> {
        let handlers = &self.handlers;
        self.policies
            .iter()
            .flat_map(move |policy| {
                policy
                    .requirements()
                    .iter()
                    .filter(move |r| !handlers.handles(&r.kind()))
                    .map(move |r| (policy.name().to_string(), r.label()))
            })
            .collect()
    }

    /// Evaluates `policy_name` against a principal snapshot.
    ///
    /// # Returns
    ///
    /// - `Ok(Decision::Allow)` if every requirement is satisfied
    /// - `Ok(Decision::Deny(reasons))` with one reason per failed requirement,
    ///   in policy order, followed by the handler faults behind those failures
    /// - `Ok(Decision::Cancelled)` if `cancel` fired before the decision
    /// - `Err(AuthzError::UnknownPolicy)` if the policy was never registered
    pub fn evaluate(
        &self,
        principal: &Principal,
        policy_name: &str,
        cancel: &CancelSignal,
    ) -> Result<Decision> {
        let policy = self
            .policies
            .get(policy_name)
            .ok_or_else(|| AuthzError::UnknownPolicy(policy_name.to_string()))?;

        let mut reasons = Vec::new();
        let mut faults = Vec::new();

        for requirement in policy.requirements() {
            if cancel.is_cancelled() {
                info!(
                    "AUTHZ: evaluation of '{}' for {} cancelled",
                    policy_name, principal.id
                );
                return Ok(Decision::Cancelled);
            }

            match self.evaluate_requirement(principal, requirement) {
                RequirementOutcome::Satisfied => {}
                RequirementOutcome::Failed(handler_faults) => {
                    reasons.push(DenyReason::failed(requirement));
                    faults.extend(handler_faults);
                }
                RequirementOutcome::Unsatisfiable => {
                    reasons.push(DenyReason::unsatisfiable(requirement));
                }
            }
        }

        if reasons.is_empty() {
            info!(
                "AUTHZ: Access ALLOWED for {} by policy '{}'",
                principal.id, policy_name
            );
            return Ok(Decision::Allow);
        }

        reasons.extend(faults);
        warn!(
            "AUTHZ: Access DENIED for {} by policy '{}': {:?}",
            principal.id,
            policy_name,
            reasons.iter().map(ToString::to_string).collect::<Vec<_>>()
        );
        Ok(Decision::Deny(reasons))
    }

    fn evaluate_requirement(
        &self,
        principal: &Principal,
        requirement: &Requirement,
    ) -> RequirementOutcome {
        let kind = requirement.kind();
        let eligible = self.handlers.eligible(&kind);
        if eligible.is_empty() {
            warn!(
                "AUTHZ: requirement {} is unsatisfiable, no handler registered for {}",
                requirement, kind
            );
            return RequirementOutcome::Unsatisfiable;
        }

        let mut faults = Vec::new();
        for handler in eligible {
            match handler.evaluate(principal, requirement) {
                Ok(Verdict::Succeed) => {
                    debug!(
                        "AUTHZ: {} satisfied by handler '{}'",
                        requirement,
                        handler.name()
                    );
                    if !faults.is_empty() {
                        debug!(
                            "AUTHZ: {} handler faults ignored, requirement satisfied",
                            faults.len()
                        );
                    }
                    return RequirementOutcome::Satisfied;
                }
                Ok(Verdict::Fail) | Ok(Verdict::Abstain) => {}
                Err(fault) => {
                    warn!(
                        "AUTHZ: handler '{}' faulted on {}: {}",
                        handler.name(),
                        requirement,
                        fault
                    );
                    faults.push(DenyReason::handler_error(
                        requirement,
                        handler.name(),
                        fault.to_string(),
                    ));
                }
            }
        }

        debug!("AUTHZ: {} failed for {}", requirement, principal.id);
        RequirementOutcome::Failed(faults)
    }
}

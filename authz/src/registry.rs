//! Handler trait and the requirement-kind dispatch table.

use crate::requirement::{Requirement, RequirementKind};
use crate::types::Principal;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// A handler's judgement of one requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Succeed,
    Fail,
    /// The requirement is outside what this handler judges.
    Abstain,
}

impl From<bool> for Verdict {
    fn from(ok: bool) -> Self {
        if ok {
            Verdict::Succeed
        } else {
            Verdict::Fail
        }
    }
}

/// An unexpected fault raised while a handler was evaluating.
///
/// Faults are isolated to the handler that raised them; the evaluator counts
/// the handler as failed and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerFault(pub String);

impl HandlerFault {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Logic able to judge one or more requirement kinds against a principal.
///
/// Implementations must be pure: the verdict may depend only on the principal
/// snapshot and the requirement.
pub trait RequirementHandler: Send + Sync {
    /// Name used in logs and handler-error reasons.
    fn name(&self) -> &str;

    /// Requirement kinds this handler can judge.
    fn kinds(&self) -> Vec<RequirementKind>;

    fn evaluate(
        &self,
        principal: &Principal,
        requirement: &Requirement,
    ) -> std::result::Result<Verdict, HandlerFault>;
}

/// Maps requirement kinds to the handlers eligible to judge them.
///
/// Handlers for one kind are kept in registration order. The registry is
/// filled at start-up and moved into the engine, after which it is only read.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<RequirementKind, Vec<Arc<dyn RequirementHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under every kind it declares.
    pub fn register<H>(&mut self, handler: H) -> &mut Self
    where
        H: RequirementHandler + 'static,
    {
        self.register_shared(Arc::new(handler))
    }

    pub fn register_shared(&mut self, handler: Arc<dyn RequirementHandler>) -> &mut Self {
        for kind in handler.kinds() {
            self.handlers
                .entry(kind)
                .or_default()
                .push(Arc::clone(&handler));
        }
        self
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with<H>(mut self, handler: H) -> Self
    where
        H: RequirementHandler + 'static,
    {
        self.register(handler);
        self
    }

    /// Handlers eligible for `kind`, in registration order. Empty if none.
    pub fn eligible(&self, kind: &RequirementKind) -> &[Arc<dyn RequirementHandler>] {
        self.handlers.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn handles(&self, kind: &RequirementKind) -> bool {
        !self.eligible(kind).is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &RequirementKind> {
        self.handlers.keys()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (kind, handlers) in &self.handlers {
            let names: Vec<&str> = handlers.iter().map(|h| h.name()).collect();
            map.entry(&kind.as_str(), &names);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        kinds: Vec<RequirementKind>,
    }

    impl RequirementHandler for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn kinds(&self) -> Vec<RequirementKind> {
            self.kinds.clone()
        }

        fn evaluate(&self, _: &Principal, _: &Requirement) -> Result<Verdict, HandlerFault> {
            Ok(Verdict::Abstain)
        }
    }

    #[test]
    fn test_registration_order_preserved() {
        let registry = HandlerRegistry::new()
            .with(Fixed {
                name: "first",
                kinds: vec![RequirementKind::ASSERTION],
            })
            .with(Fixed {
                name: "second",
                kinds: vec![RequirementKind::ASSERTION, RequirementKind::ROLE],
            });

        let names: Vec<&str> = registry
            .eligible(&RequirementKind::ASSERTION)
            .iter()
            .map(|h| h.name())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(registry.eligible(&RequirementKind::ROLE).len(), 1);
    }

    #[test]
    fn test_unregistered_kind_has_no_handlers() {
        let registry = HandlerRegistry::new();
        assert!(registry.eligible(&RequirementKind::CLAIM).is_empty());
        assert!(!registry.handles(&RequirementKind::custom("Nope")));
    }

    #[test]
    fn test_verdict_from_bool() {
        assert_eq!(Verdict::from(true), Verdict::Succeed);
        assert_eq!(Verdict::from(false), Verdict::Fail);
    }
}

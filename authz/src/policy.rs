//! Named policies and the start-up policy registry.

use crate::error::{AuthzError, Result};
use crate::requirement::Requirement;
use serde::Serialize;
use std::collections::BTreeMap;

/// A named AND-combination of requirements.
///
/// Requirement order does not affect the decision; it is kept so Deny reasons
/// come out in the order the policy was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Policy {
    name: String,
    requirements: Vec<Requirement>,
}

impl Policy {
    /// Creates a policy, rejecting an empty requirement list.
    pub fn new(name: impl Into<String>, requirements: Vec<Requirement>) -> Result<Self> {
        let name = name.into();
        if requirements.is_empty() {
            return Err(AuthzError::EmptyPolicy(name));
        }
        Ok(Self { name, requirements })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

/// Policy name to policy, populated once at start-up.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, Policy>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from `(name, requirements)` pairs, e.g. a parsed
    /// configuration file.
    pub fn from_definitions<I, S>(definitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<Requirement>)>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for (name, requirements) in definitions {
            registry.insert(Policy::new(name, requirements)?)?;
        }
        Ok(registry)
    }

    /// Adds a policy. A name that is already registered is an error, never an
    /// overwrite.
    pub fn insert(&mut self, policy: Policy) -> Result<()> {
        if self.policies.contains_key(policy.name()) {
            return Err(AuthzError::DuplicatePolicy(policy.name().to_string()));
        }
        self.policies.insert(policy.name().to_string(), policy);
        Ok(())
    }

    pub fn with(mut self, policy: Policy) -> Result<Self> {
        self.insert(policy)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Policy> {
        self.policies.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_policy_rejected() {
        let err = Policy::new("Nothing", vec![]).unwrap_err();
        assert_eq!(err, AuthzError::EmptyPolicy("Nothing".into()));
    }

    #[test]
    fn test_duplicate_policy_rejected() {
        let registry = PolicyRegistry::new()
            .with(Policy::new("EditAlbums", vec![Requirement::claim("Edit Albums")]).unwrap())
            .unwrap();

        let err = registry
            .with(Policy::new("EditAlbums", vec![Requirement::role("Administrators")]).unwrap())
            .unwrap_err();
        assert_eq!(err, AuthzError::DuplicatePolicy("EditAlbums".into()));
    }

    #[test]
    fn test_from_definitions_keeps_requirement_order() {
        let registry = PolicyRegistry::from_definitions([(
            "Strict",
            vec![Requirement::role("Administrators"), Requirement::claim("Edit Albums")],
        )])
        .unwrap();

        let policy = registry.get("Strict").unwrap();
        assert_eq!(
            policy.requirements(),
            &[Requirement::role("Administrators"), Requirement::claim("Edit Albums")]
        );
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Strict"]);
        assert!(registry.get("Lenient").is_none());
    }

    #[test]
    fn test_from_definitions_rejects_empty() {
        let result = PolicyRegistry::from_definitions([("Empty", Vec::new())]);
        assert!(matches!(result, Err(AuthzError::EmptyPolicy(name)) if name == "Empty"));
    }
}

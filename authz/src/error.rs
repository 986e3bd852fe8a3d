//! Error types for the authorization system.
//!
//! # Security Note
//! Evaluation outcomes (Allow/Deny) are not errors. The variants here describe
//! configuration problems or requests for policies that were never registered.
//! Deny reasons are carried by [`crate::Decision`] instead, so callers never
//! confuse "the caller is not allowed" with "the engine is misconfigured".

use thiserror::Error;

/// Errors that can occur while building or querying the authorization engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// No policy with this name was registered at start-up.
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    /// A policy was declared with no requirements.
    ///
    /// An empty requirement list would allow everyone, so it is rejected when
    /// the policy registry is built.
    #[error("Policy has no requirements: {0}")]
    EmptyPolicy(String),

    /// Two policies were registered under the same name.
    #[error("Policy registered twice: {0}")]
    DuplicatePolicy(String),
}

/// A specialized Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

//! The back office's own handlers and engine assembly.

use crate::config::BackOfficeConfig;
use crate::error::Result;
use authz::handlers::{standard_registry, AssertionHandler};
use authz::{AuthzEngine, HandlerRegistry, PolicyRegistry};

pub const ADMINISTRATORS: &str = "Administrators";
pub const EDIT_ALBUMS: &str = "Edit Albums";

/// Assertion tag: the principal holds an `Edit Albums` claim.
pub const HAS_EDIT_ALBUMS_CLAIM: &str = "has-edit-albums-claim";

/// Assertion tag: the principal is an administrator or may edit albums.
pub const QUALIFIED_USER: &str = "qualified-user";

/// Standard role, claim and domain handlers plus the assertion handlers the
/// default policies reference.
///
/// `qualified-user` has two handlers, one per ground. Either succeeding
/// satisfies the requirement.
pub fn backoffice_handlers() -> HandlerRegistry {
    standard_registry()
        .with(AssertionHandler::new(
            "EditAlbumsClaimAssertion",
            HAS_EDIT_ALBUMS_CLAIM,
            |principal| Ok(principal.has_claim(EDIT_ALBUMS, None)),
        ))
        .with(AssertionHandler::new(
            "AdministratorsHandler",
            QUALIFIED_USER,
            |principal| Ok(principal.has_role_named(ADMINISTRATORS)),
        ))
        .with(AssertionHandler::new(
            "CanEditAlbumHandler",
            QUALIFIED_USER,
            |principal| Ok(principal.has_claim(EDIT_ALBUMS, None)),
        ))
}

pub fn build_engine(config: &BackOfficeConfig) -> Result<AuthzEngine> {
    config.validate()?;
    let policies = PolicyRegistry::from_definitions(config.policies.clone())?;
    Ok(AuthzEngine::new(policies, backoffice_handlers()))
}

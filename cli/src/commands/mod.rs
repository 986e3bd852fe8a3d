pub mod authorize;
pub mod cache;
pub mod claims;
pub mod policies;
pub mod roles;
pub mod users;

//! Role membership and claim administration.
//!
//! - [`PrincipalDirectory`]: the external store of principals, roles and claims
//! - [`InMemoryDirectory`] and [`SqliteDirectory`]: directory implementations
//! - [`MembershipReconciler`]: idempotent role and claim edits with uniform
//!   error reporting

pub mod directory;
pub mod error;
pub mod memory;
pub mod reconciler;
pub mod sqlite;

pub use directory::{DirectoryOutcome, DirectoryResult, PrincipalDirectory};
pub use error::{DirectoryError, MembershipError, Result};
pub use memory::InMemoryDirectory;
pub use reconciler::MembershipReconciler;
pub use sqlite::{DirectoryConfig, SqliteDirectory};

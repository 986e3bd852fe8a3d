use authz::AuthzError;
use json_cache::JsonCacheError;
use membership::{DirectoryError, MembershipError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackOfficeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authorization error: {0}")]
    Authz(#[from] AuthzError),

    #[error("Cache error: {0}")]
    Cache(#[from] JsonCacheError),

    #[error(transparent)]
    Membership(#[from] MembershipError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Principal not found: {0}")]
    PrincipalNotFound(String),

    #[error("Logging initialization failed: {0}")]
    Logging(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl From<cancellation::Cancelled> for BackOfficeError {
    fn from(_: cancellation::Cancelled) -> Self {
        BackOfficeError::Cancelled
    }
}

impl BackOfficeError {
    /// True for a cancellation raised anywhere below the facade.
    pub fn is_cancelled(&self) -> bool {
        match self {
            BackOfficeError::Cancelled => true,
            BackOfficeError::Cache(e) => e.is_cancelled(),
            BackOfficeError::Membership(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackOfficeError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JsonCacheError {
    #[error("ReDB error: {0}")]
    ReDB(#[from] redb::Error),

    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A cached payload exists but cannot be decoded. Never reported as a miss.
    #[error("Cache corruption for key {key}: {reason}")]
    CacheCorruption { key: String, reason: String },

    #[error("Loader failed: {0}")]
    Loader(String),

    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Cache operation cancelled")]
    Cancelled,
}

impl From<cancellation::Cancelled> for JsonCacheError {
    fn from(_: cancellation::Cancelled) -> Self {
        JsonCacheError::Cancelled
    }
}

impl JsonCacheError {
    pub fn is_corruption(&self) -> bool {
        matches!(self, JsonCacheError::CacheCorruption { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JsonCacheError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, JsonCacheError>;

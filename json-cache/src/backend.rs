//! Key/byte-blob cache backends.
//!
//! The cache-aside store only needs three operations from the shared cache.
//! Each call may leave the process (Redis, a file-backed store), so every
//! operation is async.

use crate::error::{JsonCacheError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Shared, mutable key/byte-blob cache.
///
/// Writers race with last-write-wins semantics; the store adds no locking.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Raw bytes under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`. `ttl` is a hint the backend may use to
    /// expire the entry on its own.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Remove `key`. Returns true if something was removed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(JsonCacheError::InvalidKey("cache key cannot be empty".to_string()));
    }
    Ok(())
}

/// In-process backend for tests and single-node deployments.
///
/// Ignores the TTL hint; freshness is judged by the cache-aside store.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Option<Duration>) -> Result<()> {
        validate_key(key)?;
        debug!("Memory cache set: key={}, size={} bytes", key, value.len());
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

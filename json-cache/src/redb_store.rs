//! File-backed cache backend on ReDB.

use crate::backend::{validate_key, CacheBackend};
use crate::error::{JsonCacheError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// Raw cached bytes and their bookkeeping live in separate tables
const CACHE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("json_cache");
const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("cache_metadata");

/// Bookkeeping for one stored blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub key: String,
    pub cached_at: DateTime<Utc>,
    /// `None` keeps the entry until it is deleted
    pub ttl_millis: Option<i64>,
    pub size_bytes: usize,
}

impl CacheMetadata {
    /// Expired once the entry is strictly older than its TTL.
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_millis {
            None => false,
            Some(ttl) => now - self.cached_at > chrono::Duration::milliseconds(ttl),
        }
    }
}

/// Whole milliseconds, rounded up so the backend never expires an entry
/// before the caller's TTL has run out.
fn ttl_millis(ttl: Duration) -> i64 {
    let mut millis = ttl.as_millis();
    if ttl.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    i64::try_from(millis).unwrap_or(i64::MAX)
}

/// Statistics about the cache
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

/// Byte cache persisted in a ReDB file.
///
/// ReDB serializes write transactions itself, so the handle is shared without
/// an extra lock. Blocking ReDB calls run on the blocking thread pool.
#[derive(Clone)]
pub struct RedbCache {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbCache").field("path", &self.path).finish()
    }
}

impl RedbCache {
    /// Open or create the cache file
    pub fn open(cache_path: impl AsRef<Path>) -> Result<Self> {
        let path = cache_path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening cache database at: {:?}", path);
        let db = Database::create(&path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CACHE_TABLE)?;
            let _ = write_txn.open_table(METADATA_TABLE)?;
        }
        write_txn.commit()?;

        info!("Cache database initialized successfully");

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Get the path to the cache database
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_entry(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let metadata = CacheMetadata {
            key: key.to_string(),
            cached_at: Utc::now(),
            ttl_millis: ttl.map(ttl_millis),
            size_bytes: value.len(),
        };
        let metadata_bytes = serde_json::to_vec(&metadata)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut cache_table = write_txn.open_table(CACHE_TABLE)?;
            cache_table.insert(key, value)?;

            let mut metadata_table = write_txn.open_table(METADATA_TABLE)?;
            metadata_table.insert(key, metadata_bytes.as_slice())?;
        }
        write_txn.commit()?;

        debug!("Cached blob: key={}, size={} bytes", key, value.len());
        Ok(())
    }

    fn read_entry(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let cache_table = read_txn.open_table(CACHE_TABLE)?;
        let metadata_table = read_txn.open_table(METADATA_TABLE)?;

        let content = match cache_table.get(key)? {
            Some(bytes) => bytes.value().to_vec(),
            None => {
                debug!("Cache miss: key={}", key);
                return Ok(None);
            }
        };

        let metadata_bytes = match metadata_table.get(key)? {
            Some(bytes) => bytes.value().to_vec(),
            None => {
                warn!("Cache metadata missing for key={}", key);
                return Ok(None);
            }
        };

        // Broken bookkeeping is a backend fault, not a miss
        let metadata: CacheMetadata = serde_json::from_slice(&metadata_bytes)?;
        if metadata.is_expired(Utc::now()) {
            debug!("Cache entry expired in backend: key={}", key);
            return Ok(None);
        }

        Ok(Some(content))
    }

    fn remove_entry(&self, key: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut cache_table = write_txn.open_table(CACHE_TABLE)?;
            let was_deleted = cache_table.remove(key)?.is_some();

            let mut metadata_table = write_txn.open_table(METADATA_TABLE)?;
            metadata_table.remove(key)?;

            was_deleted
        };
        write_txn.commit()?;

        debug!("Deleted from cache: key={}, existed={}", key, deleted);
        Ok(deleted)
    }

    /// Clear all entries from the cache
    pub fn clear(&self) -> Result<usize> {
        info!("Clearing all cache entries");

        let write_txn = self.db.begin_write()?;
        let count = {
            let mut cache_table = write_txn.open_table(CACHE_TABLE)?;
            let mut metadata_table = write_txn.open_table(METADATA_TABLE)?;

            let mut keys = Vec::new();
            for result in cache_table.iter()? {
                let (key, _) = result?;
                keys.push(key.value().to_string());
            }

            for key in &keys {
                cache_table.remove(key.as_str())?;
                metadata_table.remove(key.as_str())?;
            }
            keys.len()
        };
        write_txn.commit()?;

        info!("Cleared {} cache entries", count);
        Ok(count)
    }

    /// Get statistics about the cache
    pub fn stats(&self) -> Result<CacheStats> {
        let read_txn = self.db.begin_read()?;
        let metadata_table = read_txn.open_table(METADATA_TABLE)?;
        let now = Utc::now();

        let mut total_entries = 0usize;
        let mut total_size = 0usize;
        let mut expired_count = 0usize;

        for result in metadata_table.iter()? {
            let (_, metadata_bytes) = result?;
            let metadata: CacheMetadata = serde_json::from_slice(metadata_bytes.value())?;

            total_entries += 1;
            total_size += metadata.size_bytes;
            if metadata.is_expired(now) {
                expired_count += 1;
            }
        }

        Ok(CacheStats {
            total_entries,
            total_size_bytes: total_size,
            expired_entries: expired_count,
            active_entries: total_entries - expired_count,
        })
    }

    /// Remove expired entries from the cache
    pub fn evict_expired(&self) -> Result<usize> {
        info!("Evicting expired cache entries");

        let read_txn = self.db.begin_read()?;
        let metadata_table = read_txn.open_table(METADATA_TABLE)?;
        let now = Utc::now();

        let mut expired_keys = Vec::new();
        for result in metadata_table.iter()? {
            let (key, metadata_bytes) = result?;
            let metadata: CacheMetadata = serde_json::from_slice(metadata_bytes.value())?;
            if metadata.is_expired(now) {
                expired_keys.push(key.value().to_string());
            }
        }

        drop(metadata_table);
        drop(read_txn);

        let count = expired_keys.len();
        for key in expired_keys {
            self.remove_entry(&key)?;
        }

        info!("Evicted {} expired cache entries", count);
        Ok(count)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(RedbCache) -> Result<T> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || op(this))
            .await
            .map_err(|e| JsonCacheError::Backend(format!("cache task failed: {}", e)))?
    }
}

#[async_trait]
impl CacheBackend for RedbCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let key = key.to_string();
        self.blocking(move |cache| cache.read_entry(&key)).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        validate_key(key)?;
        let key = key.to_string();
        self.blocking(move |cache| cache.write_entry(&key, &value, ttl))
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let key = key.to_string();
        self.blocking(move |cache| cache.remove_entry(&key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, RedbCache) {
        let dir = TempDir::new().unwrap();
        let cache = RedbCache::open(dir.path().join("cache.redb")).unwrap();
        (dir, cache)
    }

    #[tokio::test]
    async fn test_cache_basic_operations() {
        let (_dir, cache) = open_temp();

        cache
            .set("albums", b"[1,2,3]".to_vec(), Some(Duration::from_secs(3600)))
            .await
            .unwrap();
        assert_eq!(cache.get("albums").await.unwrap(), Some(b"[1,2,3]".to_vec()));
        assert!(cache.get("nonexistent").await.unwrap().is_none());

        assert!(cache.delete("albums").await.unwrap());
        assert!(cache.get("albums").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_expiration() {
        let (_dir, cache) = open_temp();

        cache
            .set("expired", b"{}".to_vec(), Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("expired").await.unwrap().is_none());

        cache.set("forever", b"{}".to_vec(), None).await.unwrap();
        assert!(cache.get("forever").await.unwrap().is_some());

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.active_entries, 1);

        assert_eq!(cache.evict_expired().unwrap(), 1);
        assert_eq!(cache.stats().unwrap().total_entries, 1);
    }

    #[test]
    fn test_ttl_kept_below_one_second() {
        assert_eq!(ttl_millis(Duration::from_millis(900)), 900);
        assert_eq!(ttl_millis(Duration::from_micros(1_500)), 2);
        assert_eq!(ttl_millis(Duration::from_millis(1_500)), 1_500);

        let cached_at = Utc::now();
        let metadata = CacheMetadata {
            key: "albums".to_string(),
            cached_at,
            ttl_millis: Some(ttl_millis(Duration::from_millis(1_500))),
            size_bytes: 2,
        };
        assert!(!metadata.is_expired(cached_at + chrono::Duration::milliseconds(1_200)));
        assert!(!metadata.is_expired(cached_at + chrono::Duration::milliseconds(1_500)));
        assert!(metadata.is_expired(cached_at + chrono::Duration::milliseconds(1_501)));
    }

    #[tokio::test]
    async fn test_sub_second_ttl_serves_hits_through_store() {
        use crate::store::CacheAside;
        use cancellation::CancelSignal;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (_dir, cache) = open_temp();
        let store = CacheAside::new(Arc::new(cache));
        let calls = AtomicUsize::new(0);
        let ttl = Some(Duration::from_millis(900));

        for _ in 0..3 {
            let calls = &calls;
            let value = store
                .get_or_load("albums", ttl, &CancelSignal::never(), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(vec![7u32])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![7]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let (_dir, cache) = open_temp();
        cache.set("a", b"1".to_vec(), None).await.unwrap();
        cache.set("b", b"2".to_vec(), None).await.unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reopen_keeps_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.redb");
        {
            let cache = RedbCache::open(&path).unwrap();
            cache.set("albums", b"[]".to_vec(), None).await.unwrap();
        }

        let cache = RedbCache::open(&path).unwrap();
        assert_eq!(cache.get("albums").await.unwrap(), Some(b"[]".to_vec()));
    }
}

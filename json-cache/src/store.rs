//! Cache-aside read-through store.
//!
//! `get_or_load` checks the backend, and on a miss runs the caller's loader
//! and writes the result back. Concurrent misses on one key are not coalesced:
//! each caller runs the loader and writes its own copy, last write wins. The
//! loaders this store is used with are idempotent reads, so the duplicate
//! work is the only cost.
//!
//! Stored bytes are a JSON envelope around the JSON-encoded value:
//!
//! ```json
//! {"cached_at":"2026-10-19T08:00:00Z","content_hash":"<sha256 hex>","payload":"[...]"}
//! ```
//!
//! An envelope that does not parse, a digest mismatch, or a payload that does
//! not decode into the requested type is reported as
//! [`JsonCacheError::CacheCorruption`], never as a miss.

use crate::backend::CacheBackend;
use crate::error::{JsonCacheError, Result};
use cancellation::CancelSignal;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of "now" for freshness checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(delta) = chrono::Duration::from_std(by) {
            *now = *now + delta;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What actually sits in the backend under a key.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    cached_at: DateTime<Utc>,
    content_hash: String,
    payload: String,
}

fn content_hash(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

fn corruption(key: &str, reason: impl Display) -> JsonCacheError {
    JsonCacheError::CacheCorruption {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

impl CacheEnvelope {
    fn wrap<T: Serialize>(value: &T, now: DateTime<Utc>) -> Result<Self> {
        let payload = serde_json::to_string(value)?;
        Ok(Self {
            cached_at: now,
            content_hash: content_hash(&payload),
            payload,
        })
    }

    fn parse(key: &str, bytes: &[u8]) -> Result<Self> {
        let envelope: Self =
            serde_json::from_slice(bytes).map_err(|e| corruption(key, format!("envelope: {}", e)))?;
        if content_hash(&envelope.payload) != envelope.content_hash {
            return Err(corruption(key, "content hash mismatch"));
        }
        Ok(envelope)
    }

    /// Fresh while its age is at most `ttl`; no TTL means fresh until invalidated.
    fn is_fresh(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        let Some(ttl) = ttl else {
            return true;
        };
        let age = (now - self.cached_at).to_std().unwrap_or(Duration::ZERO);
        age <= ttl
    }

    fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        serde_json::from_str(&self.payload).map_err(|e| corruption(key, format!("payload: {}", e)))
    }
}

/// Get-or-populate primitive over a shared [`CacheBackend`].
pub struct CacheAside<B: ?Sized> {
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
}

impl<B: ?Sized> Clone for CacheAside<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<B> CacheAside<B>
where
    B: CacheBackend + ?Sized,
{
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: Arc<B>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Return the cached value for `key`, or run `loader` and cache its result.
    ///
    /// A stored entry strictly older than `ttl` counts as a miss. `ttl = None` keeps an
    /// entry fresh until [`invalidate`](Self::invalidate) is called.
    ///
    /// # Errors
    ///
    /// - `CacheCorruption` if a stored entry cannot be decoded
    /// - `Loader` if the loader fails; nothing is written
    /// - `Cancelled` if `cancel` fires at any backend call or during loading
    /// - backend errors as reported by the backend, never retried here
    pub async fn get_or_load<T, F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        cancel: &CancelSignal,
        loader: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        if let Some(value) = self.lookup(key, ttl, cancel).await? {
            return Ok(value);
        }

        let value = cancel
            .run(loader())
            .await?
            .map_err(|e| JsonCacheError::Loader(e.to_string()))?;

        let envelope = CacheEnvelope::wrap(&value, self.clock.now())?;
        let bytes = serde_json::to_vec(&envelope)?;
        let size = bytes.len();
        cancel.run(self.backend.set(key, bytes, ttl)).await??;
        debug!("Cache populated: key={}, size={} bytes", key, size);

        Ok(value)
    }

    /// The fresh cached value for `key`, without loading on a miss.
    pub async fn lookup<T>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        cancel: &CancelSignal,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let Some(bytes) = cancel.run(self.backend.get(key)).await?? else {
            debug!("Cache miss: key={}", key);
            return Ok(None);
        };

        let envelope = match CacheEnvelope::parse(key, &bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("{}", e);
                return Err(e);
            }
        };

        if !envelope.is_fresh(ttl, self.clock.now()) {
            debug!("Cache entry stale: key={}, cached_at={}", key, envelope.cached_at);
            return Ok(None);
        }

        let value = envelope.decode(key).map_err(|e| {
            warn!("{}", e);
            e
        })?;
        debug!("Cache hit: key={}", key);
        Ok(Some(value))
    }

    /// Remove `key` unconditionally. The next `get_or_load` is a miss.
    pub async fn invalidate(&self, key: &str, cancel: &CancelSignal) -> Result<bool> {
        let removed = cancel.run(self.backend.delete(key)).await??;
        info!("Cache invalidated: key={}, existed={}", key, removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryCache;
    use cancellation::cancel_pair;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store_with_clock() -> (Arc<MemoryCache>, Arc<ManualClock>, CacheAside<MemoryCache>) {
        let backend = Arc::new(MemoryCache::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = CacheAside::with_clock(Arc::clone(&backend), clock.clone());
        (backend, clock, store)
    }

    async fn counted_load(
        store: &CacheAside<MemoryCache>,
        calls: &AtomicUsize,
        ttl: Option<Duration>,
    ) -> Vec<String> {
        store
            .get_or_load("albums", ttl, &CancelSignal::never(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(vec!["Master of Puppets".to_string()])
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_hit_within_ttl_skips_loader() {
        let (_backend, clock, store) = store_with_clock();
        let calls = AtomicUsize::new(0);
        let ttl = Some(Duration::from_secs(60));

        let first = counted_load(&store, &calls, ttl).await;
        clock.advance(Duration::from_secs(30));
        let second = counted_load(&store, &calls, ttl).await;

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_reloads() {
        let (_backend, clock, store) = store_with_clock();
        let calls = AtomicUsize::new(0);
        let ttl = Some(Duration::from_secs(60));

        counted_load(&store, &calls, ttl).await;
        clock.advance(Duration::from_secs(61));
        counted_load(&store, &calls, ttl).await;
        counted_load(&store, &calls, ttl).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_entry_fresh_at_exact_ttl_boundary() {
        let (_backend, clock, store) = store_with_clock();
        let calls = AtomicUsize::new(0);
        let ttl = Some(Duration::from_secs(60));

        counted_load(&store, &calls, ttl).await;
        clock.advance(Duration::from_secs(60));
        counted_load(&store, &calls, ttl).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_millis(1));
        counted_load(&store, &calls, ttl).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_ttl_fresh_until_invalidated() {
        let (_backend, clock, store) = store_with_clock();
        let calls = AtomicUsize::new(0);

        counted_load(&store, &calls, None).await;
        clock.advance(Duration::from_secs(365 * 24 * 3600));
        counted_load(&store, &calls, None).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(store.invalidate("albums", &CancelSignal::never()).await.unwrap());
        counted_load(&store, &calls, None).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_corruption_not_miss() {
        let (backend, _clock, store) = store_with_clock();
        backend
            .set("albums", b"not json at all".to_vec(), None)
            .await
            .unwrap();

        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let err = store
            .get_or_load("albums", None, &CancelSignal::never(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(Vec::<String>::new())
            })
            .await
            .unwrap_err();

        assert!(err.is_corruption());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wrong_shape_payload_is_corruption() {
        let (_backend, _clock, store) = store_with_clock();
        let never = CancelSignal::never();

        store
            .get_or_load("albums", None, &never, || async { Ok::<_, String>(42u32) })
            .await
            .unwrap();

        let err = store
            .lookup::<Vec<String>>("albums", None, &never)
            .await
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[tokio::test]
    async fn test_tampered_payload_detected() {
        let (backend, _clock, store) = store_with_clock();
        let never = CancelSignal::never();
        store
            .get_or_load("albums", None, &never, || async {
                Ok::<_, String>(vec!["a".to_string()])
            })
            .await
            .unwrap();

        let bytes = backend.get("albums").await.unwrap().unwrap();
        let tampered = String::from_utf8(bytes).unwrap().replace("[\\\"a\\\"]", "[\\\"b\\\"]");
        backend.set("albums", tampered.into_bytes(), None).await.unwrap();

        let err = store
            .lookup::<Vec<String>>("albums", None, &never)
            .await
            .unwrap_err();
        assert!(matches!(err, JsonCacheError::CacheCorruption { reason, .. } if reason == "content hash mismatch"));
    }

    #[tokio::test]
    async fn test_invalidate_then_retry_recovers_from_corruption() {
        let (backend, _clock, store) = store_with_clock();
        let never = CancelSignal::never();
        backend.set("albums", b"{".to_vec(), None).await.unwrap();

        assert!(store.lookup::<Vec<String>>("albums", None, &never).await.is_err());
        store.invalidate("albums", &never).await.unwrap();

        let value = store
            .get_or_load("albums", None, &never, || async {
                Ok::<_, String>(vec!["fresh".to_string()])
            })
            .await
            .unwrap();
        assert_eq!(value, vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_loader_error_writes_nothing() {
        let (backend, _clock, store) = store_with_clock();

        let err = store
            .get_or_load("albums", None, &CancelSignal::never(), || async {
                Err::<Vec<String>, _>("database offline")
            })
            .await
            .unwrap_err();

        assert!(matches!(err, JsonCacheError::Loader(msg) if msg == "database offline"));
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancelled_before_lookup() {
        let (backend, _clock, store) = store_with_clock();
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let err = store
            .get_or_load("albums", None, &signal, || async {
                Ok::<_, String>(vec!["x".to_string()])
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_misses_each_load() {
        let backend = Arc::new(MemoryCache::new());
        let store = CacheAside::new(Arc::clone(&backend));
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(tokio::sync::Barrier::new(4));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            tasks.push(tokio::spawn(async move {
                store
                    .get_or_load("albums", None, &CancelSignal::never(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Hold every loader until all four have missed
                        gate.wait().await;
                        Ok::<_, String>(vec!["same".to_string()])
                    })
                    .await
                    .unwrap()
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap(), vec!["same"]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(backend.len().await, 1);
    }
}

//! Bounded in-memory LRU cache with per-entry TTL.
//!
//! Memoizes chunked documents and final answers. The cache is a best-effort
//! accelerator, never a correctness dependency: internal failures are
//! swallowed and logged by the callers' `get`/`set` wrappers, and expiry is
//! lazy (checked on read, no background sweep).

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::RagError;

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Capacity-bounded key-value store with LRU eviction and lazy TTL expiry.
pub struct TtlCache {
    inner: Mutex<LruCache<String, CacheEntry>>,
}

impl TtlCache {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Look up a key, refreshing its recency on a hit. Expired entries are
    /// removed and reported as a miss. Internal errors are swallowed.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.try_get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "cache get failed");
                None
            }
        }
    }

    /// Insert a value with a time-to-live. When the cache is full and the
    /// key is new, the least-recently-used entry is evicted first.
    /// Internal errors are swallowed.
    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        if let Err(e) = self.try_set(key, value, ttl) {
            warn!(key, error = %e, "cache set failed");
        }
    }

    pub fn delete(&self, key: &str) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.pop(key);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn try_get(&self, key: &str) -> Result<Option<String>, RagError> {
        let mut cache = self
            .inner
            .lock()
            .map_err(|e| RagError::Cache(e.to_string()))?;
        // `get` promotes the entry to most-recently-used before the TTL check
        let expired = match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()))
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(key);
        }
        Ok(None)
    }

    fn try_set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RagError> {
        let mut cache = self
            .inner
            .lock()
            .map_err(|e| RagError::Cache(e.to_string()))?;
        cache.push(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

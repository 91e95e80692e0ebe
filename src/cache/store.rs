//! Cache storage.
//!
//! `Cache` is the contract the pipeline controller talks to. `MemoryCache`
//! is the in-process LRU implementation; the disk-backed store lives in
//! `cache::disk`.

use std::sync::RwLock;

use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::config::CacheConfig;
use super::error::CacheError;
use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};
use super::response::CachedResponse;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_EVICT: &str = "pipecache_cache_evict_total";

/// Key/value store from [`CacheKey`] to [`CachedResponse`].
///
/// Implementations synchronize internally and may be shared across
/// concurrent requests. `get` and `contains_key` never fail: absence covers
/// both "never stored" and "evicted".
pub trait Cache: Send + Sync {
    /// Insert or replace the entry for `key`.
    fn store(&self, key: CacheKey, response: CachedResponse) -> Result<(), CacheError>;

    fn get(&self, key: &CacheKey) -> Option<CachedResponse>;

    /// Remove the entry for `key`. Removing an absent key is not an error.
    fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;

    fn contains_key(&self, key: &CacheKey) -> bool;

    /// Drop every entry.
    fn clear(&self) -> Result<(), CacheError>;

    /// Point-in-time snapshot of the stored keys.
    fn keys(&self) -> Vec<CacheKey>;

    fn len(&self) -> usize {
        self.keys().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory response cache with LRU eviction.
pub struct MemoryCache {
    entries: RwLock<LruCache<CacheKey, CachedResponse>>,
}

impl MemoryCache {
    /// Create a new store with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.max_entries_non_zero())),
        }
    }

    /// Maximum number of entries held before eviction.
    pub fn capacity(&self) -> usize {
        rw_read(&self.entries, SOURCE, "capacity").cap().get()
    }
}

impl Cache for MemoryCache {
    fn store(&self, key: CacheKey, response: CachedResponse) -> Result<(), CacheError> {
        let evicted = rw_write(&self.entries, SOURCE, "store").push(key.clone(), response);

        // `push` also hands back the previous value for the same key.
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_CACHE_EVICT, "cache" => "memory").increment(1);
            debug!(cache = "memory", evicted = %evicted_key, "evicted least recently used entry");
        }
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        // LRU bookkeeping needs a write guard even for reads.
        rw_write(&self.entries, SOURCE, "get").get(key).cloned()
    }

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "remove").pop(key);
        Ok(())
    }

    fn contains_key(&self, key: &CacheKey) -> bool {
        rw_read(&self.entries, SOURCE, "contains_key").contains(key)
    }

    fn clear(&self) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "clear").clear();
        Ok(())
    }

    fn keys(&self) -> Vec<CacheKey> {
        rw_read(&self.entries, SOURCE, "keys")
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }
}

//! Response cache.
//!
//! Stores captured pipeline output together with the validity tokens that
//! decide whether it may be replayed:
//!
//! - **Validity**: freshness tokens (`Expires`, `Source`, `Always`) and
//!   their composition
//! - **Store**: the `Cache` contract with in-memory LRU and disk backends
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `pipecache.toml`:
//!
//! ```toml
//! [cache]
//! backend = "memory"
//! max_entries = 1024
//! default_expires_seconds = 3600
//! # ... see config.rs for all options
//! ```

use std::sync::Arc;

use tracing::info;

mod clock;
mod composite;
mod config;
mod disk;
mod error;
mod keys;
mod lock;
mod response;
mod store;
mod validity;

pub use clock::{Clock, ManualClock, SystemClock, truncate_to_second};
pub use composite::CompositeValidity;
pub use config::{CacheBackend, CacheConfig};
pub use disk::DiskCache;
pub use error::CacheError;
pub use keys::{CacheKey, default_key, normalize_path, render_template};
pub use response::CachedResponse;
pub use store::{Cache, MemoryCache};
pub use validity::{Freshness, SourceMarker, Validity};

pub(crate) use config::{DEFAULT_DIRECTORY, DEFAULT_EXPIRES_SECONDS, DEFAULT_MAX_ENTRIES};
pub(crate) use store::METRIC_CACHE_EVICT;

/// Build the store selected by the configuration.
pub fn build_cache(config: &CacheConfig) -> Result<Arc<dyn Cache>, CacheError> {
    let cache: Arc<dyn Cache> = match config.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new(config)),
        CacheBackend::Disk => Arc::new(DiskCache::open(&config.directory)?),
    };

    info!(
        backend = ?config.backend,
        max_entries = config.max_entries,
        directory = %config.directory.display(),
        default_expires_seconds = config.default_expires_seconds,
        "Response cache ready"
    );

    Ok(cache)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn builds_selected_backend() {
        let memory = build_cache(&CacheConfig::default()).expect("memory cache");
        assert!(memory.is_empty());

        let dir = TempDir::new().expect("tempdir");
        let config = CacheConfig {
            backend: CacheBackend::Disk,
            directory: dir.path().join("nested"),
            ..Default::default()
        };
        let disk = build_cache(&config).expect("disk cache");
        assert!(disk.is_empty());
        assert!(dir.path().join("nested").is_dir());
    }
}

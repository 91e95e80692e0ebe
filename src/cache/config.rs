//! Cache configuration.
//!
//! Controls the backing store and the default expiry policy via `pipecache.toml`.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use serde::Deserialize;

// Default values for cache configuration
pub(crate) const DEFAULT_MAX_ENTRIES: usize = 1024;
pub(crate) const DEFAULT_EXPIRES_SECONDS: i64 = 3600;
pub(crate) const DEFAULT_DIRECTORY: &str = "cache";

/// Which store holds cached responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Disk,
}

/// Cache configuration from `pipecache.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching. When off every request regenerates.
    pub enabled: bool,
    /// Backing store for cached responses.
    pub backend: CacheBackend,
    /// Maximum entries held by the memory store.
    pub max_entries: usize,
    /// Directory used by the disk store.
    pub directory: PathBuf,
    /// Expiry applied when a request carries no override.
    /// Positive: seconds. Zero: never cache. Negative: until purged.
    pub default_expires_seconds: i64,
    /// Key template with `{path}` and `{query}` placeholders.
    pub key_template: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
            max_entries: DEFAULT_MAX_ENTRIES,
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            default_expires_seconds: DEFAULT_EXPIRES_SECONDS,
            key_template: None,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            max_entries: settings.max_entries,
            directory: settings.directory.clone(),
            default_expires_seconds: settings.default_expires_seconds,
            key_template: settings.key_template.clone(),
        }
    }
}

impl CacheConfig {
    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.backend, CacheBackend::Memory);
        assert_eq!(config.max_entries, 1024);
        assert_eq!(config.directory, PathBuf::from("cache"));
        assert_eq!(config.default_expires_seconds, 3600);
        assert!(config.key_template.is_none());
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert_eq!(config.max_entries_non_zero().get(), 1);
    }

    #[test]
    fn backend_names_deserialize_lowercase() {
        let parsed: CacheConfig =
            serde_json::from_str(r#"{"backend":"disk","max_entries":8}"#).expect("parse");
        assert_eq!(parsed.backend, CacheBackend::Disk);
        assert_eq!(parsed.max_entries, 8);
        assert_eq!(parsed.default_expires_seconds, 3600);
    }
}

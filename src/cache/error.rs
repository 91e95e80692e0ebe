use thiserror::Error;

/// Failure of a store operation.
///
/// Lookups never fail; only writes and removals can.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to persist cache entry: {0}")]
    Persist(String),
}

use time::{Duration, OffsetDateTime};

use crate::cache::Validity;

/// How long a response may be replayed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Do not cache.
    Never,
    /// Cache for this many seconds.
    For(u64),
    /// Cache until purged or removed.
    Indefinite,
}

impl ExpiryPolicy {
    /// Zero: never. Positive: seconds. Negative: indefinite.
    pub fn from_seconds(seconds: i64) -> Self {
        match seconds {
            0 => ExpiryPolicy::Never,
            s if s > 0 => ExpiryPolicy::For(s.unsigned_abs()),
            _ => ExpiryPolicy::Indefinite,
        }
    }

    pub fn is_never(self) -> bool {
        matches!(self, ExpiryPolicy::Never)
    }

    /// Token stored with a response generated at `created`.
    pub fn validity(self, created: OffsetDateTime) -> Option<Validity> {
        match self {
            ExpiryPolicy::Never => None,
            ExpiryPolicy::For(seconds) => Some(Validity::expires_after(created, seconds)),
            ExpiryPolicy::Indefinite => Some(Validity::Always),
        }
    }

    /// Instant after which a response generated at `created` is stale.
    pub fn expires_at(self, created: OffsetDateTime) -> Option<OffsetDateTime> {
        match self {
            ExpiryPolicy::For(seconds) => {
                let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
                Some(created.saturating_add(Duration::seconds(seconds)))
            }
            ExpiryPolicy::Never | ExpiryPolicy::Indefinite => None,
        }
    }
}

//! Freshness tokens for the dependencies of a cached response.
//!
//! Checking is two-phase. [`Validity::check`] is the cheap self-contained
//! test (has a horizon passed?). Kinds that cannot answer on their own report
//! [`Freshness::Unknown`], and the caller then samples the dependency again
//! and calls [`Validity::compare`] with the fresh sample.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Outcome of a validity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    /// The token cannot decide alone; compare against a new sample.
    Unknown,
}

impl Freshness {
    pub fn is_fresh(self) -> bool {
        matches!(self, Freshness::Fresh)
    }
}

/// Observed state of an external resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceMarker {
    /// Last modification time of the resource.
    Modified(OffsetDateTime),
    /// Opaque entity tag.
    Tag(String),
}

/// A single freshness token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    /// Fresh until the horizon is reached.
    Expires { until: OffsetDateTime },
    /// Fresh while the named dependency still reports the same marker.
    Source {
        dependency: String,
        marker: SourceMarker,
    },
    /// Fresh until the entry is removed explicitly.
    Always,
}

impl Validity {
    pub fn expires_after(created: OffsetDateTime, seconds: u64) -> Self {
        let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
        Validity::Expires {
            until: created.saturating_add(Duration::seconds(seconds)),
        }
    }

    pub fn source(dependency: impl Into<String>, marker: SourceMarker) -> Self {
        Validity::Source {
            dependency: dependency.into(),
            marker,
        }
    }

    pub fn check(&self, now: OffsetDateTime) -> Freshness {
        match self {
            Validity::Expires { until } => {
                if now < *until {
                    Freshness::Fresh
                } else {
                    Freshness::Stale
                }
            }
            Validity::Source { .. } => Freshness::Unknown,
            Validity::Always => Freshness::Fresh,
        }
    }

    /// Compare against a newly observed token for the same dependency.
    ///
    /// Never returns [`Freshness::Unknown`]. Tokens of unrelated kinds or
    /// dependencies compare as stale. Expiry tokens also have to pass their
    /// own check at `now`.
    pub fn compare(&self, other: &Validity, now: OffsetDateTime) -> Freshness {
        let fresh = match (self, other) {
            (Validity::Expires { until }, Validity::Expires { until: other_until }) => {
                until == other_until && self.check(now).is_fresh()
            }
            (
                Validity::Source { dependency, marker },
                Validity::Source {
                    dependency: other_dependency,
                    marker: other_marker,
                },
            ) => dependency == other_dependency && marker == other_marker,
            (Validity::Always, Validity::Always) => true,
            _ => false,
        };

        if fresh {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }

    /// Dependency identifier for source tokens.
    pub fn dependency(&self) -> Option<&str> {
        match self {
            Validity::Source { dependency, .. } => Some(dependency),
            _ => None,
        }
    }
}

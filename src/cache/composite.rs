//! Freshness of a response that depends on several tokens at once.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::validity::{Freshness, Validity};

/// Ordered list of tokens that must all hold.
///
/// Order is kept for diagnostics only; resolution matches tokens by
/// dependency, not by position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeValidity(Vec<Validity>);

impl CompositeValidity {
    pub fn new(validities: Vec<Validity>) -> Self {
        Self(validities)
    }

    pub fn as_slice(&self) -> &[Validity] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Self-contained check of every token.
    ///
    /// An empty list is fresh. Any stale token wins over unknown ones.
    pub fn check(&self, now: OffsetDateTime) -> Freshness {
        let mut outcome = Freshness::Fresh;
        for validity in &self.0 {
            match validity.check(now) {
                Freshness::Fresh => {}
                Freshness::Stale => return Freshness::Stale,
                Freshness::Unknown => outcome = Freshness::Unknown,
            }
        }
        outcome
    }

    /// Settle the tokens that [`check`](Self::check) left undecided.
    ///
    /// `current` is a fresh sample of the dependencies. Missing or
    /// additional dependencies count as stale.
    pub fn resolve(&self, now: OffsetDateTime, current: &[Validity]) -> Freshness {
        let mut matched = 0;
        for validity in &self.0 {
            match validity.check(now) {
                Freshness::Fresh => {}
                Freshness::Stale => return Freshness::Stale,
                Freshness::Unknown => {
                    let Some(sample) = current
                        .iter()
                        .find(|sample| sample.dependency() == validity.dependency())
                    else {
                        return Freshness::Stale;
                    };
                    if validity.compare(sample, now) != Freshness::Fresh {
                        return Freshness::Stale;
                    }
                    matched += 1;
                }
            }
        }

        let sampled = current
            .iter()
            .filter(|sample| sample.dependency().is_some())
            .count();
        if sampled != matched {
            return Freshness::Stale;
        }

        Freshness::Fresh
    }

    /// Dependency identifiers of the source tokens, in order.
    pub fn dependencies(&self) -> Vec<&str> {
        self.0.iter().filter_map(Validity::dependency).collect()
    }
}

impl From<Vec<Validity>> for CompositeValidity {
    fn from(validities: Vec<Validity>) -> Self {
        Self::new(validities)
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;
    use time::macros::datetime;

    use super::*;
    use crate::cache::validity::SourceMarker;

    fn source(dependency: &str, tag: &str) -> Validity {
        Validity::source(dependency, SourceMarker::Tag(tag.to_string()))
    }

    #[test]
    fn empty_list_is_fresh() {
        let composite = CompositeValidity::default();
        let now = datetime!(2024-01-01 00:00 UTC);
        assert_eq!(composite.check(now), Freshness::Fresh);
        assert_eq!(composite.resolve(now, &[]), Freshness::Fresh);
    }

    #[test]
    fn stale_member_short_circuits() {
        let created = datetime!(2024-01-01 00:00 UTC);
        let composite = CompositeValidity::new(vec![
            source("a", "1"),
            Validity::expires_after(created, 10),
        ]);
        let later = created + Duration::seconds(10);
        assert_eq!(composite.check(later), Freshness::Stale);
        assert_eq!(composite.resolve(later, &[source("a", "1")]), Freshness::Stale);
    }

    #[test]
    fn unknown_members_resolve_against_sample() {
        let created = datetime!(2024-01-01 00:00 UTC);
        let composite = CompositeValidity::new(vec![
            Validity::expires_after(created, 60),
            source("a", "1"),
            source("b", "7"),
        ]);
        let now = created + Duration::seconds(5);

        assert_eq!(composite.check(now), Freshness::Unknown);
        assert_eq!(
            composite.resolve(now, &[source("b", "7"), source("a", "1")]),
            Freshness::Fresh
        );
        assert_eq!(
            composite.resolve(now, &[source("a", "1"), source("b", "8")]),
            Freshness::Stale
        );
    }

    #[test]
    fn missing_or_extra_dependencies_are_stale() {
        let now = datetime!(2024-01-01 00:00 UTC);
        let composite = CompositeValidity::new(vec![source("a", "1")]);

        assert_eq!(composite.resolve(now, &[]), Freshness::Stale);
        assert_eq!(
            composite.resolve(now, &[source("a", "1"), source("c", "1")]),
            Freshness::Stale
        );

        let no_sources = CompositeValidity::new(vec![Validity::Always]);
        assert_eq!(no_sources.resolve(now, &[source("a", "1")]), Freshness::Stale);
    }

    #[test]
    fn dependencies_are_listed_in_order() {
        let composite =
            CompositeValidity::new(vec![source("b", "1"), Validity::Always, source("a", "1")]);
        assert_eq!(composite.dependencies(), vec!["b", "a"]);
    }
}

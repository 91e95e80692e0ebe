//! Cache key definitions.
//!
//! A key names one cacheable unit of pipeline output. The same request can
//! be cached at two granularities (final bytes or the intermediate event
//! stream), and the `complete` flag keeps those apart inside one store.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    key: String,
    /// `true` for serialized bytes, `false` for the compiled event stream.
    complete: bool,
}

impl CacheKey {
    pub fn new(key: impl Into<String>, complete: bool) -> Self {
        Self {
            key: key.into(),
            complete,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let granularity = if self.complete { "bytes" } else { "events" };
        write!(f, "{}#{granularity}", self.key)
    }
}

/// Canonical form of a request path.
///
/// Always starts with `/`, has no empty, `.` or `..` segments, and keeps a
/// trailing slash when the input had one. `..` never climbs above the root.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut normalized = String::with_capacity(path.len() + 1);
    normalized.push('/');
    normalized.push_str(&segments.join("/"));

    let trailing = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    if trailing && !segments.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// Default key for a request: the normalized path plus the query, if any.
pub fn default_key(path: &str, query: Option<&str>) -> String {
    let path = normalize_path(path);
    match query.filter(|q| !q.is_empty()) {
        Some(query) => format!("{path}?{query}"),
        None => path,
    }
}

/// Expand `{path}` and `{query}` in a configured key template.
pub fn render_template(template: &str, path: &str, query: Option<&str>) -> String {
    template
        .replace("{path}", &normalize_path(path))
        .replace("{query}", query.unwrap_or(""))
}

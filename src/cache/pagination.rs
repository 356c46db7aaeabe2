//! Pagination response cache.
//!
//! Short-lived cache for paginated list responses, keyed by endpoint plus the
//! query dimensions that shape the page. Deliberately not wired into the
//! multi-tier purge: its freshness window is short enough that a targeted
//! invalidation on write is sufficient.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use metrics::counter;

/// Builds the composite cache key for one paginated request. Dimensions are
/// sorted so equivalent requests collide regardless of parameter order.
pub fn page_key(endpoint: &str, dimensions: &[(&str, &str)]) -> String {
    let mut dims: Vec<String> = dimensions
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    dims.sort();
    if dims.is_empty() {
        endpoint.to_string()
    } else {
        format!("{endpoint}?{}", dims.join("&"))
    }
}

/// Parent category to child categories. Invalidating a section drops the
/// parent's pages and every child's.
const SECTIONS: &[(&str, &[&str])] = &[
    ("news", &["business", "politics", "world"]),
    ("entertainment", &["music", "gaming", "movies"]),
];

struct CachedPage {
    body: serde_json::Value,
    inserted_at: Instant,
}

pub struct PaginationCache {
    ttl: Duration,
    entries: DashMap<String, CachedPage>,
}

impl PaginationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Expired entries are dropped lazily on read; there is no sweeper.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(entry) = self.entries.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                counter!("vodsync_cache_pagination_hit_total").increment(1);
                return Some(entry.body.clone());
            }
        } else {
            counter!("vodsync_cache_pagination_miss_total").increment(1);
            return None;
        }
        self.entries.remove(key);
        counter!("vodsync_cache_pagination_miss_total").increment(1);
        None
    }

    pub fn put(&self, key: String, body: serde_json::Value) {
        self.entries.insert(
            key,
            CachedPage {
                body,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove every page whose `category` or `slug` dimension contains the
    /// given category as a substring, so compound values like
    /// `business-news` fall with `business`.
    pub fn invalidate_category(&self, category: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| {
            !key.split(['?', '&']).any(|segment| {
                segment
                    .strip_prefix("category=")
                    .or_else(|| segment.strip_prefix("slug="))
                    .is_some_and(|value| value.contains(category))
            })
        });
        before.saturating_sub(self.entries.len())
    }

    /// Remove every page whose key carries the given author dimension.
    pub fn invalidate_author(&self, author: &str) -> usize {
        self.invalidate_dimension("author", author)
    }

    /// Remove every page whose key carries the given tag dimension.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        self.invalidate_dimension("tag", tag)
    }

    /// Remove every page keyed to a section's parent category or any of its
    /// child categories; an unknown section invalidates just itself.
    pub fn invalidate_section(&self, section: &str) -> usize {
        let mut removed = self.invalidate_category(section);
        if let Some((_, children)) = SECTIONS.iter().find(|(parent, _)| *parent == section) {
            for child in *children {
                removed += self.invalidate_category(child);
            }
        }
        removed
    }

    /// Remove every page cached under the given endpoint.
    pub fn invalidate_endpoint(&self, endpoint: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|key, _| !(key == endpoint || key.starts_with(&format!("{endpoint}?"))));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn invalidate_dimension(&self, dimension: &str, value: &str) -> usize {
        let needle = format!("{dimension}={value}");
        let before = self.entries.len();
        self.entries.retain(|key, _| {
            !key
                .split(['?', '&'])
                .any(|segment| segment == needle)
        });
        before.saturating_sub(self.entries.len())
    }
}

//! Cache configuration.
//!
//! Controls the in-memory stores, the pagination cache, and the multi-tier
//! purge timing via `vodsync.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_VIDEO_LIMIT: usize = 2000;
const DEFAULT_LIST_LIMIT: usize = 100;
const DEFAULT_MEMORY_TTL_SECS: u64 = 300;
const DEFAULT_PAGINATION_TTL_SECS: u64 = 60;
const DEFAULT_CDN_SETTLE_MS: u64 = 2000;
const DEFAULT_ISR_SETTLE_MS: u64 = 1000;

/// Cache configuration from `vodsync.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the in-memory video/list stores.
    pub enable_memory_cache: bool,
    /// Enable the pagination response cache.
    pub enable_pagination_cache: bool,
    /// Maximum videos in the in-memory KV cache.
    pub video_limit: usize,
    /// Maximum cached list query results.
    pub list_limit: usize,
    /// Freshness window for in-memory entries, in seconds.
    pub memory_ttl_secs: u64,
    /// Freshness window for pagination entries, in seconds.
    pub pagination_ttl_secs: u64,
    /// Pause after a successful CDN purge before page revalidation, in
    /// milliseconds.
    pub cdn_settle_ms: u64,
    /// Pause after a successful page revalidation, in milliseconds.
    pub isr_settle_ms: u64,
    /// Frontend paths regenerated after a full purge.
    pub revalidate_paths: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_memory_cache: true,
            enable_pagination_cache: true,
            video_limit: DEFAULT_VIDEO_LIMIT,
            list_limit: DEFAULT_LIST_LIMIT,
            memory_ttl_secs: DEFAULT_MEMORY_TTL_SECS,
            pagination_ttl_secs: DEFAULT_PAGINATION_TTL_SECS,
            cdn_settle_ms: DEFAULT_CDN_SETTLE_MS,
            isr_settle_ms: DEFAULT_ISR_SETTLE_MS,
            revalidate_paths: vec!["/".to_string(), "/videos".to_string()],
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_memory_cache: settings.enable_memory_cache,
            enable_pagination_cache: settings.enable_pagination_cache,
            video_limit: settings.video_limit,
            list_limit: settings.list_limit,
            memory_ttl_secs: settings.memory_ttl_secs,
            pagination_ttl_secs: settings.pagination_ttl_secs,
            cdn_settle_ms: settings.cdn_settle_ms,
            isr_settle_ms: settings.isr_settle_ms,
            revalidate_paths: settings.revalidate_paths.clone(),
        }
    }
}

impl CacheConfig {
    /// Returns the video limit as NonZeroUsize, clamping to 1 if zero.
    pub fn video_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.video_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the list limit as NonZeroUsize, clamping to 1 if zero.
    pub fn list_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.list_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_secs)
    }

    pub fn pagination_ttl(&self) -> Duration {
        Duration::from_secs(self.pagination_ttl_secs)
    }

    pub fn cdn_settle(&self) -> Duration {
        Duration::from_millis(self.cdn_settle_ms)
    }

    pub fn isr_settle(&self) -> Duration {
        Duration::from_millis(self.isr_settle_ms)
    }
}

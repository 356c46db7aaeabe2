//! Vodsync cache hierarchy.
//!
//! Three purgeable layers, innermost first:
//!
//! - **Layer 1 (memory)**: per-instance LRU stores over domain records
//! - **Layer 2 (CDN)**: the edge cache, purged through its API
//! - **Layer 3 (pages)**: statically-rendered frontend pages, regenerated on
//!   demand
//!
//! Alongside the hierarchy sits the pagination cache, a short-TTL response
//! cache invalidated on write rather than through the coordinator.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `vodsync.toml`:
//!
//! ```toml
//! [cache]
//! enable_memory_cache = true
//! video_limit = 2000
//! pagination_ttl_secs = 60
//! # ... see config.rs for all options
//! ```

mod config;
mod coordinator;
mod lock;
mod pagination;
mod store;

pub use config::CacheConfig;
pub use coordinator::{CacheCoordinator, PurgeOutcome};
pub use pagination::{PaginationCache, page_key};
pub use store::{ClearedCounts, MemoryStores};

//! Catalog synchronization: membership indexing and the sync engine.

mod engine;
mod membership;

pub use engine::{EnrichReport, SyncEngine, SyncError, SyncReport};
pub use membership::{MAX_PAGES_PER_PLAYLIST, MembershipIndex, MembershipIndexBuilder};

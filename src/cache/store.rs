//! In-memory cache storage.
//!
//! Layer 1 of the purge hierarchy: per-instance LRU stores in front of the
//! database. Entries carry their insertion instant and are rechecked against
//! the configured freshness window on every read.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::domain::entities::{PlaylistRecord, VideoRecord};

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

struct Stamped<T> {
    value: T,
    inserted_at: Instant,
}

impl<T> Stamped<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    fn fresh(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() < ttl
    }
}

/// Counts of entries dropped by a [`MemoryStores::clear`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedCounts {
    pub videos: usize,
    pub lists: usize,
    pub playlists: usize,
}

impl ClearedCounts {
    pub fn total(&self) -> usize {
        self.videos + self.lists + self.playlists
    }
}

/// In-memory stores for videos, list query results, and the playlist roster.
pub struct MemoryStores {
    ttl: Duration,
    videos_by_id: RwLock<LruCache<String, Stamped<VideoRecord>>>,
    // Key: hash of the list filter + limit.
    video_lists: RwLock<LruCache<u64, Stamped<Vec<VideoRecord>>>>,
    playlists: RwLock<Option<Stamped<Vec<PlaylistRecord>>>>,
}

impl MemoryStores {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: config.memory_ttl(),
            videos_by_id: RwLock::new(LruCache::new(config.video_limit_non_zero())),
            video_lists: RwLock::new(LruCache::new(config.list_limit_non_zero())),
            playlists: RwLock::new(None),
        }
    }

    pub fn get_video(&self, video_id: &str) -> Option<VideoRecord> {
        let mut guard = rw_write(&self.videos_by_id, SOURCE, "get_video");
        match guard.get(video_id) {
            Some(entry) if entry.fresh(self.ttl) => Some(entry.value.clone()),
            Some(_) => {
                guard.pop(video_id);
                None
            }
            None => None,
        }
    }

    pub fn set_video(&self, record: VideoRecord) {
        rw_write(&self.videos_by_id, SOURCE, "set_video")
            .put(record.video_id.clone(), Stamped::new(record));
    }

    pub fn invalidate_video(&self, video_id: &str) {
        rw_write(&self.videos_by_id, SOURCE, "invalidate_video").pop(video_id);
    }

    pub fn get_video_list(&self, key: u64) -> Option<Vec<VideoRecord>> {
        let mut guard = rw_write(&self.video_lists, SOURCE, "get_video_list");
        match guard.get(&key) {
            Some(entry) if entry.fresh(self.ttl) => Some(entry.value.clone()),
            Some(_) => {
                guard.pop(&key);
                None
            }
            None => None,
        }
    }

    pub fn set_video_list(&self, key: u64, records: Vec<VideoRecord>) {
        rw_write(&self.video_lists, SOURCE, "set_video_list").put(key, Stamped::new(records));
    }

    pub fn invalidate_video_lists(&self) {
        rw_write(&self.video_lists, SOURCE, "invalidate_video_lists").clear();
    }

    pub fn get_playlists(&self) -> Option<Vec<PlaylistRecord>> {
        let guard = rw_read(&self.playlists, SOURCE, "get_playlists");
        match guard.as_ref() {
            Some(entry) if entry.fresh(self.ttl) => Some(entry.value.clone()),
            _ => None,
        }
    }

    pub fn set_playlists(&self, records: Vec<PlaylistRecord>) {
        *rw_write(&self.playlists, SOURCE, "set_playlists") = Some(Stamped::new(records));
    }

    /// Drop everything and report how many entries each store held.
    pub fn clear(&self) -> ClearedCounts {
        let mut videos = rw_write(&self.videos_by_id, SOURCE, "clear");
        let mut lists = rw_write(&self.video_lists, SOURCE, "clear");
        let mut playlists = rw_write(&self.playlists, SOURCE, "clear");

        let counts = ClearedCounts {
            videos: videos.len(),
            lists: lists.len(),
            playlists: usize::from(playlists.is_some()),
        };
        videos.clear();
        lists.clear();
        *playlists = None;
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    use crate::domain::entities::VideoStatistics;
    use crate::domain::types::{PrivacyStatus, VideoTier};

    fn sample_video(id: &str) -> VideoRecord {
        VideoRecord {
            video_id: id.to_string(),
            title: format!("video {id}"),
            description: String::new(),
            published_at: OffsetDateTime::UNIX_EPOCH,
            statistics: VideoStatistics::default(),
            duration_seconds: 120,
            privacy: PrivacyStatus::Public,
            tags: Vec::new(),
            playlists: Vec::new(),
            tier: VideoTier::Standard,
            is_short: false,
            last_synced_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn stores_with_ttl(ttl_secs: u64) -> MemoryStores {
        MemoryStores::new(&CacheConfig {
            memory_ttl_secs: ttl_secs,
            ..Default::default()
        })
    }

    #[test]
    fn round_trips_a_video() {
        let stores = stores_with_ttl(300);
        stores.set_video(sample_video("abc"));
        assert_eq!(stores.get_video("abc").map(|v| v.video_id), Some("abc".to_string()));
        assert!(stores.get_video("missing").is_none());
    }

    #[test]
    fn expired_entries_read_as_misses() {
        let stores = stores_with_ttl(0);
        stores.set_video(sample_video("abc"));
        assert!(stores.get_video("abc").is_none());

        stores.set_video_list(7, vec![sample_video("abc")]);
        assert!(stores.get_video_list(7).is_none());
    }

    #[test]
    fn clear_reports_per_store_counts() {
        let stores = stores_with_ttl(300);
        stores.set_video(sample_video("a"));
        stores.set_video(sample_video("b"));
        stores.set_video_list(1, vec![sample_video("a")]);
        stores.set_playlists(Vec::new());

        let counts = stores.clear();
        assert_eq!(counts.videos, 2);
        assert_eq!(counts.lists, 1);
        assert_eq!(counts.playlists, 1);
        assert_eq!(counts.total(), 4);
        assert!(stores.get_video("a").is_none());
    }
}

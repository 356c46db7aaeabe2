//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{
    AuditLogRecord, CacheHistoryRecord, PlaylistRecord, SyncHistoryRecord, SyncStatusRecord,
    VideoRecord, WebSubSubscriptionRecord,
};
use crate::domain::types::{SubscriptionStatus, SyncRunStatus, VideoTier};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct VideoQueryFilter {
    pub tier: Option<VideoTier>,
    pub playlist_id: Option<String>,
    pub search: Option<String>,
}

#[async_trait]
pub trait VideosRepo: Send + Sync {
    /// Insert or update by platform-assigned id. Keyed upserts make
    /// enrichment idempotent under at-least-once webhook delivery.
    async fn upsert_video(&self, record: VideoRecord) -> Result<(), RepoError>;

    async fn find_video(&self, video_id: &str) -> Result<Option<VideoRecord>, RepoError>;

    async fn list_videos(
        &self,
        filter: &VideoQueryFilter,
        limit: u32,
    ) -> Result<Vec<VideoRecord>, RepoError>;

    async fn count_videos(&self, filter: &VideoQueryFilter) -> Result<u64, RepoError>;

    /// Remove videos that still claim membership in `playlist_id` but whose
    /// ids are not in `keep_ids` anymore. Returns the number removed.
    async fn prune_playlist_members(
        &self,
        playlist_id: &str,
        keep_ids: &[String],
    ) -> Result<u64, RepoError>;
}

#[derive(Debug, Clone)]
pub struct PlaylistSyncOutcome {
    pub playlist_id: String,
    pub item_count: i64,
    pub result: SyncRunStatus,
}

#[async_trait]
pub trait PlaylistsRepo: Send + Sync {
    async fn upsert_playlist(&self, record: PlaylistRecord) -> Result<(), RepoError>;

    async fn find_playlist(&self, playlist_id: &str) -> Result<Option<PlaylistRecord>, RepoError>;

    /// Active playlists ordered by item count, largest first. The sync
    /// engine relies on this ordering to bound quota spend early.
    async fn list_active_playlists(&self) -> Result<Vec<PlaylistRecord>, RepoError>;

    async fn mark_sync_outcome(&self, outcome: PlaylistSyncOutcome) -> Result<(), RepoError>;
}

#[async_trait]
pub trait SyncStatusRepo: Send + Sync {
    /// Atomically acquire the singleton sync lease. Returns false when
    /// another run already holds it (unless `forced`).
    async fn try_acquire_lease(&self, forced: bool) -> Result<bool, RepoError>;

    /// Record the playlist currently being synced under the held lease.
    async fn set_current_playlist(&self, playlist_id: Option<&str>) -> Result<(), RepoError>;

    /// Release the lease, recording completion time, the last error if any,
    /// and incrementing the total-syncs counter by `completed_playlists`.
    async fn release_lease(
        &self,
        last_error: Option<&str>,
        completed_playlists: i64,
    ) -> Result<(), RepoError>;

    async fn load_status(&self) -> Result<SyncStatusRecord, RepoError>;
}

#[async_trait]
pub trait SyncHistoryRepo: Send + Sync {
    async fn append_history(&self, record: SyncHistoryRecord) -> Result<(), RepoError>;

    async fn list_recent_history(&self, limit: u32) -> Result<Vec<SyncHistoryRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct SubscriptionUpdate {
    pub channel_id: String,
    pub status: SubscriptionStatus,
    pub last_renewal: Option<OffsetDateTime>,
    /// `None` leaves the persisted expiry untouched; a failed renewal must
    /// never overwrite good data with bad.
    pub expires_at: Option<OffsetDateTime>,
    pub bump_renewal_count: bool,
}

#[async_trait]
pub trait SubscriptionsRepo: Send + Sync {
    async fn upsert_subscription(
        &self,
        record: WebSubSubscriptionRecord,
    ) -> Result<(), RepoError>;

    async fn update_subscription(&self, update: SubscriptionUpdate) -> Result<(), RepoError>;

    async fn find_subscription(
        &self,
        channel_id: &str,
    ) -> Result<Option<WebSubSubscriptionRecord>, RepoError>;

    async fn list_subscriptions(&self) -> Result<Vec<WebSubSubscriptionRecord>, RepoError>;

    /// Active subscriptions whose lease expires before `deadline`.
    async fn list_expiring_before(
        &self,
        deadline: OffsetDateTime,
    ) -> Result<Vec<WebSubSubscriptionRecord>, RepoError>;
}

#[async_trait]
pub trait CacheHistoryRepo: Send + Sync {
    async fn append_cache_history(&self, record: CacheHistoryRecord) -> Result<(), RepoError>;

    async fn list_recent_cache_history(
        &self,
        limit: u32,
    ) -> Result<Vec<CacheHistoryRecord>, RepoError>;
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
    async fn append_log(&self, record: AuditLogRecord) -> Result<(), RepoError>;

    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditLogRecord>, RepoError>;
}

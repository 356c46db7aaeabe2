//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{PrivacyStatus, SubscriptionStatus, SyncRunStatus, VideoTier};

/// A video's engagement counters as reported by the upstream platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct VideoStatistics {
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
}

/// One synchronized video. Uniqueness is enforced by the platform-assigned
/// `video_id`; duplicates are reconciled by keeping the most recently synced
/// copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub published_at: OffsetDateTime,
    pub statistics: VideoStatistics,
    pub duration_seconds: i64,
    pub privacy: PrivacyStatus,
    pub tags: Vec<String>,
    pub playlists: Vec<String>,
    pub tier: VideoTier,
    pub is_short: bool,
    pub last_synced_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistRecord {
    pub playlist_id: String,
    pub title: String,
    pub slug: String,
    pub item_count: i64,
    pub is_active: bool,
    pub sync_in_progress: bool,
    pub last_sync_result: Option<SyncRunStatus>,
    pub updated_at: OffsetDateTime,
}

/// Singleton sync lease, persisted under a fixed key so it serializes
/// "sync all" runs across server instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStatusRecord {
    pub currently_syncing: bool,
    pub current_playlist_id: Option<String>,
    pub last_sync: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    pub total_syncs: i64,
}

/// Append-only record of one playlist-sync attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncHistoryRecord {
    pub id: Uuid,
    pub playlist_id: String,
    pub status: SyncRunStatus,
    pub videos_added: i64,
    pub videos_updated: i64,
    pub videos_removed: i64,
    pub duration_ms: i64,
    pub error: Option<String>,
    pub created_at: OffsetDateTime,
}

/// WebSub lease state for one upstream channel. `expires_at` is only
/// meaningful while `status` is `Active`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebSubSubscriptionRecord {
    pub channel_id: String,
    pub webhook_url: String,
    pub status: SubscriptionStatus,
    pub last_renewal: Option<OffsetDateTime>,
    pub expires_at: Option<OffsetDateTime>,
    pub renewal_count: i64,
}

/// Append-only audit row for cache clear/purge operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHistoryRecord {
    pub id: Uuid,
    pub cache_type: String,
    pub action: String,
    pub item_count: i64,
    pub created_at: OffsetDateTime,
}

/// Append-only activity log row for admin-triggered operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLogRecord {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub metadata: serde_json::Value,
    pub created_at: OffsetDateTime,
}

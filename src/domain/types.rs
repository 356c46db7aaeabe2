//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

/// Popularity/freshness segment assigned to a video by the tier classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "video_tier", rename_all = "kebab-case")]
pub enum VideoTier {
    ViralShort,
    PopularShort,
    Hot,
    Trending,
    Recent,
    Evergreen,
    Archive,
    Standard,
}

impl VideoTier {
    pub fn as_str(self) -> &'static str {
        match self {
            VideoTier::ViralShort => "viral-short",
            VideoTier::PopularShort => "popular-short",
            VideoTier::Hot => "hot",
            VideoTier::Trending => "trending",
            VideoTier::Recent => "recent",
            VideoTier::Evergreen => "evergreen",
            VideoTier::Archive => "archive",
            VideoTier::Standard => "standard",
        }
    }
}

/// Upload/privacy status reported by the upstream platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "privacy_status", rename_all = "snake_case")]
pub enum PrivacyStatus {
    Public,
    Unlisted,
    Private,
}

/// WebSub subscription lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Expired,
    Failed,
}

/// Outcome of a single playlist-sync attempt, persisted in sync history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "sync_run_status", rename_all = "snake_case")]
pub enum SyncRunStatus {
    Success,
    Failed,
}

/// Cache subsystem named in a cache-history audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Memory,
    Cdn,
    Pages,
    Pagination,
}

impl CacheKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheKind::Memory => "memory",
            CacheKind::Cdn => "cdn",
            CacheKind::Pages => "pages",
            CacheKind::Pagination => "pagination",
        }
    }
}

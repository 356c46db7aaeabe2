use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;

use crate::{
    application::repos::{RepoError, VideoQueryFilter, VideosRepo},
    domain::entities::{VideoRecord, VideoStatistics},
    domain::types::{PrivacyStatus, VideoTier},
};

use super::{PostgresRepositories, map_sqlx_error};

const VIDEO_COLUMNS: &str = "video_id, title, description, published_at, view_count, \
     like_count, comment_count, duration_seconds, privacy, tags, playlists, tier, \
     is_short, last_synced_at";

#[derive(sqlx::FromRow)]
struct VideoRow {
    video_id: String,
    title: String,
    description: String,
    published_at: OffsetDateTime,
    view_count: i64,
    like_count: i64,
    comment_count: i64,
    duration_seconds: i64,
    privacy: PrivacyStatus,
    tags: Vec<String>,
    playlists: Vec<String>,
    tier: VideoTier,
    is_short: bool,
    last_synced_at: OffsetDateTime,
}

impl From<VideoRow> for VideoRecord {
    fn from(row: VideoRow) -> Self {
        Self {
            video_id: row.video_id,
            title: row.title,
            description: row.description,
            published_at: row.published_at,
            statistics: VideoStatistics {
                view_count: row.view_count.max(0) as u64,
                like_count: row.like_count.max(0) as u64,
                comment_count: row.comment_count.max(0) as u64,
            },
            duration_seconds: row.duration_seconds,
            privacy: row.privacy,
            tags: row.tags,
            playlists: row.playlists,
            tier: row.tier,
            is_short: row.is_short,
            last_synced_at: row.last_synced_at,
        }
    }
}

fn signed_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl VideosRepo for PostgresRepositories {
    async fn upsert_video(&self, record: VideoRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO videos (video_id, title, description, published_at, view_count,
                like_count, comment_count, duration_seconds, privacy, tags, playlists,
                tier, is_short, last_synced_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (video_id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                published_at = EXCLUDED.published_at,
                view_count = EXCLUDED.view_count,
                like_count = EXCLUDED.like_count,
                comment_count = EXCLUDED.comment_count,
                duration_seconds = EXCLUDED.duration_seconds,
                privacy = EXCLUDED.privacy,
                tags = EXCLUDED.tags,
                playlists = EXCLUDED.playlists,
                tier = EXCLUDED.tier,
                is_short = EXCLUDED.is_short,
                last_synced_at = EXCLUDED.last_synced_at
            "#,
        )
        .bind(&record.video_id)
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.published_at)
        .bind(signed_count(record.statistics.view_count))
        .bind(signed_count(record.statistics.like_count))
        .bind(signed_count(record.statistics.comment_count))
        .bind(record.duration_seconds)
        .bind(record.privacy)
        .bind(&record.tags)
        .bind(&record.playlists)
        .bind(record.tier)
        .bind(record.is_short)
        .bind(record.last_synced_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_video(&self, video_id: &str) -> Result<Option<VideoRecord>, RepoError> {
        let row = sqlx::query_as::<_, VideoRow>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE video_id = $1"
        ))
        .bind(video_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(VideoRecord::from))
    }

    async fn list_videos(
        &self,
        filter: &VideoQueryFilter,
        limit: u32,
    ) -> Result<Vec<VideoRecord>, RepoError> {
        let limit = limit.clamp(1, 500);
        let mut qb = QueryBuilder::new(format!(
            "SELECT {VIDEO_COLUMNS} FROM videos v WHERE 1=1 "
        ));
        Self::apply_video_filter(&mut qb, filter);
        qb.push(" ORDER BY v.published_at DESC, v.video_id LIMIT ");
        qb.push_bind(limit as i64);

        let rows = qb
            .build_query_as::<VideoRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(VideoRecord::from).collect())
    }

    async fn count_videos(&self, filter: &VideoQueryFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM videos v WHERE 1=1 ");
        Self::apply_video_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn prune_playlist_members(
        &self,
        playlist_id: &str,
        keep_ids: &[String],
    ) -> Result<u64, RepoError> {
        // Membership is dropped, not the video row: a video enriched through
        // a webhook legitimately carries an empty playlist set.
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET playlists = array_remove(playlists, $1)
            WHERE $1 = ANY(playlists) AND NOT (video_id = ANY($2))
            "#,
        )
        .bind(playlist_id)
        .bind(keep_ids)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

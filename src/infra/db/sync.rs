use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{RepoError, SyncHistoryRepo, SyncStatusRepo},
    domain::entities::{SyncHistoryRecord, SyncStatusRecord},
    domain::types::SyncRunStatus,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SyncStatusRow {
    currently_syncing: bool,
    current_playlist_id: Option<String>,
    last_sync: Option<OffsetDateTime>,
    last_error: Option<String>,
    total_syncs: i64,
}

impl From<SyncStatusRow> for SyncStatusRecord {
    fn from(row: SyncStatusRow) -> Self {
        Self {
            currently_syncing: row.currently_syncing,
            current_playlist_id: row.current_playlist_id,
            last_sync: row.last_sync,
            last_error: row.last_error,
            total_syncs: row.total_syncs,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SyncHistoryRow {
    id: Uuid,
    playlist_id: String,
    status: SyncRunStatus,
    videos_added: i64,
    videos_updated: i64,
    videos_removed: i64,
    duration_ms: i64,
    error: Option<String>,
    created_at: OffsetDateTime,
}

impl From<SyncHistoryRow> for SyncHistoryRecord {
    fn from(row: SyncHistoryRow) -> Self {
        Self {
            id: row.id,
            playlist_id: row.playlist_id,
            status: row.status,
            videos_added: row.videos_added,
            videos_updated: row.videos_updated,
            videos_removed: row.videos_removed,
            duration_ms: row.duration_ms,
            error: row.error,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl SyncStatusRepo for PostgresRepositories {
    async fn try_acquire_lease(&self, forced: bool) -> Result<bool, RepoError> {
        // Single-row conditional update; the WHERE clause makes acquisition
        // atomic across server instances.
        let result = sqlx::query(
            r#"
            UPDATE sync_status
            SET currently_syncing = TRUE,
                current_playlist_id = NULL,
                last_error = NULL
            WHERE singleton AND (NOT currently_syncing OR $1)
            "#,
        )
        .bind(forced)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_current_playlist(&self, playlist_id: Option<&str>) -> Result<(), RepoError> {
        sqlx::query("UPDATE sync_status SET current_playlist_id = $1 WHERE singleton")
            .bind(playlist_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn release_lease(
        &self,
        last_error: Option<&str>,
        completed_playlists: i64,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            UPDATE sync_status
            SET currently_syncing = FALSE,
                current_playlist_id = NULL,
                last_sync = now(),
                last_error = $1,
                total_syncs = total_syncs + $2
            WHERE singleton
            "#,
        )
        .bind(last_error)
        .bind(completed_playlists)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn load_status(&self) -> Result<SyncStatusRecord, RepoError> {
        let row = sqlx::query_as::<_, SyncStatusRow>(
            "SELECT currently_syncing, current_playlist_id, last_sync, last_error, \
             total_syncs FROM sync_status WHERE singleton",
        )
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}

#[async_trait]
impl SyncHistoryRepo for PostgresRepositories {
    async fn append_history(&self, record: SyncHistoryRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO sync_history (id, playlist_id, status, videos_added,
                videos_updated, videos_removed, duration_ms, error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(&record.playlist_id)
        .bind(record.status)
        .bind(record.videos_added)
        .bind(record.videos_updated)
        .bind(record.videos_removed)
        .bind(record.duration_ms)
        .bind(&record.error)
        .bind(record.created_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_recent_history(&self, limit: u32) -> Result<Vec<SyncHistoryRecord>, RepoError> {
        let limit = limit.clamp(1, 200);
        let rows = sqlx::query_as::<_, SyncHistoryRow>(
            "SELECT id, playlist_id, status, videos_added, videos_updated, \
             videos_removed, duration_ms, error, created_at FROM sync_history \
             ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SyncHistoryRecord::from).collect())
    }
}

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{PlaylistSyncOutcome, PlaylistsRepo, RepoError},
    domain::entities::PlaylistRecord,
    domain::types::SyncRunStatus,
};

use super::{PostgresRepositories, map_sqlx_error};

const PLAYLIST_COLUMNS: &str = "playlist_id, title, slug, item_count, is_active, \
     sync_in_progress, last_sync_result, updated_at";

#[derive(sqlx::FromRow)]
struct PlaylistRow {
    playlist_id: String,
    title: String,
    slug: String,
    item_count: i64,
    is_active: bool,
    sync_in_progress: bool,
    last_sync_result: Option<SyncRunStatus>,
    updated_at: OffsetDateTime,
}

impl From<PlaylistRow> for PlaylistRecord {
    fn from(row: PlaylistRow) -> Self {
        Self {
            playlist_id: row.playlist_id,
            title: row.title,
            slug: row.slug,
            item_count: row.item_count,
            is_active: row.is_active,
            sync_in_progress: row.sync_in_progress,
            last_sync_result: row.last_sync_result,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl PlaylistsRepo for PostgresRepositories {
    async fn upsert_playlist(&self, record: PlaylistRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO playlists (playlist_id, title, slug, item_count, is_active,
                sync_in_progress, last_sync_result, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (playlist_id) DO UPDATE SET
                title = EXCLUDED.title,
                slug = EXCLUDED.slug,
                item_count = EXCLUDED.item_count,
                is_active = EXCLUDED.is_active,
                sync_in_progress = EXCLUDED.sync_in_progress,
                last_sync_result = EXCLUDED.last_sync_result,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.playlist_id)
        .bind(&record.title)
        .bind(&record.slug)
        .bind(record.item_count)
        .bind(record.is_active)
        .bind(record.sync_in_progress)
        .bind(record.last_sync_result)
        .bind(record.updated_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_playlist(&self, playlist_id: &str) -> Result<Option<PlaylistRecord>, RepoError> {
        let row = sqlx::query_as::<_, PlaylistRow>(&format!(
            "SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE playlist_id = $1"
        ))
        .bind(playlist_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PlaylistRecord::from))
    }

    async fn list_active_playlists(&self) -> Result<Vec<PlaylistRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PlaylistRow>(&format!(
            "SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE is_active \
             ORDER BY item_count DESC, playlist_id"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PlaylistRecord::from).collect())
    }

    async fn mark_sync_outcome(&self, outcome: PlaylistSyncOutcome) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            UPDATE playlists
            SET item_count = $2,
                sync_in_progress = FALSE,
                last_sync_result = $3,
                updated_at = now()
            WHERE playlist_id = $1
            "#,
        )
        .bind(&outcome.playlist_id)
        .bind(outcome.item_count)
        .bind(outcome.result)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

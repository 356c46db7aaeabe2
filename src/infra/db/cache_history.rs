use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CacheHistoryRepo, RepoError},
    domain::entities::CacheHistoryRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CacheHistoryRow {
    id: Uuid,
    cache_type: String,
    action: String,
    item_count: i64,
    created_at: OffsetDateTime,
}

impl From<CacheHistoryRow> for CacheHistoryRecord {
    fn from(row: CacheHistoryRow) -> Self {
        Self {
            id: row.id,
            cache_type: row.cache_type,
            action: row.action,
            item_count: row.item_count,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CacheHistoryRepo for PostgresRepositories {
    async fn append_cache_history(&self, record: CacheHistoryRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO cache_history (id, cache_type, action, item_count, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id)
        .bind(&record.cache_type)
        .bind(&record.action)
        .bind(record.item_count)
        .bind(record.created_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_recent_cache_history(
        &self,
        limit: u32,
    ) -> Result<Vec<CacheHistoryRecord>, RepoError> {
        let limit = limit.clamp(1, 200);
        let rows = sqlx::query_as::<_, CacheHistoryRow>(
            "SELECT id, cache_type, action, item_count, created_at FROM cache_history \
             ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CacheHistoryRecord::from).collect())
    }
}

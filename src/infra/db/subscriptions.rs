use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{RepoError, SubscriptionUpdate, SubscriptionsRepo},
    domain::entities::WebSubSubscriptionRecord,
    domain::types::SubscriptionStatus,
};

use super::{PostgresRepositories, map_sqlx_error};

const SUBSCRIPTION_COLUMNS: &str = "channel_id, webhook_url, status, last_renewal, \
     expires_at, renewal_count";

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    channel_id: String,
    webhook_url: String,
    status: SubscriptionStatus,
    last_renewal: Option<OffsetDateTime>,
    expires_at: Option<OffsetDateTime>,
    renewal_count: i64,
}

impl From<SubscriptionRow> for WebSubSubscriptionRecord {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            channel_id: row.channel_id,
            webhook_url: row.webhook_url,
            status: row.status,
            last_renewal: row.last_renewal,
            expires_at: row.expires_at,
            renewal_count: row.renewal_count,
        }
    }
}

#[async_trait]
impl SubscriptionsRepo for PostgresRepositories {
    async fn upsert_subscription(
        &self,
        record: WebSubSubscriptionRecord,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO websub_subscriptions (channel_id, webhook_url, status,
                last_renewal, expires_at, renewal_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (channel_id) DO UPDATE SET
                webhook_url = EXCLUDED.webhook_url,
                status = EXCLUDED.status,
                last_renewal = EXCLUDED.last_renewal,
                expires_at = EXCLUDED.expires_at,
                renewal_count = EXCLUDED.renewal_count
            "#,
        )
        .bind(&record.channel_id)
        .bind(&record.webhook_url)
        .bind(record.status)
        .bind(record.last_renewal)
        .bind(record.expires_at)
        .bind(record.renewal_count)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_subscription(&self, update: SubscriptionUpdate) -> Result<(), RepoError> {
        // COALESCE keeps the stored expiry when the update carries none, so
        // a failed renewal cannot clobber a still-valid lease window.
        let result = sqlx::query(
            r#"
            UPDATE websub_subscriptions
            SET status = $2,
                last_renewal = COALESCE($3, last_renewal),
                expires_at = COALESCE($4, expires_at),
                renewal_count = renewal_count + $5
            WHERE channel_id = $1
            "#,
        )
        .bind(&update.channel_id)
        .bind(update.status)
        .bind(update.last_renewal)
        .bind(update.expires_at)
        .bind(if update.bump_renewal_count { 1_i64 } else { 0 })
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn find_subscription(
        &self,
        channel_id: &str,
    ) -> Result<Option<WebSubSubscriptionRecord>, RepoError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM websub_subscriptions WHERE channel_id = $1"
        ))
        .bind(channel_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(WebSubSubscriptionRecord::from))
    }

    async fn list_subscriptions(&self) -> Result<Vec<WebSubSubscriptionRecord>, RepoError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM websub_subscriptions ORDER BY channel_id"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(WebSubSubscriptionRecord::from).collect())
    }

    async fn list_expiring_before(
        &self,
        deadline: OffsetDateTime,
    ) -> Result<Vec<WebSubSubscriptionRecord>, RepoError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM websub_subscriptions \
             WHERE status = $1 AND expires_at IS NOT NULL AND expires_at < $2 \
             ORDER BY expires_at"
        ))
        .bind(SubscriptionStatus::Active)
        .bind(deadline)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(WebSubSubscriptionRecord::from).collect())
    }
}

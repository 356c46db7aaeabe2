//! Activity log for privileged operations.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::application::repos::{AuditRepo, RepoError};
use crate::domain::entities::AuditLogRecord;

pub struct AuditService {
    repo: Arc<dyn AuditRepo>,
}

impl AuditService {
    pub fn new(repo: Arc<dyn AuditRepo>) -> Self {
        Self { repo }
    }

    /// Best-effort append; the audited operation must not fail because the
    /// log write did.
    pub async fn record(&self, actor: &str, action: &str, metadata: serde_json::Value) {
        let record = AuditLogRecord {
            id: Uuid::new_v4(),
            actor: actor.to_string(),
            action: action.to_string(),
            metadata,
            created_at: OffsetDateTime::now_utc(),
        };
        if let Err(err) = self.repo.append_log(record).await {
            warn!(
                target = "vodsync::audit",
                actor,
                action,
                error = %err,
                "Failed to append audit log"
            );
        }
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<AuditLogRecord>, RepoError> {
        self.repo.list_recent(limit).await
    }
}

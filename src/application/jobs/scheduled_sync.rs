//! Cron job running a full catalog sync on a fixed cadence.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::*;
use apalis_cron::Schedule;

use crate::application::sync::{SyncEngine, SyncError};

/// Marker struct for the cron-triggered sync job.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct ScheduledSyncJob;

impl From<chrono::DateTime<chrono::Utc>> for ScheduledSyncJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct ScheduledSyncContext {
    pub engine: Arc<SyncEngine>,
}

pub async fn process_scheduled_sync_job(
    _job: ScheduledSyncJob,
    ctx: Data<ScheduledSyncContext>,
) -> Result<(), apalis::prelude::Error> {
    match ctx.engine.sync_all(false).await {
        Ok(report) => {
            tracing::info!(
                playlists_completed = report.playlists_completed,
                playlists_failed = report.playlists_failed,
                "Scheduled sync finished"
            );
        }
        Err(SyncError::AlreadyRunning) => {
            tracing::info!("Scheduled sync skipped, another run holds the lease");
        }
        Err(err) => {
            tracing::warn!(error = %err, "Scheduled sync failed");
        }
    }
    Ok(())
}

/// Parse the configured cron expression, falling back to every six hours.
pub fn scheduled_sync_schedule(expression: &str) -> Schedule {
    Schedule::from_str(expression).unwrap_or_else(|_| {
        tracing::warn!(expression, "Invalid sync cron expression, using default");
        Schedule::from_str("0 0 */6 * * *").expect("Invalid default sync cron expression")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_parses() {
        let schedule = scheduled_sync_schedule("0 0 */6 * * *");
        let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(3).collect();
        assert_eq!(upcoming.len(), 3);
    }

    #[test]
    fn invalid_expression_falls_back() {
        let schedule = scheduled_sync_schedule("not a cron line");
        assert!(schedule.upcoming(chrono::Utc).next().is_some());
    }
}

//! Cron job reconciling stored playlist item counts with actual membership.
//!
//! Webhook-driven enrichment can drift `item_count` away from the number of
//! videos that really claim membership; this sweep repairs the drift.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::*;
use apalis_cron::Schedule;

use crate::application::repos::{PlaylistsRepo, VideoQueryFilter, VideosRepo};

#[derive(Default, Debug, Clone)]
pub struct ReconcilePlaylistCountsJob;

impl From<chrono::DateTime<chrono::Utc>> for ReconcilePlaylistCountsJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct ReconcileContext {
    pub playlists: Arc<dyn PlaylistsRepo>,
    pub videos: Arc<dyn VideosRepo>,
}

pub async fn process_reconcile_job(
    _job: ReconcilePlaylistCountsJob,
    ctx: Data<ReconcileContext>,
) -> Result<(), apalis::prelude::Error> {
    let playlists = match ctx.playlists.list_active_playlists().await {
        Ok(playlists) => playlists,
        Err(err) => {
            tracing::warn!(error = %err, "Count reconciliation could not list playlists");
            return Ok(());
        }
    };

    let mut repaired = 0u64;
    for mut playlist in playlists {
        let filter = VideoQueryFilter {
            playlist_id: Some(playlist.playlist_id.clone()),
            ..Default::default()
        };
        let actual = match ctx.videos.count_videos(&filter).await {
            Ok(count) => count as i64,
            Err(err) => {
                tracing::warn!(
                    playlist_id = %playlist.playlist_id,
                    error = %err,
                    "Count reconciliation skipped a playlist"
                );
                continue;
            }
        };

        if playlist.item_count != actual {
            tracing::info!(
                playlist_id = %playlist.playlist_id,
                stored = playlist.item_count,
                actual,
                "Repairing drifted playlist item count"
            );
            playlist.item_count = actual;
            if let Err(err) = ctx.playlists.upsert_playlist(playlist).await {
                tracing::warn!(error = %err, "Failed to write repaired playlist count");
                continue;
            }
            repaired += 1;
        }
    }

    if repaired > 0 {
        tracing::info!(repaired, "Playlist count reconciliation finished");
    }
    Ok(())
}

/// Runs daily at 03:30 UTC.
pub fn reconcile_schedule() -> Schedule {
    Schedule::from_str("0 30 3 * * *").expect("Invalid cron expression for reconciliation")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_parses_correctly() {
        let upcoming: Vec<_> = reconcile_schedule().upcoming(chrono::Utc).take(3).collect();
        assert_eq!(upcoming.len(), 3);
    }
}

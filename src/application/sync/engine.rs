//! Full-catalog sync engine.
//!
//! One run at a time, serialized through the persisted sync lease. Playlists
//! are walked sequentially, largest first, and each playlist's outcome is
//! recorded in sync history whether it succeeded or not. A playlist failure
//! never aborts the remaining playlists.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::repos::{
    PlaylistSyncOutcome, PlaylistsRepo, RepoError, SyncHistoryRepo, SyncStatusRepo, VideosRepo,
};
use crate::application::retry::{RetryPolicy, retry_transient};
use crate::domain::entities::{SyncHistoryRecord, VideoRecord};
use crate::domain::tier::{self, TierInput};
use crate::domain::types::SyncRunStatus;
use crate::infra::platform::{UpstreamError, VideoDetails, VideoPlatform};

use super::membership::{MembershipIndex, MembershipIndexBuilder};

/// Videos whose runtime is at or under this are treated as short-form.
const SHORT_FORM_MAX_SECONDS: i64 = 60;

/// Details batch size accepted by the platform's videos endpoint.
const DETAILS_BATCH_SIZE: usize = 50;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync run is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Aggregate report for one full sync run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncReport {
    pub playlists_completed: u64,
    pub playlists_failed: u64,
    pub videos_added: i64,
    pub videos_updated: i64,
    pub videos_removed: i64,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Report for a lease-independent enrichment pass.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EnrichReport {
    pub videos_added: i64,
    pub videos_updated: i64,
}

#[derive(Debug, Default)]
struct PlaylistCounts {
    added: i64,
    updated: i64,
    removed: i64,
    item_count: i64,
}

pub struct SyncEngine {
    videos: Arc<dyn VideosRepo>,
    playlists: Arc<dyn PlaylistsRepo>,
    status: Arc<dyn SyncStatusRepo>,
    history: Arc<dyn SyncHistoryRepo>,
    platform: Arc<dyn VideoPlatform>,
    membership: MembershipIndexBuilder,
    policy: RetryPolicy,
    cancel_requested: AtomicBool,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        videos: Arc<dyn VideosRepo>,
        playlists: Arc<dyn PlaylistsRepo>,
        status: Arc<dyn SyncStatusRepo>,
        history: Arc<dyn SyncHistoryRepo>,
        platform: Arc<dyn VideoPlatform>,
        membership: MembershipIndexBuilder,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            videos,
            playlists,
            status,
            history,
            platform,
            membership,
            policy,
            cancel_requested: AtomicBool::new(false),
        }
    }

    /// Ask a running sync to stop. Takes effect between playlists; the
    /// playlist currently in flight finishes normally.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    /// Run a full sync across every active playlist. Acquires the persisted
    /// lease first; a concurrent run surfaces as [`SyncError::AlreadyRunning`]
    /// unless `forced`.
    pub async fn sync_all(&self, forced: bool) -> Result<SyncReport, SyncError> {
        if !self.status.try_acquire_lease(forced).await? {
            return Err(SyncError::AlreadyRunning);
        }
        self.cancel_requested.store(false, Ordering::SeqCst);
        counter!("vodsync_sync_runs_total").increment(1);

        let started = Instant::now();
        let run = self.run_under_lease().await;

        // The lease is always released, even when the run body failed.
        match run {
            Ok(mut report) => {
                self.status
                    .release_lease(None, report.playlists_completed as i64)
                    .await?;
                report.duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    target = "vodsync::sync::engine",
                    playlists_completed = report.playlists_completed,
                    playlists_failed = report.playlists_failed,
                    videos_added = report.videos_added,
                    videos_updated = report.videos_updated,
                    videos_removed = report.videos_removed,
                    cancelled = report.cancelled,
                    duration_ms = report.duration_ms,
                    "Full sync finished"
                );
                Ok(report)
            }
            Err(err) => {
                error!(target = "vodsync::sync::engine", error = %err, "Sync run aborted");
                self.status.release_lease(Some(&err.to_string()), 0).await?;
                Err(err)
            }
        }
    }

    async fn run_under_lease(&self) -> Result<SyncReport, SyncError> {
        let playlists = self.playlists.list_active_playlists().await?;
        let playlist_ids: Vec<String> =
            playlists.iter().map(|p| p.playlist_id.clone()).collect();
        let index = self.membership.build(&playlist_ids).await;

        let mut report = SyncReport::default();

        for playlist in &playlists {
            if self.cancel_requested.load(Ordering::SeqCst) {
                info!(
                    target = "vodsync::sync::engine",
                    remaining = playlists.len() as u64 - report.playlists_completed - report.playlists_failed,
                    "Cancellation requested, stopping before next playlist"
                );
                report.cancelled = true;
                break;
            }

            self.status
                .set_current_playlist(Some(&playlist.playlist_id))
                .await?;

            let playlist_started = Instant::now();
            let outcome = self.sync_playlist(&playlist.playlist_id, &index).await;
            let elapsed_ms = playlist_started.elapsed().as_millis() as i64;
            histogram!("vodsync_sync_playlist_ms").record(elapsed_ms as f64);

            match outcome {
                Ok(counts) => {
                    report.playlists_completed += 1;
                    report.videos_added += counts.added;
                    report.videos_updated += counts.updated;
                    report.videos_removed += counts.removed;

                    self.append_history(
                        &playlist.playlist_id,
                        SyncRunStatus::Success,
                        &counts,
                        elapsed_ms,
                        None,
                    )
                    .await;
                    self.playlists
                        .mark_sync_outcome(PlaylistSyncOutcome {
                            playlist_id: playlist.playlist_id.clone(),
                            item_count: counts.item_count,
                            result: SyncRunStatus::Success,
                        })
                        .await?;
                }
                Err(err) => {
                    warn!(
                        target = "vodsync::sync::engine",
                        playlist_id = %playlist.playlist_id,
                        error = %err,
                        "Playlist sync failed, continuing with remaining playlists"
                    );
                    report.playlists_failed += 1;

                    self.append_history(
                        &playlist.playlist_id,
                        SyncRunStatus::Failed,
                        &PlaylistCounts::default(),
                        elapsed_ms,
                        Some(err.to_string()),
                    )
                    .await;
                    self.playlists
                        .mark_sync_outcome(PlaylistSyncOutcome {
                            playlist_id: playlist.playlist_id.clone(),
                            item_count: playlist.item_count,
                            result: SyncRunStatus::Failed,
                        })
                        .await?;
                }
            }
        }

        self.status.set_current_playlist(None).await?;
        Ok(report)
    }

    async fn sync_playlist(
        &self,
        playlist_id: &str,
        index: &MembershipIndex,
    ) -> Result<PlaylistCounts, SyncError> {
        let member_ids: Vec<String> = index
            .videos_in(playlist_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut counts = PlaylistCounts {
            item_count: member_ids.len() as i64,
            ..Default::default()
        };

        for batch in member_ids.chunks(DETAILS_BATCH_SIZE) {
            let details = retry_transient("video_details_batch", self.policy, || {
                let batch = batch.to_vec();
                async move { self.platform.fetch_video_details(&batch).await }
            })
            .await?;

            for detail in details {
                let existed = self.videos.find_video(&detail.video_id).await?.is_some();
                let record = self.build_record(detail, index);
                self.videos.upsert_video(record).await?;
                if existed {
                    counts.updated += 1;
                } else {
                    counts.added += 1;
                }
            }
        }

        counts.removed = self
            .videos
            .prune_playlist_members(playlist_id, &member_ids)
            .await? as i64;

        Ok(counts)
    }

    /// Lease-independent enrichment of specific videos, driven by webhook
    /// notifications. Membership is recomputed from the active playlists
    /// because the platform cannot answer "which playlists carry this video"
    /// directly.
    pub async fn enrich(&self, video_ids: &[String]) -> Result<EnrichReport, SyncError> {
        if video_ids.is_empty() {
            return Ok(EnrichReport::default());
        }

        let playlists = self.playlists.list_active_playlists().await?;
        let playlist_ids: Vec<String> =
            playlists.iter().map(|p| p.playlist_id.clone()).collect();
        let index = self.membership.build(&playlist_ids).await;

        let mut report = EnrichReport::default();

        for batch in video_ids.chunks(DETAILS_BATCH_SIZE) {
            let details = retry_transient("video_details_batch", self.policy, || {
                let batch = batch.to_vec();
                async move { self.platform.fetch_video_details(&batch).await }
            })
            .await?;

            for detail in details {
                let existed = self.videos.find_video(&detail.video_id).await?.is_some();
                let record = self.build_record(detail, &index);
                self.videos.upsert_video(record).await?;
                if existed {
                    report.videos_updated += 1;
                } else {
                    report.videos_added += 1;
                }
            }
        }

        Ok(report)
    }

    fn build_record(&self, detail: VideoDetails, index: &MembershipIndex) -> VideoRecord {
        let is_short = detail.duration_seconds <= SHORT_FORM_MAX_SECONDS;
        let engagement_rate = engagement_rate(&detail);
        let tier = tier::classify(TierInput {
            view_count: detail.statistics.view_count,
            published_at: detail.published_at,
            is_short,
            engagement_rate,
        });

        VideoRecord {
            playlists: index.playlists_for(&detail.video_id),
            video_id: detail.video_id,
            title: detail.title,
            description: detail.description,
            published_at: detail.published_at,
            statistics: detail.statistics,
            duration_seconds: detail.duration_seconds,
            privacy: detail.privacy,
            tags: detail.tags,
            tier,
            is_short,
            last_synced_at: OffsetDateTime::now_utc(),
        }
    }

    async fn append_history(
        &self,
        playlist_id: &str,
        status: SyncRunStatus,
        counts: &PlaylistCounts,
        duration_ms: i64,
        error: Option<String>,
    ) {
        let record = SyncHistoryRecord {
            id: Uuid::new_v4(),
            playlist_id: playlist_id.to_string(),
            status,
            videos_added: counts.added,
            videos_updated: counts.updated,
            videos_removed: counts.removed,
            duration_ms,
            error,
            created_at: OffsetDateTime::now_utc(),
        };
        // History is an audit trail; failing to write it must not fail the run.
        if let Err(err) = self.history.append_history(record).await {
            warn!(
                target = "vodsync::sync::engine",
                playlist_id,
                error = %err,
                "Failed to append sync history"
            );
        }
    }
}

fn engagement_rate(detail: &VideoDetails) -> Option<f64> {
    if detail.statistics.view_count == 0 {
        return None;
    }
    let interactions =
        (detail.statistics.like_count + detail.statistics.comment_count) as f64;
    Some(interactions / detail.statistics.view_count as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::application::repos::VideoQueryFilter;
    use crate::domain::entities::{PlaylistRecord, SyncStatusRecord, VideoStatistics};
    use crate::domain::types::PrivacyStatus;
    use crate::infra::platform::PlaylistItemsPage;

    #[derive(Default)]
    struct FakeVideos {
        rows: Mutex<HashMap<String, VideoRecord>>,
    }

    #[async_trait]
    impl VideosRepo for FakeVideos {
        async fn upsert_video(&self, record: VideoRecord) -> Result<(), RepoError> {
            self.rows
                .lock()
                .unwrap()
                .insert(record.video_id.clone(), record);
            Ok(())
        }

        async fn find_video(&self, video_id: &str) -> Result<Option<VideoRecord>, RepoError> {
            Ok(self.rows.lock().unwrap().get(video_id).cloned())
        }

        async fn list_videos(
            &self,
            _filter: &VideoQueryFilter,
            _limit: u32,
        ) -> Result<Vec<VideoRecord>, RepoError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }

        async fn count_videos(&self, _filter: &VideoQueryFilter) -> Result<u64, RepoError> {
            Ok(self.rows.lock().unwrap().len() as u64)
        }

        async fn prune_playlist_members(
            &self,
            playlist_id: &str,
            keep_ids: &[String],
        ) -> Result<u64, RepoError> {
            let mut removed = 0;
            for record in self.rows.lock().unwrap().values_mut() {
                if record.playlists.iter().any(|p| p == playlist_id)
                    && !keep_ids.contains(&record.video_id)
                {
                    record.playlists.retain(|p| p != playlist_id);
                    removed += 1;
                }
            }
            Ok(removed)
        }
    }

    #[derive(Default)]
    struct FakePlaylists {
        active: Vec<PlaylistRecord>,
        outcomes: Mutex<Vec<PlaylistSyncOutcome>>,
    }

    #[async_trait]
    impl PlaylistsRepo for FakePlaylists {
        async fn upsert_playlist(&self, _record: PlaylistRecord) -> Result<(), RepoError> {
            Ok(())
        }

        async fn find_playlist(
            &self,
            playlist_id: &str,
        ) -> Result<Option<PlaylistRecord>, RepoError> {
            Ok(self
                .active
                .iter()
                .find(|p| p.playlist_id == playlist_id)
                .cloned())
        }

        async fn list_active_playlists(&self) -> Result<Vec<PlaylistRecord>, RepoError> {
            Ok(self.active.clone())
        }

        async fn mark_sync_outcome(&self, outcome: PlaylistSyncOutcome) -> Result<(), RepoError> {
            self.outcomes.lock().unwrap().push(outcome);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStatus {
        state: Mutex<SyncStatusRecord>,
        cancel_on_first_playlist: Mutex<Option<Arc<SyncEngine>>>,
    }

    #[async_trait]
    impl SyncStatusRepo for FakeStatus {
        async fn try_acquire_lease(&self, forced: bool) -> Result<bool, RepoError> {
            let mut state = self.state.lock().unwrap();
            if state.currently_syncing && !forced {
                return Ok(false);
            }
            state.currently_syncing = true;
            state.last_error = None;
            Ok(true)
        }

        async fn set_current_playlist(&self, playlist_id: Option<&str>) -> Result<(), RepoError> {
            self.state.lock().unwrap().current_playlist_id = playlist_id.map(str::to_string);
            if playlist_id.is_some() {
                if let Some(engine) = self.cancel_on_first_playlist.lock().unwrap().as_ref() {
                    engine.request_cancel();
                }
            }
            Ok(())
        }

        async fn release_lease(
            &self,
            last_error: Option<&str>,
            completed_playlists: i64,
        ) -> Result<(), RepoError> {
            let mut state = self.state.lock().unwrap();
            state.currently_syncing = false;
            state.current_playlist_id = None;
            state.last_sync = Some(OffsetDateTime::now_utc());
            state.last_error = last_error.map(str::to_string);
            state.total_syncs += completed_playlists;
            Ok(())
        }

        async fn load_status(&self) -> Result<SyncStatusRecord, RepoError> {
            Ok(self.state.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct FakeHistory {
        rows: Mutex<Vec<SyncHistoryRecord>>,
    }

    #[async_trait]
    impl SyncHistoryRepo for FakeHistory {
        async fn append_history(&self, record: SyncHistoryRecord) -> Result<(), RepoError> {
            self.rows.lock().unwrap().push(record);
            Ok(())
        }

        async fn list_recent_history(
            &self,
            _limit: u32,
        ) -> Result<Vec<SyncHistoryRecord>, RepoError> {
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    /// Scripted platform: playlist listing and per-video details, with one
    /// playlist optionally failing its listing permanently.
    #[derive(Default)]
    struct ScriptedPlatform {
        members: HashMap<String, Vec<String>>,
        failing_details: bool,
    }

    #[async_trait]
    impl VideoPlatform for ScriptedPlatform {
        async fn list_playlist_items(
            &self,
            playlist_id: &str,
            _page_token: Option<&str>,
        ) -> Result<PlaylistItemsPage, UpstreamError> {
            Ok(PlaylistItemsPage {
                video_ids: self.members.get(playlist_id).cloned().unwrap_or_default(),
                next_page_token: None,
            })
        }

        async fn fetch_video_details(
            &self,
            video_ids: &[String],
        ) -> Result<Vec<VideoDetails>, UpstreamError> {
            if self.failing_details {
                return Err(UpstreamError::Status { status: 403 });
            }
            Ok(video_ids.iter().map(|id| sample_details(id)).collect())
        }
    }

    fn sample_details(id: &str) -> VideoDetails {
        VideoDetails {
            video_id: id.to_string(),
            title: format!("video {id}"),
            description: String::new(),
            published_at: OffsetDateTime::now_utc() - time::Duration::hours(200),
            statistics: VideoStatistics {
                view_count: 10,
                like_count: 1,
                comment_count: 0,
            },
            duration_seconds: 300,
            privacy: PrivacyStatus::Public,
            tags: Vec::new(),
        }
    }

    fn playlist(id: &str, item_count: i64) -> PlaylistRecord {
        PlaylistRecord {
            playlist_id: id.to_string(),
            title: id.to_string(),
            slug: id.to_string(),
            item_count,
            is_active: true,
            sync_in_progress: false,
            last_sync_result: None,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    struct Harness {
        engine: Arc<SyncEngine>,
        videos: Arc<FakeVideos>,
        status: Arc<FakeStatus>,
        history: Arc<FakeHistory>,
    }

    fn harness(platform: ScriptedPlatform, playlists: Vec<PlaylistRecord>) -> Harness {
        let videos = Arc::new(FakeVideos::default());
        let playlists_repo = Arc::new(FakePlaylists {
            active: playlists,
            ..Default::default()
        });
        let status = Arc::new(FakeStatus::default());
        let history = Arc::new(FakeHistory::default());
        let platform: Arc<dyn VideoPlatform> = Arc::new(platform);

        let membership = MembershipIndexBuilder::new(
            platform.clone(),
            RetryPolicy::test(),
            Duration::from_millis(0),
        );
        let engine = Arc::new(SyncEngine::new(
            videos.clone(),
            playlists_repo,
            status.clone(),
            history.clone(),
            platform,
            membership,
            RetryPolicy::test(),
        ));

        Harness {
            engine,
            videos,
            status,
            history,
        }
    }

    #[tokio::test]
    async fn full_sync_upserts_all_members_and_releases_lease() {
        let mut members = HashMap::new();
        members.insert("pl-big".to_string(), vec!["v1".into(), "v2".into()]);
        members.insert("pl-small".to_string(), vec!["v3".into()]);

        let h = harness(
            ScriptedPlatform {
                members,
                ..Default::default()
            },
            vec![playlist("pl-big", 2), playlist("pl-small", 1)],
        );

        let report = h.engine.sync_all(false).await.unwrap();

        assert_eq!(report.playlists_completed, 2);
        assert_eq!(report.playlists_failed, 0);
        assert_eq!(report.videos_added, 3);
        assert!(!report.cancelled);

        let status = h.status.load_status().await.unwrap();
        assert!(!status.currently_syncing);
        assert!(status.last_error.is_none());
        assert_eq!(status.total_syncs, 2);

        assert_eq!(h.history.rows.lock().unwrap().len(), 2);
        assert_eq!(h.videos.rows.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn second_run_is_rejected_while_lease_is_held() {
        let h = harness(ScriptedPlatform::default(), vec![]);

        assert!(h.status.try_acquire_lease(false).await.unwrap());
        let err = h.engine.sync_all(false).await.unwrap_err();
        assert!(matches!(err, SyncError::AlreadyRunning));

        // Forcing steals the lease.
        let report = h.engine.sync_all(true).await.unwrap();
        assert_eq!(report.playlists_completed, 0);
    }

    #[tokio::test]
    async fn details_failure_marks_playlist_failed_but_run_continues() {
        let mut members = HashMap::new();
        members.insert("pl-a".to_string(), vec!["v1".into()]);

        let h = harness(
            ScriptedPlatform {
                members,
                failing_details: true,
            },
            vec![playlist("pl-a", 1)],
        );

        let report = h.engine.sync_all(false).await.unwrap();
        assert_eq!(report.playlists_completed, 0);
        assert_eq!(report.playlists_failed, 1);

        let rows = h.history.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, SyncRunStatus::Failed);
        assert!(rows[0].error.is_some());
    }

    #[tokio::test]
    async fn cancellation_stops_between_playlists() {
        let mut members = HashMap::new();
        members.insert("pl-a".to_string(), vec!["v1".into()]);
        members.insert("pl-b".to_string(), vec!["v2".into()]);

        let h = harness(
            ScriptedPlatform {
                members,
                ..Default::default()
            },
            vec![playlist("pl-a", 1), playlist("pl-b", 1)],
        );
        *h.status.cancel_on_first_playlist.lock().unwrap() = Some(h.engine.clone());

        let report = h.engine.sync_all(false).await.unwrap();

        // The in-flight playlist finished; the second never started.
        assert!(report.cancelled);
        assert_eq!(report.playlists_completed, 1);
        assert_eq!(h.history.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn enrich_does_not_touch_the_lease() {
        let mut members = HashMap::new();
        members.insert("pl-a".to_string(), vec!["v1".into()]);

        let h = harness(
            ScriptedPlatform {
                members,
                ..Default::default()
            },
            vec![playlist("pl-a", 1)],
        );

        // Hold the lease as if a full sync were running elsewhere.
        assert!(h.status.try_acquire_lease(false).await.unwrap());

        let report = h.engine.enrich(&["v1".to_string()]).await.unwrap();
        assert_eq!(report.videos_added, 1);

        // Membership was recomputed for the enriched video.
        let stored = h.videos.find_video("v1").await.unwrap().unwrap();
        assert_eq!(stored.playlists, vec!["pl-a".to_string()]);
        assert!(h.status.load_status().await.unwrap().currently_syncing);
    }
}

//! Playlist membership index.
//!
//! Builds the playlist → item-id map by walking the platform's paginated
//! listing, then inverts it so enrichment can answer "which playlists carry
//! this video". Costs are bounded: a hard page cap per playlist and a fixed
//! pause between playlists to stay clear of upstream rate limits.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::application::retry::{RetryPolicy, retry_transient};
use crate::infra::platform::VideoPlatform;

/// Hard cap on listing pages fetched per playlist.
pub const MAX_PAGES_PER_PLAYLIST: usize = 10;

/// playlistId → ordered item-id set, plus the inverse map.
#[derive(Debug, Default, Clone)]
pub struct MembershipIndex {
    by_playlist: HashMap<String, BTreeSet<String>>,
    by_video: HashMap<String, BTreeSet<String>>,
}

impl MembershipIndex {
    pub fn insert(&mut self, playlist_id: &str, video_id: &str) {
        self.by_playlist
            .entry(playlist_id.to_string())
            .or_default()
            .insert(video_id.to_string());
        self.by_video
            .entry(video_id.to_string())
            .or_default()
            .insert(playlist_id.to_string());
    }

    /// Record a playlist that produced no members, so lookups can tell
    /// "empty" apart from "never built".
    pub fn insert_empty_playlist(&mut self, playlist_id: &str) {
        self.by_playlist.entry(playlist_id.to_string()).or_default();
    }

    pub fn videos_in(&self, playlist_id: &str) -> Option<&BTreeSet<String>> {
        self.by_playlist.get(playlist_id)
    }

    pub fn playlists_for(&self, video_id: &str) -> Vec<String> {
        self.by_video
            .get(video_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn playlist_count(&self) -> usize {
        self.by_playlist.len()
    }

    pub fn video_count(&self) -> usize {
        self.by_video.len()
    }
}

pub struct MembershipIndexBuilder {
    platform: Arc<dyn VideoPlatform>,
    policy: RetryPolicy,
    playlist_delay: Duration,
}

impl MembershipIndexBuilder {
    pub fn new(
        platform: Arc<dyn VideoPlatform>,
        policy: RetryPolicy,
        playlist_delay: Duration,
    ) -> Self {
        Self {
            platform,
            policy,
            playlist_delay,
        }
    }

    /// Build the index for the given playlists. A playlist whose listing
    /// fails (after retries) contributes an empty set rather than failing
    /// the whole build.
    pub async fn build(&self, playlist_ids: &[String]) -> MembershipIndex {
        let mut index = MembershipIndex::default();

        for (position, playlist_id) in playlist_ids.iter().enumerate() {
            if position > 0 && !self.playlist_delay.is_zero() {
                tokio::time::sleep(self.playlist_delay).await;
            }

            match self.collect_playlist(playlist_id).await {
                Ok(video_ids) => {
                    index.insert_empty_playlist(playlist_id);
                    for video_id in &video_ids {
                        index.insert(playlist_id, video_id);
                    }
                }
                Err(err) => {
                    warn!(
                        target = "vodsync::sync::membership",
                        playlist_id,
                        error = %err,
                        "Playlist listing failed, indexing it as empty"
                    );
                    index.insert_empty_playlist(playlist_id);
                }
            }
        }

        index
    }

    async fn collect_playlist(
        &self,
        playlist_id: &str,
    ) -> Result<Vec<String>, crate::infra::platform::UpstreamError> {
        let mut video_ids = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES_PER_PLAYLIST {
            let token = page_token.clone();
            let page = retry_transient("playlist_items_page", self.policy, || {
                let token = token.clone();
                async move {
                    self.platform
                        .list_playlist_items(playlist_id, token.as_deref())
                        .await
                }
            })
            .await?;

            video_ids.extend(page.video_ids);
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(video_ids)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::infra::platform::{PlaylistItemsPage, UpstreamError, VideoDetails};

    /// Scripted platform: `pages` maps playlist id to its page sequence, or
    /// to an error when the entry is `Err`.
    struct ScriptedPlatform {
        pages: HashMap<String, Result<Vec<PlaylistItemsPage>, ()>>,
        list_calls: Mutex<usize>,
    }

    impl ScriptedPlatform {
        fn new(pages: HashMap<String, Result<Vec<PlaylistItemsPage>, ()>>) -> Self {
            Self {
                pages,
                list_calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl VideoPlatform for ScriptedPlatform {
        async fn list_playlist_items(
            &self,
            playlist_id: &str,
            page_token: Option<&str>,
        ) -> Result<PlaylistItemsPage, UpstreamError> {
            *self.list_calls.lock().unwrap() += 1;
            let pages = self
                .pages
                .get(playlist_id)
                .cloned()
                .unwrap_or(Ok(Vec::new()))
                .map_err(|_| UpstreamError::Status { status: 403 })?;

            let page_index = page_token.map(|t| t.parse::<usize>().unwrap()).unwrap_or(0);
            Ok(pages.get(page_index).cloned().unwrap_or_default())
        }

        async fn fetch_video_details(
            &self,
            _video_ids: &[String],
        ) -> Result<Vec<VideoDetails>, UpstreamError> {
            Ok(Vec::new())
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> PlaylistItemsPage {
        PlaylistItemsPage {
            video_ids: ids.iter().map(|s| s.to_string()).collect(),
            next_page_token: next.map(str::to_string),
        }
    }

    fn builder(platform: ScriptedPlatform) -> MembershipIndexBuilder {
        MembershipIndexBuilder::new(
            Arc::new(platform),
            RetryPolicy::test(),
            Duration::from_millis(0),
        )
    }

    #[tokio::test]
    async fn builds_both_directions_of_the_index() {
        let mut pages = HashMap::new();
        pages.insert(
            "pl-a".to_string(),
            Ok(vec![page(&["v1", "v2"], Some("1")), page(&["v3"], None)]),
        );
        pages.insert("pl-b".to_string(), Ok(vec![page(&["v2"], None)]));

        let index = builder(ScriptedPlatform::new(pages))
            .build(&["pl-a".to_string(), "pl-b".to_string()])
            .await;

        assert_eq!(index.playlist_count(), 2);
        assert_eq!(index.video_count(), 3);
        assert_eq!(
            index.videos_in("pl-a").map(|s| s.len()),
            Some(3)
        );
        assert_eq!(index.playlists_for("v2"), vec!["pl-a", "pl-b"]);
        assert!(index.playlists_for("unknown").is_empty());
    }

    #[tokio::test]
    async fn failed_playlist_yields_empty_set_without_aborting() {
        let mut pages = HashMap::new();
        pages.insert("pl-bad".to_string(), Err(()));
        pages.insert("pl-good".to_string(), Ok(vec![page(&["v1"], None)]));

        let index = builder(ScriptedPlatform::new(pages))
            .build(&["pl-bad".to_string(), "pl-good".to_string()])
            .await;

        assert_eq!(index.videos_in("pl-bad").map(|s| s.len()), Some(0));
        assert_eq!(index.videos_in("pl-good").map(|s| s.len()), Some(1));
    }

    #[tokio::test]
    async fn page_walk_stops_at_the_hard_cap() {
        // Every page points at itself, so only the cap ends the walk.
        let mut pages = HashMap::new();
        pages.insert(
            "pl-loop".to_string(),
            Ok(vec![page(&["v1"], Some("0"))]),
        );

        let platform = ScriptedPlatform::new(pages);
        let builder = MembershipIndexBuilder::new(
            Arc::new(platform),
            RetryPolicy::test(),
            Duration::from_millis(0),
        );
        let index = builder.build(&["pl-loop".to_string()]).await;

        // The set deduplicates, so membership stays at one video.
        assert_eq!(index.videos_in("pl-loop").map(|s| s.len()), Some(1));
    }
}

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::debugging::DebuggingRecorder;
use tokio::sync::Mutex;

use vodsync::application::repos::{CacheHistoryRepo, RepoError};
use vodsync::cache::{CacheConfig, CacheCoordinator, MemoryStores, PaginationCache, page_key};
use vodsync::domain::entities::CacheHistoryRecord;
use vodsync::infra::cdn::{EdgePurger, PurgeError, PurgeScope};
use vodsync::infra::revalidate::{PageRevalidator, RevalidateError};

#[derive(Default)]
struct RecordingCacheHistory {
    rows: Mutex<Vec<CacheHistoryRecord>>,
}

#[async_trait]
impl CacheHistoryRepo for RecordingCacheHistory {
    async fn append_cache_history(&self, record: CacheHistoryRecord) -> Result<(), RepoError> {
        self.rows.lock().await.push(record);
        Ok(())
    }

    async fn list_recent_cache_history(
        &self,
        limit: u32,
    ) -> Result<Vec<CacheHistoryRecord>, RepoError> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().rev().take(limit as usize).cloned().collect())
    }
}

struct OkPurger;

#[async_trait]
impl EdgePurger for OkPurger {
    async fn purge(&self, _scope: &PurgeScope) -> Result<(), PurgeError> {
        Ok(())
    }
}

struct OkRevalidator;

#[async_trait]
impl PageRevalidator for OkRevalidator {
    async fn revalidate(&self, _paths: &[String]) -> Result<(), RevalidateError> {
        Ok(())
    }
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Pagination hit/miss
    let pagination = PaginationCache::new(Duration::from_secs(60));
    let key = page_key("videos", &[("tier", "hot")]);
    assert!(pagination.get(&key).is_none());
    pagination.put(key.clone(), serde_json::json!({"items": []}));
    assert!(pagination.get(&key).is_some());

    // Full purge latency histogram
    let config = CacheConfig {
        cdn_settle_ms: 0,
        isr_settle_ms: 0,
        ..CacheConfig::default()
    };
    let coordinator = CacheCoordinator::new(
        Arc::new(MemoryStores::new(&config)),
        Arc::new(OkPurger),
        Arc::new(OkRevalidator),
        Arc::new(RecordingCacheHistory::default()),
        &config,
    );
    let outcome = coordinator.purge_all("metrics-test").await;
    assert!(outcome.fully_purged());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "vodsync_cache_pagination_hit_total",
        "vodsync_cache_pagination_miss_total",
        "vodsync_cache_purge_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}

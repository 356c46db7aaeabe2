//! Multi-tier cache purge coordination.
//!
//! Walks the three cache layers strictly in order, innermost first: the
//! in-memory stores, then the CDN edge cache, then the statically-rendered
//! frontend pages. Each layer's outcome is recorded independently and a
//! failure never stops the walk, so a partially purged hierarchy still
//! converges as far as it can.
//!
//! Layer 1 is per-instance state. Clearing it here only affects the instance
//! that handled the request; sibling instances keep their entries until the
//! freshness window expires them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::histogram;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::repos::CacheHistoryRepo;
use crate::domain::entities::CacheHistoryRecord;
use crate::domain::types::CacheKind;
use crate::infra::cdn::{EdgePurger, PurgeScope};
use crate::infra::revalidate::PageRevalidator;

use super::config::CacheConfig;
use super::store::MemoryStores;

/// Per-layer report of one purge walk.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PurgeOutcome {
    pub lru_cleared: bool,
    pub lru_items_cleared: usize,
    pub cloudflare_purged: bool,
    pub isr_revalidated: bool,
    pub errors: Vec<String>,
    #[serde(skip)]
    pub duration: Duration,
}

impl PurgeOutcome {
    pub fn fully_purged(&self) -> bool {
        self.cloudflare_purged && self.isr_revalidated && self.errors.is_empty()
    }
}

pub struct CacheCoordinator {
    stores: Arc<MemoryStores>,
    purger: Arc<dyn EdgePurger>,
    revalidator: Arc<dyn PageRevalidator>,
    cache_history: Arc<dyn CacheHistoryRepo>,
    cdn_settle: Duration,
    isr_settle: Duration,
    revalidate_paths: Vec<String>,
}

impl CacheCoordinator {
    pub fn new(
        stores: Arc<MemoryStores>,
        purger: Arc<dyn EdgePurger>,
        revalidator: Arc<dyn PageRevalidator>,
        cache_history: Arc<dyn CacheHistoryRepo>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            stores,
            purger,
            revalidator,
            cache_history,
            cdn_settle: config.cdn_settle(),
            isr_settle: config.isr_settle(),
            revalidate_paths: config.revalidate_paths.clone(),
        }
    }

    /// Purge every layer, innermost first. Safe to call repeatedly; an
    /// already-empty layer purges as a no-op.
    pub async fn purge_all(&self, actor: &str) -> PurgeOutcome {
        let started = Instant::now();
        let mut errors = Vec::new();

        let counts = self.stores.clear();
        info!(
            target = "vodsync::cache::coordinator",
            actor,
            videos = counts.videos,
            lists = counts.lists,
            "Cleared in-memory stores"
        );
        self.record(CacheKind::Memory, "clear", counts.total() as i64)
            .await;

        let cloudflare_purged = match self.purger.purge(&PurgeScope::Everything).await {
            Ok(()) => {
                self.record(CacheKind::Cdn, "purge_everything", 0).await;
                // Give the edge time to drop its copies before the pages
                // re-render against it.
                if !self.cdn_settle.is_zero() {
                    tokio::time::sleep(self.cdn_settle).await;
                }
                true
            }
            Err(err) => {
                warn!(
                    target = "vodsync::cache::coordinator",
                    actor,
                    error = %err,
                    "CDN purge failed, continuing to page revalidation"
                );
                errors.push(format!("cdn: {err}"));
                false
            }
        };

        let isr_revalidated = match self.revalidator.revalidate(&self.revalidate_paths).await {
            Ok(()) => {
                self.record(
                    CacheKind::Pages,
                    "revalidate",
                    self.revalidate_paths.len() as i64,
                )
                .await;
                if !self.isr_settle.is_zero() {
                    tokio::time::sleep(self.isr_settle).await;
                }
                true
            }
            Err(err) => {
                warn!(
                    target = "vodsync::cache::coordinator",
                    actor,
                    error = %err,
                    "Page revalidation failed"
                );
                errors.push(format!("pages: {err}"));
                false
            }
        };

        let duration = started.elapsed();
        histogram!("vodsync_cache_purge_ms").record(duration.as_millis() as f64);

        PurgeOutcome {
            lru_cleared: true,
            lru_items_cleared: counts.total(),
            cloudflare_purged,
            isr_revalidated,
            errors,
            duration,
        }
    }

    // The audit trail is best-effort; a history write failure must not turn
    // a successful purge into a failed one.
    async fn record(&self, kind: CacheKind, action: &str, item_count: i64) {
        let record = CacheHistoryRecord {
            id: Uuid::new_v4(),
            cache_type: kind.as_str().to_string(),
            action: action.to_string(),
            item_count,
            created_at: OffsetDateTime::now_utc(),
        };
        if let Err(err) = self.cache_history.append_cache_history(record).await {
            warn!(
                target = "vodsync::cache::coordinator",
                error = %err,
                cache_type = kind.as_str(),
                "Failed to append cache history"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::application::repos::RepoError;
    use crate::infra::cdn::PurgeError;
    use crate::infra::revalidate::RevalidateError;

    #[derive(Default)]
    struct FakePurger {
        fail: bool,
        called: AtomicBool,
    }

    #[async_trait]
    impl EdgePurger for FakePurger {
        async fn purge(&self, _scope: &PurgeScope) -> Result<(), PurgeError> {
            self.called.store(true, Ordering::SeqCst);
            if self.fail {
                Err(PurgeError::Status { status: 503 })
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct FakeRevalidator {
        fail: bool,
        called: AtomicBool,
    }

    #[async_trait]
    impl PageRevalidator for FakeRevalidator {
        async fn revalidate(&self, _paths: &[String]) -> Result<(), RevalidateError> {
            self.called.store(true, Ordering::SeqCst);
            if self.fail {
                Err(RevalidateError::Status { status: 500 })
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct FakeCacheHistory {
        rows: Mutex<Vec<CacheHistoryRecord>>,
    }

    #[async_trait]
    impl CacheHistoryRepo for FakeCacheHistory {
        async fn append_cache_history(
            &self,
            record: CacheHistoryRecord,
        ) -> Result<(), RepoError> {
            self.rows.lock().unwrap().push(record);
            Ok(())
        }

        async fn list_recent_cache_history(
            &self,
            _limit: u32,
        ) -> Result<Vec<CacheHistoryRecord>, RepoError> {
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    fn test_config() -> CacheConfig {
        CacheConfig {
            cdn_settle_ms: 0,
            isr_settle_ms: 0,
            ..Default::default()
        }
    }

    fn coordinator(
        purger: Arc<FakePurger>,
        revalidator: Arc<FakeRevalidator>,
        history: Arc<FakeCacheHistory>,
    ) -> CacheCoordinator {
        let config = test_config();
        CacheCoordinator::new(
            Arc::new(MemoryStores::new(&config)),
            purger,
            revalidator,
            history,
            &config,
        )
    }

    #[tokio::test]
    async fn all_layers_succeed() {
        let purger = Arc::new(FakePurger::default());
        let revalidator = Arc::new(FakeRevalidator::default());
        let history = Arc::new(FakeCacheHistory::default());
        let coordinator = coordinator(purger.clone(), revalidator.clone(), history.clone());

        let outcome = coordinator.purge_all("test").await;

        assert!(outcome.cloudflare_purged);
        assert!(outcome.isr_revalidated);
        assert!(outcome.errors.is_empty());
        assert!(outcome.fully_purged());
        // One history row per layer.
        assert_eq!(history.rows.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cdn_failure_does_not_stop_revalidation() {
        let purger = Arc::new(FakePurger {
            fail: true,
            ..Default::default()
        });
        let revalidator = Arc::new(FakeRevalidator::default());
        let history = Arc::new(FakeCacheHistory::default());
        let coordinator = coordinator(purger.clone(), revalidator.clone(), history.clone());

        let outcome = coordinator.purge_all("test").await;

        assert!(!outcome.cloudflare_purged);
        assert!(outcome.isr_revalidated);
        assert!(revalidator.called.load(Ordering::SeqCst));
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("cdn:"));
        assert!(!outcome.fully_purged());
    }

    #[tokio::test]
    async fn purge_is_idempotent_on_empty_caches() {
        let purger = Arc::new(FakePurger::default());
        let revalidator = Arc::new(FakeRevalidator::default());
        let history = Arc::new(FakeCacheHistory::default());
        let coordinator = coordinator(purger, revalidator, history);

        let first = coordinator.purge_all("test").await;
        let second = coordinator.purge_all("test").await;

        assert!(first.lru_cleared);
        assert_eq!(first.lru_items_cleared, 0);
        assert_eq!(second.lru_items_cleared, 0);
        assert!(second.fully_purged());
    }

    #[tokio::test]
    async fn settle_follows_each_successful_layer() {
        let purger = Arc::new(TimingPurger::default());
        let revalidator = Arc::new(TimingRevalidator::default());
        let history = Arc::new(FakeCacheHistory::default());
        let config = CacheConfig {
            cdn_settle_ms: 120,
            isr_settle_ms: 0,
            ..Default::default()
        };
        let coordinator = CacheCoordinator::new(
            Arc::new(MemoryStores::new(&config)),
            purger.clone(),
            revalidator.clone(),
            history,
            &config,
        );

        let started = Instant::now();
        let outcome = coordinator.purge_all("test").await;
        assert!(outcome.fully_purged());

        let purged_at = purger.called_at.lock().unwrap().unwrap();
        let revalidated_at = revalidator.called_at.lock().unwrap().unwrap();
        // The purge goes out immediately; the settle sits between the CDN
        // ack and the page revalidation, not before the purge.
        assert!(purged_at.duration_since(started) < Duration::from_millis(100));
        assert!(revalidated_at.duration_since(purged_at) >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn failed_cdn_purge_skips_the_settle() {
        let purger = Arc::new(FakePurger {
            fail: true,
            ..Default::default()
        });
        let revalidator = Arc::new(FakeRevalidator::default());
        let history = Arc::new(FakeCacheHistory::default());
        let config = CacheConfig {
            cdn_settle_ms: 5_000,
            isr_settle_ms: 0,
            ..Default::default()
        };
        let coordinator = CacheCoordinator::new(
            Arc::new(MemoryStores::new(&config)),
            purger,
            revalidator.clone(),
            history,
            &config,
        );

        let started = Instant::now();
        let outcome = coordinator.purge_all("test").await;

        assert!(!outcome.cloudflare_purged);
        assert!(revalidator.called.load(Ordering::SeqCst));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[derive(Default)]
    struct TimingPurger {
        called_at: Mutex<Option<Instant>>,
    }

    #[async_trait]
    impl EdgePurger for TimingPurger {
        async fn purge(&self, _scope: &PurgeScope) -> Result<(), PurgeError> {
            *self.called_at.lock().unwrap() = Some(Instant::now());
            Ok(())
        }
    }

    #[derive(Default)]
    struct TimingRevalidator {
        called_at: Mutex<Option<Instant>>,
    }

    #[async_trait]
    impl PageRevalidator for TimingRevalidator {
        async fn revalidate(&self, _paths: &[String]) -> Result<(), RevalidateError> {
            *self.called_at.lock().unwrap() = Some(Instant::now());
            Ok(())
        }
    }
}

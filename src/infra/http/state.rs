use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use url::Url;

use crate::application::audit::AuditService;
use crate::application::repos::{
    CacheHistoryRepo, PlaylistsRepo, SubscriptionsRepo, SyncHistoryRepo, SyncStatusRepo,
    VideosRepo,
};
use crate::application::subscription::SubscriptionManager;
use crate::application::sync::SyncEngine;
use crate::application::webhook::WebhookService;
use crate::cache::{CacheConfig, CacheCoordinator, MemoryStores, PaginationCache};
use crate::infra::db::PostgresRepositories;
use crate::infra::revalidate::PageRevalidator;

/// Shared state for every HTTP surface. Cheap to clone; everything inside is Arc'd.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub webhooks: Arc<WebhookService>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub coordinator: Arc<CacheCoordinator>,
    pub revalidator: Arc<dyn PageRevalidator>,
    pub pagination: Arc<PaginationCache>,
    pub stores: Arc<MemoryStores>,
    pub audit: Arc<AuditService>,
    pub videos: Arc<dyn VideosRepo>,
    pub playlists: Arc<dyn PlaylistsRepo>,
    pub sync_status: Arc<dyn SyncStatusRepo>,
    pub sync_history: Arc<dyn SyncHistoryRepo>,
    pub subscription_repo: Arc<dyn SubscriptionsRepo>,
    pub cache_history: Arc<dyn CacheHistoryRepo>,
    /// Absent when the router is built over in-memory fakes.
    pub db: Option<Arc<PostgresRepositories>>,
    pub trigger: Arc<TriggerGuard>,
    pub cache_config: CacheConfig,
}

/// Guards the privileged revalidation/purge endpoints: constant-time secret
/// comparison plus a path allow-list applied before any side effect runs.
pub struct TriggerGuard {
    hashed_secret: Option<[u8; 32]>,
    allowed_prefixes: Vec<String>,
}

impl TriggerGuard {
    pub fn new(secret: Option<&str>, allowed_prefixes: Vec<String>) -> Self {
        Self {
            hashed_secret: secret.map(hash_secret),
            allowed_prefixes,
        }
    }

    /// A missing configured secret disables the endpoint entirely.
    pub fn verify(&self, presented: &str) -> bool {
        match self.hashed_secret.as_ref() {
            Some(expected) => {
                let hashed = hash_secret(presented);
                expected.ct_eq(&hashed).unwrap_u8() == 1
            }
            None => false,
        }
    }

    /// Reduce a raw path or full URL to a bare path, dropping query and fragment.
    pub fn normalize_path(&self, raw: &str) -> Result<String, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("empty path".to_string());
        }

        let path = if trimmed.starts_with('/') {
            let base = Url::parse("http://localhost")
                .map_err(|err| format!("base url: {err}"))?;
            let resolved = base
                .join(trimmed)
                .map_err(|err| format!("invalid path `{trimmed}`: {err}"))?;
            resolved.path().to_string()
        } else {
            let parsed = Url::parse(trimmed)
                .map_err(|err| format!("invalid url `{trimmed}`: {err}"))?;
            parsed.path().to_string()
        };

        Ok(path)
    }

    pub fn path_allowed(&self, path: &str) -> bool {
        self.allowed_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

fn hash_secret(secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> TriggerGuard {
        TriggerGuard::new(
            Some("hunter2"),
            vec!["/api/".to_string(), "/videos".to_string()],
        )
    }

    #[test]
    fn verifies_exact_secret_only() {
        let guard = guard();
        assert!(guard.verify("hunter2"));
        assert!(!guard.verify("hunter3"));
        assert!(!guard.verify(""));
    }

    #[test]
    fn missing_secret_rejects_everything() {
        let guard = TriggerGuard::new(None, vec!["/".to_string()]);
        assert!(!guard.verify("anything"));
    }

    #[test]
    fn normalizes_full_urls_to_paths() {
        let guard = guard();
        assert_eq!(
            guard
                .normalize_path("https://example.com/videos/abc?utm=1#top")
                .as_deref(),
            Ok("/videos/abc")
        );
        assert_eq!(
            guard.normalize_path("/api/feed?page=2").as_deref(),
            Ok("/api/feed")
        );
    }

    #[test]
    fn rejects_paths_outside_allow_list() {
        let guard = guard();
        assert!(guard.path_allowed("/videos/abc"));
        assert!(guard.path_allowed("/api/feed"));
        assert!(!guard.path_allowed("/admin/secrets"));
        assert!(!guard.path_allowed("/apifeed"));
    }

    #[test]
    fn rejects_unparseable_input() {
        let guard = guard();
        assert!(guard.normalize_path("").is_err());
        assert!(guard.normalize_path("http://").is_err());
    }
}

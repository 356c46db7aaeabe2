//! Push-notification subscription lifecycle.
//!
//! One WebSub lease per upstream channel. Subscribe and renew share the same
//! idempotent path: ask the hub, then persist the expected expiry before the
//! hub's asynchronous verification lands. A failed renewal flips the status
//! to failed but never overwrites the last-known expiry.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use url::Url;

use crate::application::repos::{RepoError, SubscriptionUpdate, SubscriptionsRepo};
use crate::domain::entities::WebSubSubscriptionRecord;
use crate::domain::types::SubscriptionStatus;
use crate::infra::websub::{HubError, HubMode, SubscriptionHub};

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("hub request failed: {0}")]
    Hub(#[from] HubError),
}

/// Handshake mode carried by the hub's verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    Subscribe,
    Unsubscribe,
}

impl VerificationMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "subscribe" => Some(Self::Subscribe),
            "unsubscribe" => Some(Self::Unsubscribe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Base topic URL; the channel id is appended as a query parameter.
    pub topic_base: String,
    /// Public callback URL of the webhook receiver.
    pub callback_url: String,
    /// Lease duration requested from the hub.
    pub lease: Duration,
}

pub struct SubscriptionManager {
    subscriptions: Arc<dyn SubscriptionsRepo>,
    hub: Arc<dyn SubscriptionHub>,
    config: SubscriptionConfig,
}

impl SubscriptionManager {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionsRepo>,
        hub: Arc<dyn SubscriptionHub>,
        config: SubscriptionConfig,
    ) -> Self {
        Self {
            subscriptions,
            hub,
            config,
        }
    }

    pub fn topic_for(&self, channel_id: &str) -> String {
        format!("{}?channel_id={channel_id}", self.config.topic_base)
    }

    /// Extract the channel id from a topic URL, provided the topic's base
    /// matches the configured one.
    pub fn channel_for_topic(&self, topic: &str) -> Option<String> {
        let url = Url::parse(topic).ok()?;
        let configured = Url::parse(&self.config.topic_base).ok()?;
        if url.origin() != configured.origin() || url.path() != configured.path() {
            return None;
        }
        url.query_pairs()
            .find(|(key, _)| key == "channel_id")
            .map(|(_, value)| value.into_owned())
    }

    /// Subscribe a channel, or renew its existing lease. Idempotent: calling
    /// it again before expiry simply requests a fresh lease.
    pub async fn subscribe(&self, channel_id: &str) -> Result<(), SubscriptionError> {
        let existing = self.subscriptions.find_subscription(channel_id).await?;
        let topic = self.topic_for(channel_id);

        let hub_result = self
            .hub
            .request(
                HubMode::Subscribe,
                &topic,
                &self.config.callback_url,
                self.config.lease.as_secs(),
            )
            .await;

        match hub_result {
            Ok(()) => {
                let now = OffsetDateTime::now_utc();
                let expires_at = now + self.config.lease;
                match existing {
                    // Optimistic expiry: the hub accepted the request, so the
                    // expected window is persisted before verification lands.
                    Some(_) => {
                        self.subscriptions
                            .update_subscription(SubscriptionUpdate {
                                channel_id: channel_id.to_string(),
                                status: SubscriptionStatus::Pending,
                                last_renewal: Some(now),
                                expires_at: Some(expires_at),
                                bump_renewal_count: true,
                            })
                            .await?;
                    }
                    None => {
                        self.subscriptions
                            .upsert_subscription(WebSubSubscriptionRecord {
                                channel_id: channel_id.to_string(),
                                webhook_url: self.config.callback_url.clone(),
                                status: SubscriptionStatus::Pending,
                                last_renewal: Some(now),
                                expires_at: Some(expires_at),
                                renewal_count: 0,
                            })
                            .await?;
                    }
                }
                info!(
                    target = "vodsync::subscription",
                    channel_id,
                    expires_at = %expires_at,
                    "Subscription requested, awaiting hub verification"
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    target = "vodsync::subscription",
                    channel_id,
                    error = %err,
                    "Hub rejected subscription request"
                );
                if existing.is_some() {
                    // Status flips to failed; the stored expiry is retained.
                    self.subscriptions
                        .update_subscription(SubscriptionUpdate {
                            channel_id: channel_id.to_string(),
                            status: SubscriptionStatus::Failed,
                            last_renewal: None,
                            expires_at: None,
                            bump_renewal_count: false,
                        })
                        .await?;
                }
                Err(err.into())
            }
        }
    }

    /// Handle the hub's verification request. Returns the challenge to echo
    /// byte-for-byte, or `None` when the topic is not ours (the caller
    /// answers 404).
    pub async fn verify(
        &self,
        mode: VerificationMode,
        topic: &str,
        challenge: String,
        lease_seconds: Option<u64>,
    ) -> Result<Option<String>, SubscriptionError> {
        let Some(channel_id) = self.channel_for_topic(topic) else {
            return Ok(None);
        };
        if self
            .subscriptions
            .find_subscription(&channel_id)
            .await?
            .is_none()
        {
            return Ok(None);
        }

        let (status, expires_at) = match mode {
            VerificationMode::Subscribe => {
                let lease = lease_seconds
                    .map(Duration::from_secs)
                    .unwrap_or(self.config.lease);
                (
                    SubscriptionStatus::Active,
                    Some(OffsetDateTime::now_utc() + lease),
                )
            }
            VerificationMode::Unsubscribe => (SubscriptionStatus::Expired, None),
        };

        self.subscriptions
            .update_subscription(SubscriptionUpdate {
                channel_id: channel_id.clone(),
                status,
                last_renewal: None,
                expires_at,
                bump_renewal_count: false,
            })
            .await?;

        info!(
            target = "vodsync::subscription",
            channel_id,
            status = ?status,
            "Hub verification handled"
        );
        Ok(Some(challenge))
    }

    /// Renew every active subscription expiring within `window`. Failures
    /// are per-channel; one bad channel does not stop the others. A channel
    /// whose lease already lapsed and whose renewal fails is marked expired
    /// rather than failed.
    pub async fn renew_expiring(&self, window: Duration) -> Result<u64, SubscriptionError> {
        let now = OffsetDateTime::now_utc();
        let deadline = now + window;
        let expiring = self.subscriptions.list_expiring_before(deadline).await?;

        let mut renewed = 0;
        for subscription in expiring {
            match self.subscribe(&subscription.channel_id).await {
                Ok(()) => renewed += 1,
                Err(err) => {
                    warn!(
                        target = "vodsync::subscription",
                        channel_id = %subscription.channel_id,
                        error = %err,
                        "Renewal failed"
                    );
                    if subscription.expires_at.is_some_and(|at| at < now) {
                        self.subscriptions
                            .update_subscription(SubscriptionUpdate {
                                channel_id: subscription.channel_id.clone(),
                                status: SubscriptionStatus::Expired,
                                last_renewal: None,
                                expires_at: None,
                                bump_renewal_count: false,
                            })
                            .await?;
                    }
                }
            }
        }
        Ok(renewed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct FakeSubscriptions {
        rows: Mutex<HashMap<String, WebSubSubscriptionRecord>>,
    }

    #[async_trait]
    impl SubscriptionsRepo for FakeSubscriptions {
        async fn upsert_subscription(
            &self,
            record: WebSubSubscriptionRecord,
        ) -> Result<(), RepoError> {
            self.rows
                .lock()
                .unwrap()
                .insert(record.channel_id.clone(), record);
            Ok(())
        }

        async fn update_subscription(&self, update: SubscriptionUpdate) -> Result<(), RepoError> {
            let mut rows = self.rows.lock().unwrap();
            let record = rows
                .get_mut(&update.channel_id)
                .ok_or(RepoError::NotFound)?;
            record.status = update.status;
            if let Some(last_renewal) = update.last_renewal {
                record.last_renewal = Some(last_renewal);
            }
            if let Some(expires_at) = update.expires_at {
                record.expires_at = Some(expires_at);
            }
            if update.bump_renewal_count {
                record.renewal_count += 1;
            }
            Ok(())
        }

        async fn find_subscription(
            &self,
            channel_id: &str,
        ) -> Result<Option<WebSubSubscriptionRecord>, RepoError> {
            Ok(self.rows.lock().unwrap().get(channel_id).cloned())
        }

        async fn list_subscriptions(&self) -> Result<Vec<WebSubSubscriptionRecord>, RepoError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }

        async fn list_expiring_before(
            &self,
            deadline: OffsetDateTime,
        ) -> Result<Vec<WebSubSubscriptionRecord>, RepoError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|r| {
                    r.status == SubscriptionStatus::Active
                        && r.expires_at.is_some_and(|at| at < deadline)
                })
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeHub {
        fail: bool,
        calls: Mutex<Vec<(HubMode, String)>>,
    }

    #[async_trait]
    impl SubscriptionHub for FakeHub {
        async fn request(
            &self,
            mode: HubMode,
            topic_url: &str,
            _callback_url: &str,
            _lease_seconds: u64,
        ) -> Result<(), HubError> {
            self.calls.lock().unwrap().push((mode, topic_url.to_string()));
            if self.fail {
                Err(HubError::Status { status: 503 })
            } else {
                Ok(())
            }
        }
    }

    const TOPIC_BASE: &str = "https://hub.example.com/feeds/videos.xml";

    fn manager(subs: Arc<FakeSubscriptions>, hub: Arc<FakeHub>) -> SubscriptionManager {
        SubscriptionManager::new(
            subs,
            hub,
            SubscriptionConfig {
                topic_base: TOPIC_BASE.to_string(),
                callback_url: "https://vodsync.example.com/webhook".to_string(),
                lease: Duration::from_secs(432_000),
            },
        )
    }

    #[tokio::test]
    async fn subscribe_persists_optimistic_expiry_as_pending() {
        let subs = Arc::new(FakeSubscriptions::default());
        let hub = Arc::new(FakeHub::default());
        let manager = manager(subs.clone(), hub.clone());

        manager.subscribe("UC123").await.unwrap();

        let record = subs.find_subscription("UC123").await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::Pending);
        assert!(record.expires_at.is_some());
        assert_eq!(record.renewal_count, 0);
        assert_eq!(hub.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_renewal_keeps_the_stored_expiry() {
        let subs = Arc::new(FakeSubscriptions::default());
        let original_expiry = OffsetDateTime::now_utc() + Duration::from_secs(3600);
        subs.upsert_subscription(WebSubSubscriptionRecord {
            channel_id: "UC123".to_string(),
            webhook_url: String::new(),
            status: SubscriptionStatus::Active,
            last_renewal: None,
            expires_at: Some(original_expiry),
            renewal_count: 3,
        })
        .await
        .unwrap();

        let hub = Arc::new(FakeHub {
            fail: true,
            ..Default::default()
        });
        let manager = manager(subs.clone(), hub);

        assert!(manager.subscribe("UC123").await.is_err());

        let record = subs.find_subscription("UC123").await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::Failed);
        assert_eq!(record.expires_at, Some(original_expiry));
        assert_eq!(record.renewal_count, 3);
    }

    #[tokio::test]
    async fn renewal_is_idempotent_and_bumps_the_counter() {
        let subs = Arc::new(FakeSubscriptions::default());
        let hub = Arc::new(FakeHub::default());
        let manager = manager(subs.clone(), hub);

        manager.subscribe("UC123").await.unwrap();
        manager.subscribe("UC123").await.unwrap();
        manager.subscribe("UC123").await.unwrap();

        let rows = subs.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows["UC123"].renewal_count, 2);
    }

    #[tokio::test]
    async fn verification_echoes_the_challenge_and_activates() {
        let subs = Arc::new(FakeSubscriptions::default());
        let hub = Arc::new(FakeHub::default());
        let manager = manager(subs.clone(), hub);
        manager.subscribe("UC123").await.unwrap();

        let topic = format!("{TOPIC_BASE}?channel_id=UC123");
        let echoed = manager
            .verify(
                VerificationMode::Subscribe,
                &topic,
                "abc123".to_string(),
                Some(432_000),
            )
            .await
            .unwrap();

        assert_eq!(echoed.as_deref(), Some("abc123"));
        let record = subs.find_subscription("UC123").await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn verification_rejects_foreign_topics() {
        let subs = Arc::new(FakeSubscriptions::default());
        let hub = Arc::new(FakeHub::default());
        let manager = manager(subs.clone(), hub);
        manager.subscribe("UC123").await.unwrap();

        let foreign = manager
            .verify(
                VerificationMode::Subscribe,
                "https://elsewhere.example.com/feeds/videos.xml?channel_id=UC123",
                "abc123".to_string(),
                None,
            )
            .await
            .unwrap();
        assert!(foreign.is_none());

        let unknown_channel = manager
            .verify(
                VerificationMode::Subscribe,
                &format!("{TOPIC_BASE}?channel_id=UC999"),
                "abc123".to_string(),
                None,
            )
            .await
            .unwrap();
        assert!(unknown_channel.is_none());
    }

    #[tokio::test]
    async fn unsubscribe_verification_expires_the_subscription() {
        let subs = Arc::new(FakeSubscriptions::default());
        let hub = Arc::new(FakeHub::default());
        let manager = manager(subs.clone(), hub);
        manager.subscribe("UC123").await.unwrap();

        let topic = format!("{TOPIC_BASE}?channel_id=UC123");
        let echoed = manager
            .verify(
                VerificationMode::Unsubscribe,
                &topic,
                "bye".to_string(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(echoed.as_deref(), Some("bye"));
        let record = subs.find_subscription("UC123").await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn lapsed_lease_with_failed_renewal_is_marked_expired() {
        let subs = Arc::new(FakeSubscriptions::default());
        subs.upsert_subscription(WebSubSubscriptionRecord {
            channel_id: "UC-lapsed".to_string(),
            webhook_url: String::new(),
            status: SubscriptionStatus::Active,
            last_renewal: None,
            expires_at: Some(OffsetDateTime::now_utc() - Duration::from_secs(60)),
            renewal_count: 0,
        })
        .await
        .unwrap();

        let hub = Arc::new(FakeHub {
            fail: true,
            ..Default::default()
        });
        let manager = manager(subs.clone(), hub);

        let renewed = manager
            .renew_expiring(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(renewed, 0);

        let record = subs.find_subscription("UC-lapsed").await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn renew_expiring_only_touches_soon_to_expire_leases() {
        let subs = Arc::new(FakeSubscriptions::default());
        let now = OffsetDateTime::now_utc();
        for (channel, expires_in) in [("UC-soon", 60), ("UC-later", 864_000)] {
            subs.upsert_subscription(WebSubSubscriptionRecord {
                channel_id: channel.to_string(),
                webhook_url: String::new(),
                status: SubscriptionStatus::Active,
                last_renewal: None,
                expires_at: Some(now + Duration::from_secs(expires_in)),
                renewal_count: 0,
            })
            .await
            .unwrap();
        }

        let hub = Arc::new(FakeHub::default());
        let manager = manager(subs.clone(), hub.clone());

        let renewed = manager
            .renew_expiring(Duration::from_secs(3600))
            .await
            .unwrap();

        assert_eq!(renewed, 1);
        let calls = hub.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.contains("UC-soon"));
    }
}

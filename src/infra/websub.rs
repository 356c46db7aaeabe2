//! WebSub hub client.
//!
//! The hub protocol is a single form-encoded POST; the hub later confirms the
//! intent asynchronously by calling the webhook receiver's verification
//! endpoint.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::retry::TransientError;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub transport error: {0}")]
    Transport(String),
    #[error("hub rejected request with HTTP {status}")]
    Status { status: u16 },
}

impl TransientError for HubError {
    fn is_transient(&self) -> bool {
        match self {
            HubError::Transport(_) => true,
            HubError::Status { status } => *status == 429 || *status >= 500,
        }
    }
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubMode {
    Subscribe,
    Unsubscribe,
}

impl HubMode {
    fn as_str(self) -> &'static str {
        match self {
            HubMode::Subscribe => "subscribe",
            HubMode::Unsubscribe => "unsubscribe",
        }
    }
}

/// Seam for the outbound hub request; tests substitute fakes.
#[async_trait]
pub trait SubscriptionHub: Send + Sync {
    async fn request(
        &self,
        mode: HubMode,
        topic_url: &str,
        callback_url: &str,
        lease_seconds: u64,
    ) -> Result<(), HubError>;
}

pub struct HubClient {
    http: reqwest::Client,
    hub_url: String,
}

impl HubClient {
    pub fn new(http: reqwest::Client, hub_url: impl Into<String>) -> Self {
        Self {
            http,
            hub_url: hub_url.into(),
        }
    }
}

#[async_trait]
impl SubscriptionHub for HubClient {
    async fn request(
        &self,
        mode: HubMode,
        topic_url: &str,
        callback_url: &str,
        lease_seconds: u64,
    ) -> Result<(), HubError> {
        let lease = lease_seconds.to_string();
        let form = [
            ("hub.mode", mode.as_str()),
            ("hub.topic", topic_url),
            ("hub.callback", callback_url),
            ("hub.lease_seconds", lease.as_str()),
            ("hub.verify", "async"),
        ];

        let response = self.http.post(&self.hub_url).form(&form).send().await?;

        let status = response.status();
        // Hubs answer 202 Accepted for async verification.
        if !status.is_success() {
            return Err(HubError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

//! Edge cache (CDN) purge client.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("cdn transport error: {0}")]
    Transport(String),
    #[error("cdn returned HTTP {status}")]
    Status { status: u16 },
    #[error("cdn reported failure: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for PurgeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// What to purge at the edge.
#[derive(Debug, Clone)]
pub enum PurgeScope {
    Everything,
    Urls(Vec<String>),
}

/// Seam for the edge purge; production uses [`CloudflarePurger`], tests
/// substitute fakes.
#[async_trait]
pub trait EdgePurger: Send + Sync {
    async fn purge(&self, scope: &PurgeScope) -> Result<(), PurgeError>;
}

pub struct CloudflarePurger {
    http: reqwest::Client,
    zone_id: String,
    api_token: String,
}

impl CloudflarePurger {
    pub fn new(
        http: reqwest::Client,
        zone_id: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            zone_id: zone_id.into(),
            api_token: api_token.into(),
        }
    }
}

#[derive(Serialize)]
struct PurgeBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    purge_everything: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<&'a [String]>,
}

#[async_trait]
impl EdgePurger for CloudflarePurger {
    async fn purge(&self, scope: &PurgeScope) -> Result<(), PurgeError> {
        let body = match scope {
            PurgeScope::Everything => PurgeBody {
                purge_everything: Some(true),
                files: None,
            },
            PurgeScope::Urls(urls) => PurgeBody {
                purge_everything: None,
                files: Some(urls),
            },
        };

        let response = self
            .http
            .post(format!(
                "https://api.cloudflare.com/client/v4/zones/{}/purge_cache",
                self.zone_id
            ))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PurgeError::Status {
                status: status.as_u16(),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| PurgeError::Rejected(format!("unreadable purge response: {err}")))?;
        if payload.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(PurgeError::Rejected(
                payload
                    .get("errors")
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(())
    }
}

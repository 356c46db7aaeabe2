//! Frontend page revalidation client.
//!
//! Asks the statically-rendered frontend to regenerate pages after content
//! changes. The endpoint is slow when many pages regenerate at once, so this
//! client carries its own request timeout instead of the shared transport
//! default.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

const REVALIDATE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RevalidateError {
    #[error("revalidate transport error: {0}")]
    Transport(String),
    #[error("revalidate endpoint returned HTTP {status}")]
    Status { status: u16 },
}

impl From<reqwest::Error> for RevalidateError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Seam for the revalidation call; tests substitute fakes.
#[async_trait]
pub trait PageRevalidator: Send + Sync {
    async fn revalidate(&self, paths: &[String]) -> Result<(), RevalidateError>;
}

pub struct FrontendRevalidator {
    http: reqwest::Client,
    endpoint: String,
    secret: String,
}

impl FrontendRevalidator {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            secret: secret.into(),
        }
    }
}

#[derive(Serialize)]
struct RevalidateBody<'a> {
    paths: &'a [String],
}

#[async_trait]
impl PageRevalidator for FrontendRevalidator {
    async fn revalidate(&self, paths: &[String]) -> Result<(), RevalidateError> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(REVALIDATE_TIMEOUT)
            .bearer_auth(&self.secret)
            .json(&RevalidateBody { paths })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RevalidateError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

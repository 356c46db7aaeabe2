//! WebSub callback surface: hub verification handshake plus push notifications.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{info, warn};

use crate::application::subscription::VerificationMode;

use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VerificationQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.topic")]
    pub topic: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
    #[serde(rename = "hub.lease_seconds")]
    pub lease_seconds: Option<u64>,
}

/// Hub verification handshake. A recognized request is answered with the
/// exact challenge string; anything else gets 404 so the hub abandons it.
pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<VerificationQuery>,
) -> Response {
    let (Some(mode), Some(topic), Some(challenge)) = (query.mode, query.topic, query.challenge)
    else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let Some(mode) = VerificationMode::parse(&mode) else {
        warn!(
            target = "vodsync::http::websub",
            topic = %topic,
            "verification request with unsupported mode"
        );
        return StatusCode::NOT_FOUND.into_response();
    };

    match state
        .subscriptions
        .verify(mode, &topic, challenge, query.lease_seconds)
        .await
    {
        Ok(Some(challenge)) => (StatusCode::OK, challenge).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            warn!(
                target = "vodsync::http::websub",
                topic = %topic,
                error = %err,
                "verification handshake failed"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Push notification. Always acknowledged with 2xx unless the sync layer
/// itself fails; unparseable payloads are swallowed so the hub does not
/// retry them forever.
pub async fn notify(State(state): State<AppState>, body: String) -> Response {
    match state.webhooks.handle_notification(&body).await {
        Ok(outcome) => {
            if outcome.parse_failed {
                return StatusCode::NO_CONTENT.into_response();
            }
            // Enriched videos make the cached copies stale.
            for video_id in &outcome.video_ids {
                state.stores.invalidate_video(video_id);
            }
            if !outcome.video_ids.is_empty() {
                state.stores.invalidate_video_lists();
            }
            info!(
                target = "vodsync::http::websub",
                videos = outcome.video_ids.len(),
                added = outcome.videos_added,
                updated = outcome.videos_updated,
                "notification processed"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            warn!(
                target = "vodsync::http::websub",
                error = %err,
                "notification processing failed"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

//! Operator endpoints: manual sync control, full cache purge, and
//! subscription management. All of them sit behind the shared secret.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use time::OffsetDateTime;

use crate::domain::entities::{AuditLogRecord, PlaylistRecord, WebSubSubscriptionRecord};

use super::error::{ApiError, repo_to_api, sync_to_api};
use super::state::AppState;

const DEFAULT_RENEWAL_WINDOW_HOURS: u64 = 12;
const AUDIT_LIST_LIMIT: u32 = 50;

#[derive(Debug, Deserialize, Default)]
pub struct StartSyncRequest {
    #[serde(default)]
    pub forced: bool,
}

#[derive(Debug, Serialize)]
pub struct StartSyncResponse {
    pub started: bool,
    pub forced: bool,
}

/// Kick off a full sync in the background. The caller gets 202 immediately;
/// progress is visible through the status endpoint.
pub async fn start_sync(
    State(state): State<AppState>,
    body: Option<Json<StartSyncRequest>>,
) -> Result<Response, ApiError> {
    let request = body.map(|Json(inner)| inner).unwrap_or_default();

    // Best-effort conflict answer; the engine's lease is still the
    // authoritative guard once the task starts.
    let status = state.sync_status.load_status().await.map_err(repo_to_api)?;
    if status.currently_syncing && !request.forced {
        return Err(sync_to_api(crate::application::sync::SyncError::AlreadyRunning));
    }

    state
        .audit
        .record(
            "admin",
            "start_sync",
            serde_json::json!({ "forced": request.forced }),
        )
        .await;

    let engine = state.engine.clone();
    let forced = request.forced;
    tokio::spawn(async move {
        match engine.sync_all(forced).await {
            Ok(report) => {
                info!(
                    target = "vodsync::http::admin",
                    playlists = report.playlists_completed,
                    added = report.videos_added,
                    updated = report.videos_updated,
                    removed = report.videos_removed,
                    "manual sync finished"
                );
            }
            Err(err) => {
                error!(
                    target = "vodsync::http::admin",
                    error = %err,
                    "manual sync failed"
                );
            }
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartSyncResponse {
            started: true,
            forced,
        }),
    )
        .into_response())
}

pub async fn cancel_sync(State(state): State<AppState>) -> Response {
    state.engine.request_cancel();
    state
        .audit
        .record("admin", "cancel_sync", serde_json::Value::Null)
        .await;
    StatusCode::ACCEPTED.into_response()
}

/// Purge every cache layer in order and report the itemized outcome.
pub async fn purge_caches(State(state): State<AppState>) -> Response {
    let pagination_cleared = state.pagination.clear();
    let outcome = state.coordinator.purge_all("admin").await;

    state
        .audit
        .record(
            "admin",
            "purge_caches",
            serde_json::json!({
                "pagination_cleared": pagination_cleared,
                "fully_purged": outcome.fully_purged(),
                "errors": outcome.errors,
            }),
        )
        .await;

    let status = if outcome.fully_purged() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    (status, Json(outcome)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct RegisterPlaylistRequest {
    pub playlist_id: String,
    pub title: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Register a playlist for syncing (or retitle/toggle an existing one). The
/// slug is derived from the title; sync counters carry over on update.
pub async fn register_playlist(
    State(state): State<AppState>,
    Json(request): Json<RegisterPlaylistRequest>,
) -> Result<Response, ApiError> {
    if request.playlist_id.trim().is_empty() || request.title.trim().is_empty() {
        return Err(ApiError::bad_request(
            "playlist_id and title are required",
            None,
        ));
    }

    let existing = state
        .playlists
        .find_playlist(&request.playlist_id)
        .await
        .map_err(repo_to_api)?;
    let created = existing.is_none();

    let record = PlaylistRecord {
        playlist_id: request.playlist_id.clone(),
        title: request.title.clone(),
        slug: slug::slugify(&request.title),
        item_count: existing.as_ref().map_or(0, |p| p.item_count),
        is_active: request.is_active,
        sync_in_progress: false,
        last_sync_result: existing.as_ref().and_then(|p| p.last_sync_result),
        updated_at: OffsetDateTime::now_utc(),
    };
    state
        .playlists
        .upsert_playlist(record.clone())
        .await
        .map_err(repo_to_api)?;

    state
        .audit
        .record(
            "admin",
            "register_playlist",
            serde_json::json!({
                "playlist_id": record.playlist_id,
                "slug": record.slug,
                "is_active": record.is_active,
            }),
        )
        .await;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(record)).into_response())
}

pub async fn subscribe_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<Response, ApiError> {
    state
        .subscriptions
        .subscribe(&channel_id)
        .await
        .map_err(|err| {
            ApiError::new(
                StatusCode::BAD_GATEWAY,
                super::error::codes::SUBSCRIPTION,
                "subscription request failed",
                Some(err.to_string()),
            )
        })?;

    state
        .audit
        .record(
            "admin",
            "subscribe_channel",
            serde_json::json!({ "channel_id": channel_id }),
        )
        .await;

    Ok(StatusCode::ACCEPTED.into_response())
}

#[derive(Debug, Deserialize, Default)]
pub struct RenewRequest {
    pub window_hours: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct RenewResponse {
    pub renewed: u64,
}

pub async fn renew_subscriptions(
    State(state): State<AppState>,
    body: Option<Json<RenewRequest>>,
) -> Result<Json<RenewResponse>, ApiError> {
    let window_hours = body
        .and_then(|Json(inner)| inner.window_hours)
        .unwrap_or(DEFAULT_RENEWAL_WINDOW_HOURS);
    let window = std::time::Duration::from_secs(window_hours * 3600);

    let renewed = state
        .subscriptions
        .renew_expiring(window)
        .await
        .map_err(|err| {
            ApiError::new(
                StatusCode::BAD_GATEWAY,
                super::error::codes::SUBSCRIPTION,
                "subscription renewal sweep failed",
                Some(err.to_string()),
            )
        })?;

    state
        .audit
        .record(
            "admin",
            "renew_subscriptions",
            serde_json::json!({ "window_hours": window_hours, "renewed": renewed }),
        )
        .await;

    Ok(Json(RenewResponse { renewed }))
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
) -> Result<Json<Vec<WebSubSubscriptionRecord>>, ApiError> {
    let rows = state
        .subscription_repo
        .list_subscriptions()
        .await
        .map_err(repo_to_api)?;
    Ok(Json(rows))
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
) -> Result<Json<Vec<AuditLogRecord>>, ApiError> {
    let rows = state
        .audit
        .recent(AUDIT_LIST_LIMIT)
        .await
        .map_err(repo_to_api)?;
    Ok(Json(rows))
}

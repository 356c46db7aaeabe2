//! Privileged on-demand revalidation: clear the short-lived caches for a set
//! of frontend paths and ask the frontend to regenerate them.
//!
//! Every path is validated before any side effect runs; one bad path rejects
//! the whole request.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::ApiError;
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub secret: Option<String>,
    pub path: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub revalidated: Vec<String>,
    pub pagination_entries_cleared: usize,
    pub memory_entries_cleared: usize,
    pub frontend_notified: bool,
}

pub async fn revalidate_paths(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TriggerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let presented = bearer_token(&headers)
        .or(request.secret)
        .ok_or_else(ApiError::unauthorized)?;
    if !state.trigger.verify(&presented) {
        warn!(
            target = "vodsync::http::trigger",
            "revalidation request with invalid secret"
        );
        return Err(ApiError::unauthorized());
    }

    let mut raw_paths = request.paths;
    if let Some(single) = request.path {
        raw_paths.insert(0, single);
    }
    if raw_paths.is_empty() {
        return Err(ApiError::bad_request("no paths supplied", None));
    }

    // Validate the full batch before touching any cache layer.
    let mut paths = Vec::with_capacity(raw_paths.len());
    for raw in &raw_paths {
        let path = state
            .trigger
            .normalize_path(raw)
            .map_err(|reason| ApiError::bad_request("unparseable path", Some(reason)))?;
        if !state.trigger.path_allowed(&path) {
            return Err(ApiError::path_rejected(path));
        }
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    let mut pagination_cleared = 0;
    for path in &paths {
        pagination_cleared += state.pagination.invalidate_endpoint(path);
    }
    let memory_cleared = state.stores.clear().total();

    let frontend_notified = match state.revalidator.revalidate(&paths).await {
        Ok(()) => true,
        Err(err) => {
            warn!(
                target = "vodsync::http::trigger",
                error = %err,
                "frontend revalidation failed after local caches were cleared"
            );
            false
        }
    };

    state
        .audit
        .record(
            "trigger",
            "revalidate_paths",
            serde_json::json!({ "paths": paths, "frontend_notified": frontend_notified }),
        )
        .await;

    info!(
        target = "vodsync::http::trigger",
        paths = paths.len(),
        pagination_cleared,
        memory_cleared,
        frontend_notified,
        "on-demand revalidation completed"
    );

    Ok(Json(TriggerResponse {
        revalidated: paths,
        pagination_entries_cleared: pagination_cleared,
        memory_entries_cleared: memory_cleared,
        frontend_notified,
    }))
}

pub(super) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    raw.strip_prefix("Bearer ").map(|token| token.to_string())
}

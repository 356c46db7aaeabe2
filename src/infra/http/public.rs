use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::error::ErrorReport;
use crate::application::repos::VideoQueryFilter;
use crate::cache::page_key;
use crate::domain::entities::{PlaylistRecord, SyncHistoryRecord, SyncStatusRecord, VideoRecord};
use crate::domain::types::VideoTier;

use super::error::{ApiError, repo_to_api};
use super::state::AppState;

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 200;
const DEFAULT_HISTORY_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct VideoListQuery {
    pub tier: Option<VideoTier>,
    pub playlist: Option<String>,
    pub search: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct VideoListResponse {
    pub items: Vec<VideoRecord>,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    #[serde(flatten)]
    pub status: SyncStatusRecord,
    pub recent_runs: Vec<SyncHistoryRecord>,
}

pub async fn health(State(state): State<AppState>) -> Response {
    match state.db.as_ref() {
        Some(db) => match db.health_check().await {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(err) => {
                let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
                ErrorReport::from_error(
                    "infra::http::health",
                    StatusCode::SERVICE_UNAVAILABLE,
                    &err,
                )
                .attach(&mut response);
                response
            }
        },
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub async fn list_videos(
    State(state): State<AppState>,
    Query(query): Query<VideoListQuery>,
) -> Result<Response, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let tier_label = query.tier.map(VideoTier::as_str).unwrap_or("");
    let limit_label = limit.to_string();
    let key = page_key(
        "/api/videos",
        &[
            ("tier", tier_label),
            ("category", query.playlist.as_deref().unwrap_or("")),
            ("search", query.search.as_deref().unwrap_or("")),
            ("size", limit_label.as_str()),
        ],
    );

    if state.cache_config.enable_pagination_cache
        && let Some(body) = state.pagination.get(&key)
    {
        debug!(target = "vodsync::http::videos", key = %key, "pagination cache hit");
        return Ok(Json(body).into_response());
    }

    let filter = VideoQueryFilter {
        tier: query.tier,
        playlist_id: query.playlist,
        search: query.search,
    };

    let list_key = list_cache_key(&filter, limit);
    let cached_items = state
        .cache_config
        .enable_memory_cache
        .then(|| state.stores.get_video_list(list_key))
        .flatten();

    let items = match cached_items {
        Some(items) => items,
        None => {
            let items = state
                .videos
                .list_videos(&filter, limit)
                .await
                .map_err(repo_to_api)?;
            if state.cache_config.enable_memory_cache {
                state.stores.set_video_list(list_key, items.clone());
            }
            items
        }
    };
    let total = state.videos.count_videos(&filter).await.map_err(repo_to_api)?;

    let payload = VideoListResponse { items, total };
    if state.cache_config.enable_pagination_cache
        && let Ok(body) = serde_json::to_value(&payload)
    {
        state.pagination.put(key, body);
    }

    Ok(Json(payload).into_response())
}

pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<VideoRecord>, ApiError> {
    if state.cache_config.enable_memory_cache
        && let Some(record) = state.stores.get_video(&video_id)
    {
        return Ok(Json(record));
    }

    let record = state
        .videos
        .find_video(&video_id)
        .await
        .map_err(repo_to_api)?
        .ok_or_else(|| ApiError::not_found("video not found"))?;

    if state.cache_config.enable_memory_cache {
        state.stores.set_video(record.clone());
    }

    Ok(Json(record))
}

pub async fn list_playlists(
    State(state): State<AppState>,
) -> Result<Json<Vec<PlaylistRecord>>, ApiError> {
    if state.cache_config.enable_memory_cache
        && let Some(records) = state.stores.get_playlists()
    {
        return Ok(Json(records));
    }

    let records = state
        .playlists
        .list_active_playlists()
        .await
        .map_err(repo_to_api)?;

    if state.cache_config.enable_memory_cache {
        state.stores.set_playlists(records.clone());
    }

    Ok(Json(records))
}

pub async fn sync_status(
    State(state): State<AppState>,
) -> Result<Json<SyncStatusResponse>, ApiError> {
    let status = state.sync_status.load_status().await.map_err(repo_to_api)?;
    let recent_runs = state
        .sync_history
        .list_recent_history(DEFAULT_HISTORY_LIMIT)
        .await
        .map_err(repo_to_api)?;

    Ok(Json(SyncStatusResponse {
        status,
        recent_runs,
    }))
}

pub async fn cache_history(State(state): State<AppState>) -> Result<Response, ApiError> {
    let rows = state
        .cache_history
        .list_recent_cache_history(DEFAULT_HISTORY_LIMIT)
        .await
        .map_err(repo_to_api)?;
    Ok(Json(rows).into_response())
}

pub async fn webhook_stats(State(state): State<AppState>) -> Response {
    Json(state.webhooks.stats()).into_response()
}

/// Stable memoization key for a list query; feeds the in-process list cache.
fn list_cache_key(filter: &VideoQueryFilter, limit: u32) -> u64 {
    let mut hasher = DefaultHasher::new();
    filter.tier.map(VideoTier::as_str).hash(&mut hasher);
    filter.playlist_id.hash(&mut hasher);
    filter.search.hash(&mut hasher);
    limit.hash(&mut hasher);
    hasher.finish()
}

mod admin;
pub mod error;
mod middleware;
mod public;
mod state;
mod trigger;
mod webhook;

pub use state::{AppState, TriggerGuard};

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

/// Assemble the full HTTP surface over the shared state.
pub fn build_router(state: AppState) -> Router {
    let admin_state = state.clone();

    let admin_routes = Router::new()
        .route("/api/admin/sync", post(admin::start_sync))
        .route("/api/admin/sync/cancel", post(admin::cancel_sync))
        .route("/api/admin/cache/purge", post(admin::purge_caches))
        .route("/api/admin/playlists", post(admin::register_playlist))
        .route(
            "/api/admin/subscriptions",
            get(admin::list_subscriptions).post(admin::renew_subscriptions),
        )
        .route(
            "/api/admin/subscriptions/{channel_id}",
            post(admin::subscribe_channel),
        )
        .route("/api/admin/audit", get(admin::list_audit_logs))
        .layer(axum_middleware::from_fn_with_state(
            admin_state,
            middleware::admin_auth,
        ));

    Router::new()
        .route("/healthz", get(public::health))
        .route("/api/videos", get(public::list_videos))
        .route("/api/videos/{video_id}", get(public::get_video))
        .route("/api/playlists", get(public::list_playlists))
        .route("/api/sync/status", get(public::sync_status))
        .route("/api/cache/history", get(public::cache_history))
        .route("/api/webhooks/stats", get(public::webhook_stats))
        .route(
            "/api/webhooks/youtube",
            get(webhook::verify).post(webhook::notify),
        )
        .route("/api/revalidate", post(trigger::revalidate_paths))
        .merge(admin_routes)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}

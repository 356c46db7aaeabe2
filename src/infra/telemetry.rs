use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "vodsync_platform_list_calls_total",
            Unit::Count,
            "Total playlist-item list calls made to the video platform."
        );
        describe_counter!(
            "vodsync_platform_detail_calls_total",
            Unit::Count,
            "Total batched video-detail calls made to the video platform."
        );
        describe_counter!(
            "vodsync_webhook_received_total",
            Unit::Count,
            "Total webhook notifications received."
        );
        describe_counter!(
            "vodsync_webhook_processed_total",
            Unit::Count,
            "Total distinct video ids synced from webhook notifications."
        );
        describe_counter!(
            "vodsync_webhook_parse_failure_total",
            Unit::Count,
            "Total webhook payloads that could not be parsed as Atom XML."
        );
        describe_counter!(
            "vodsync_sync_runs_total",
            Unit::Count,
            "Total full sync runs started."
        );
        describe_counter!(
            "vodsync_cache_pagination_hit_total",
            Unit::Count,
            "Total pagination cache hits."
        );
        describe_counter!(
            "vodsync_cache_pagination_miss_total",
            Unit::Count,
            "Total pagination cache misses."
        );
        describe_histogram!(
            "vodsync_sync_playlist_ms",
            Unit::Milliseconds,
            "Per-playlist sync latency in milliseconds."
        );
        describe_histogram!(
            "vodsync_cache_purge_ms",
            Unit::Milliseconds,
            "End-to-end multi-tier cache purge latency in milliseconds."
        );
    });
}

use std::process;
use std::sync::Arc;

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::CronStream;
use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

use vodsync::application::audit::AuditService;
use vodsync::application::error::AppError;
use vodsync::application::jobs::{
    ReconcileContext, RenewSubscriptionsContext, ScheduledSyncContext, process_reconcile_job,
    process_renewal_job, process_scheduled_sync_job, reconcile_schedule, renewal_schedule,
    scheduled_sync_schedule,
};
use vodsync::application::retry::RetryPolicy;
use vodsync::application::subscription::{SubscriptionConfig, SubscriptionManager};
use vodsync::application::sync::{MembershipIndexBuilder, SyncEngine};
use vodsync::application::webhook::WebhookService;
use vodsync::cache::{CacheConfig, CacheCoordinator, MemoryStores, PaginationCache};
use vodsync::config;
use vodsync::infra::cdn::{CloudflarePurger, EdgePurger, PurgeError, PurgeScope};
use vodsync::infra::db::PostgresRepositories;
use vodsync::infra::error::InfraError;
use vodsync::infra::http::{self, AppState, TriggerGuard};
use vodsync::infra::platform::PlatformClient;
use vodsync::infra::revalidate::{FrontendRevalidator, PageRevalidator, RevalidateError};
use vodsync::infra::telemetry;
use vodsync::infra::websub::HubClient;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let database_url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| AppError::validation("database.url is required for serve"))?;
    let api_key = settings
        .platform
        .api_key
        .clone()
        .ok_or_else(|| AppError::validation("platform.api_key is required for serve"))?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    let repositories = Arc::new(PostgresRepositories::new(pool));

    let http_client = reqwest::Client::new();
    let platform = Arc::new(PlatformClient::new(
        http_client.clone(),
        settings.platform.base_url.clone(),
        api_key,
    ));

    let policy = RetryPolicy {
        max_attempts: settings.sync.retry_max_attempts.get(),
        ..RetryPolicy::default()
    };
    let membership = MembershipIndexBuilder::new(
        platform.clone(),
        policy,
        settings.sync.playlist_delay,
    );
    let engine = Arc::new(SyncEngine::new(
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
        platform.clone(),
        membership,
        policy,
    ));
    let webhooks = Arc::new(WebhookService::new(engine.clone()));

    let callback_url = settings
        .websub
        .callback_url
        .clone()
        .unwrap_or_else(|| format!("http://{}/api/webhooks/youtube", settings.server.addr));
    let hub = Arc::new(HubClient::new(
        http_client.clone(),
        settings.websub.hub_url.clone(),
    ));
    let subscriptions = Arc::new(SubscriptionManager::new(
        repositories.clone(),
        hub,
        SubscriptionConfig {
            topic_base: settings.websub.topic_base.clone(),
            callback_url,
            lease: settings.websub.lease,
        },
    ));

    let cache_config = CacheConfig::from(&settings.cache);
    let stores = Arc::new(MemoryStores::new(&cache_config));
    let pagination = Arc::new(PaginationCache::new(cache_config.pagination_ttl()));
    let purger: Arc<dyn EdgePurger> = match (
        settings.cdn.zone_id.as_ref(),
        settings.cdn.api_token.as_ref(),
    ) {
        (Some(zone_id), Some(api_token)) => Arc::new(CloudflarePurger::new(
            http_client.clone(),
            zone_id.clone(),
            api_token.clone(),
        )),
        _ => {
            warn!(
                target = "vodsync::startup",
                "cdn credentials missing, edge purges are no-ops"
            );
            Arc::new(NoopPurger)
        }
    };
    let revalidator: Arc<dyn PageRevalidator> = match (
        settings.revalidate.endpoint.as_ref(),
        settings.revalidate.secret.as_ref(),
    ) {
        (Some(endpoint), Some(secret)) => Arc::new(FrontendRevalidator::new(
            http_client.clone(),
            endpoint.clone(),
            secret.clone(),
        )),
        _ => {
            warn!(
                target = "vodsync::startup",
                "revalidation endpoint missing, page regeneration is a no-op"
            );
            Arc::new(NoopRevalidator)
        }
    };
    let coordinator = Arc::new(CacheCoordinator::new(
        stores.clone(),
        purger,
        revalidator.clone(),
        repositories.clone(),
        &cache_config,
    ));

    let audit = Arc::new(AuditService::new(repositories.clone()));
    let trigger = Arc::new(TriggerGuard::new(
        settings.trigger.secret.as_deref(),
        settings.trigger.allowed_prefixes.clone(),
    ));

    let state = AppState {
        engine: engine.clone(),
        webhooks,
        subscriptions: subscriptions.clone(),
        coordinator,
        revalidator,
        pagination,
        stores,
        audit,
        videos: repositories.clone(),
        playlists: repositories.clone(),
        sync_status: repositories.clone(),
        sync_history: repositories.clone(),
        subscription_repo: repositories.clone(),
        cache_history: repositories.clone(),
        db: Some(repositories.clone()),
        trigger,
        cache_config,
    };

    bootstrap_subscriptions(&settings, subscriptions.clone());
    spawn_job_monitor(&settings, engine, subscriptions, repositories);

    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "vodsync::startup",
        addr = %settings.server.addr,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

/// Ensure every configured channel has a subscription request in flight.
/// Failures are logged; the renewal cron keeps retrying.
fn bootstrap_subscriptions(
    settings: &config::Settings,
    subscriptions: Arc<SubscriptionManager>,
) {
    let channels = settings.websub.channels.clone();
    if channels.is_empty() {
        return;
    }
    tokio::spawn(async move {
        for channel_id in channels {
            if let Err(err) = subscriptions.subscribe(&channel_id).await {
                warn!(
                    target = "vodsync::startup",
                    channel_id = %channel_id,
                    error = %err,
                    "startup subscription failed"
                );
            }
        }
    });
}

fn spawn_job_monitor(
    settings: &config::Settings,
    engine: Arc<SyncEngine>,
    subscriptions: Arc<SubscriptionManager>,
    repositories: Arc<PostgresRepositories>,
) {
    let sync_worker = WorkerBuilder::new("scheduled-sync-worker")
        .data(ScheduledSyncContext { engine })
        .backend(CronStream::new(scheduled_sync_schedule(
            &settings.sync.cron,
        )))
        .build_fn(process_scheduled_sync_job);

    let renewal_worker = WorkerBuilder::new("subscription-renewal-worker")
        .data(RenewSubscriptionsContext { subscriptions })
        .backend(CronStream::new(renewal_schedule()))
        .build_fn(process_renewal_job);

    let reconcile_worker = WorkerBuilder::new("reconcile-counts-worker")
        .data(ReconcileContext {
            playlists: repositories.clone(),
            videos: repositories,
        })
        .backend(CronStream::new(reconcile_schedule()))
        .build_fn(process_reconcile_job);

    let monitor = Monitor::new()
        .register(sync_worker)
        .register(renewal_worker)
        .register(reconcile_worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    });
}

async fn shutdown_signal(drain_window: std::time::Duration) {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("shutdown requested via ctrl-c"),
        _ = terminate => info!("shutdown requested via SIGTERM"),
    }

    // In-flight requests get the configured drain window, then the process
    // exits regardless.
    tokio::spawn(async move {
        tokio::time::sleep(drain_window).await;
        warn!(
            drain_secs = drain_window.as_secs(),
            "graceful shutdown window elapsed, exiting"
        );
        process::exit(0);
    });
}

struct NoopPurger;

#[async_trait::async_trait]
impl EdgePurger for NoopPurger {
    async fn purge(&self, _scope: &PurgeScope) -> Result<(), PurgeError> {
        Ok(())
    }
}

struct NoopRevalidator;

#[async_trait::async_trait]
impl PageRevalidator for NoopRevalidator {
    async fn revalidate(&self, _paths: &[String]) -> Result<(), RevalidateError> {
        Ok(())
    }
}

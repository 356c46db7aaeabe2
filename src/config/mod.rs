//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vodsync";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_PLATFORM_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const DEFAULT_HUB_URL: &str = "https://pubsubhubbub.appspot.com/subscribe";
const DEFAULT_TOPIC_BASE: &str = "https://www.youtube.com/xml/feeds/videos.xml";
const DEFAULT_LEASE_SECONDS: u64 = 432_000;
const DEFAULT_SYNC_CRON: &str = "0 0 */6 * * *";
const DEFAULT_PLAYLIST_DELAY_MS: u64 = 500;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Command-line arguments for the vodsync binary.
#[derive(Debug, Parser)]
#[command(name = "vodsync", version, about = "Video catalog sync server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VODSYNC_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the vodsync HTTP service and background workers.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the platform API key.
    #[arg(long = "platform-api-key", value_name = "KEY")]
    pub platform_api_key: Option<String>,

    /// Override the public callback URL announced to the hub.
    #[arg(long = "websub-callback-url", value_name = "URL")]
    pub websub_callback_url: Option<String>,

    /// Override the full-sync cron expression.
    #[arg(long = "sync-cron", value_name = "EXPR")]
    pub sync_cron: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub platform: PlatformSettings,
    pub websub: WebSubSettings,
    pub cdn: CdnSettings,
    pub revalidate: RevalidateSettings,
    pub trigger: TriggerSettings,
    pub cache: CacheSettings,
    pub sync: SyncSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct WebSubSettings {
    pub hub_url: String,
    pub topic_base: String,
    pub callback_url: Option<String>,
    pub lease: Duration,
    /// Channels to keep subscribed; the renewal sweep covers them.
    pub channels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CdnSettings {
    pub zone_id: Option<String>,
    pub api_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RevalidateSettings {
    pub endpoint: Option<String>,
    pub secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TriggerSettings {
    pub secret: Option<String>,
    pub allowed_prefixes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable_memory_cache: bool,
    pub enable_pagination_cache: bool,
    pub video_limit: usize,
    pub list_limit: usize,
    pub memory_ttl_secs: u64,
    pub pagination_ttl_secs: u64,
    pub cdn_settle_ms: u64,
    pub isr_settle_ms: u64,
    pub revalidate_paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub cron: String,
    pub playlist_delay: Duration,
    pub retry_max_attempts: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("VODSYNC").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    platform: RawPlatformSettings,
    websub: RawWebSubSettings,
    cdn: RawCdnSettings,
    revalidate: RawRevalidateSettings,
    trigger: RawTriggerSettings,
    cache: RawCacheSettings,
    sync: RawSyncSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(key) = overrides.platform_api_key.as_ref() {
            self.platform.api_key = Some(key.clone());
        }
        if let Some(url) = overrides.websub_callback_url.as_ref() {
            self.websub.callback_url = Some(url.clone());
        }
        if let Some(cron) = overrides.sync_cron.as_ref() {
            self.sync.cron = Some(cron.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            platform,
            websub,
            cdn,
            revalidate,
            trigger,
            cache,
            sync,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            platform: build_platform_settings(platform),
            websub: build_websub_settings(websub)?,
            cdn: CdnSettings {
                zone_id: non_empty(cdn.zone_id),
                api_token: non_empty(cdn.api_token),
            },
            revalidate: RevalidateSettings {
                endpoint: non_empty(revalidate.endpoint),
                secret: non_empty(revalidate.secret),
            },
            trigger: build_trigger_settings(trigger),
            cache: build_cache_settings(cache),
            sync: build_sync_settings(sync)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_empty(database.url);

    let max = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = NonZeroU32::new(max)
        .ok_or_else(|| LoadError::invalid("database.max_connections", "must be greater than zero"))?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_platform_settings(platform: RawPlatformSettings) -> PlatformSettings {
    PlatformSettings {
        api_key: non_empty(platform.api_key),
        base_url: platform
            .base_url
            .unwrap_or_else(|| DEFAULT_PLATFORM_BASE_URL.to_string()),
    }
}

fn build_websub_settings(websub: RawWebSubSettings) -> Result<WebSubSettings, LoadError> {
    let lease_seconds = websub.lease_seconds.unwrap_or(DEFAULT_LEASE_SECONDS);
    if lease_seconds == 0 {
        return Err(LoadError::invalid(
            "websub.lease_seconds",
            "must be greater than zero",
        ));
    }

    Ok(WebSubSettings {
        hub_url: websub.hub_url.unwrap_or_else(|| DEFAULT_HUB_URL.to_string()),
        topic_base: websub
            .topic_base
            .unwrap_or_else(|| DEFAULT_TOPIC_BASE.to_string()),
        callback_url: non_empty(websub.callback_url),
        lease: Duration::from_secs(lease_seconds),
        channels: websub.channels.unwrap_or_default(),
    })
}

fn build_trigger_settings(trigger: RawTriggerSettings) -> TriggerSettings {
    TriggerSettings {
        secret: non_empty(trigger.secret),
        allowed_prefixes: trigger
            .allowed_prefixes
            .unwrap_or_else(|| vec!["/api/".to_string(), "/videos".to_string()]),
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> CacheSettings {
    let defaults = crate::cache::CacheConfig::default();
    CacheSettings {
        enable_memory_cache: cache.enable_memory_cache.unwrap_or(defaults.enable_memory_cache),
        enable_pagination_cache: cache
            .enable_pagination_cache
            .unwrap_or(defaults.enable_pagination_cache),
        video_limit: cache.video_limit.unwrap_or(defaults.video_limit),
        list_limit: cache.list_limit.unwrap_or(defaults.list_limit),
        memory_ttl_secs: cache.memory_ttl_secs.unwrap_or(defaults.memory_ttl_secs),
        pagination_ttl_secs: cache
            .pagination_ttl_secs
            .unwrap_or(defaults.pagination_ttl_secs),
        cdn_settle_ms: cache.cdn_settle_ms.unwrap_or(defaults.cdn_settle_ms),
        isr_settle_ms: cache.isr_settle_ms.unwrap_or(defaults.isr_settle_ms),
        revalidate_paths: cache
            .revalidate_paths
            .unwrap_or(defaults.revalidate_paths),
    }
}

fn build_sync_settings(sync: RawSyncSettings) -> Result<SyncSettings, LoadError> {
    let attempts = sync.retry_max_attempts.unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS);
    let retry_max_attempts = NonZeroU32::new(attempts)
        .ok_or_else(|| LoadError::invalid("sync.retry_max_attempts", "must be greater than zero"))?;

    Ok(SyncSettings {
        cron: sync.cron.unwrap_or_else(|| DEFAULT_SYNC_CRON.to_string()),
        playlist_delay: Duration::from_millis(
            sync.playlist_delay_ms.unwrap_or(DEFAULT_PLAYLIST_DELAY_MS),
        ),
        retry_max_attempts,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPlatformSettings {
    api_key: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWebSubSettings {
    hub_url: Option<String>,
    topic_base: Option<String>,
    callback_url: Option<String>,
    lease_seconds: Option<u64>,
    channels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCdnSettings {
    zone_id: Option<String>,
    api_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRevalidateSettings {
    endpoint: Option<String>,
    secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTriggerSettings {
    secret: Option<String>,
    allowed_prefixes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_memory_cache: Option<bool>,
    enable_pagination_cache: Option<bool>,
    video_limit: Option<usize>,
    list_limit: Option<usize>,
    memory_ttl_secs: Option<u64>,
    pagination_ttl_secs: Option<u64>,
    cdn_settle_ms: Option<u64>,
    isr_settle_ms: Option<u64>,
    revalidate_paths: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSyncSettings {
    cron: Option<String>,
    playlist_delay_ms: Option<u64>,
    retry_max_attempts: Option<u32>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn defaults_cover_every_section() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert_eq!(settings.platform.base_url, DEFAULT_PLATFORM_BASE_URL);
        assert_eq!(settings.websub.lease, Duration::from_secs(DEFAULT_LEASE_SECONDS));
        assert!(settings.database.url.is_none());
        assert!(settings.cdn.zone_id.is_none());
        assert_eq!(settings.sync.retry_max_attempts.get(), 3);
        assert_eq!(settings.cache.pagination_ttl_secs, 60);
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn blank_secrets_read_as_absent() {
        let mut raw = RawSettings::default();
        raw.trigger.secret = Some("   ".to_string());
        raw.cdn.zone_id = Some(String::new());

        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(settings.trigger.secret.is_none());
        assert!(settings.cdn.zone_id.is_none());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(0);
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key: "server.port", .. })
        ));
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "vodsync",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--database-url",
            "postgres://override",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(
                    serve.overrides.database_url.as_deref(),
                    Some("postgres://override")
                );
            }
        }
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["vodsync"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }
}

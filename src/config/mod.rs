//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{ChainArgs, CliArgs, Command, DatabaseOverride, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "tripwire";
const ENV_PREFIX: &str = "TRIPWIRE";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_PORT: u16 = 3101;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_SOFT_DELETE_COLUMN: &str = "isDeleted";
const DEFAULT_ORIGIN_BASE_URL: &str = "http://127.0.0.1:3000/";
const DEFAULT_ORIGIN_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CACHE_STORAGE_LIMIT: u64 = 10_000;
const DEFAULT_CACHE_PAGE_LIMIT: u64 = 2_000;
const DEFAULT_CACHE_TTL_SECS: u64 = 3_600;
const DEFAULT_TRACKER_DEADLINE_MS: u64 = 10_000;
const DEFAULT_TRACKER_LAYER_CONCURRENCY: u64 = 16;
const DEFAULT_AUTO_CONSUME_INTERVAL_MS: u64 = 5_000;
const DEFAULT_CONSUME_BATCH_LIMIT: u64 = 100;
const DEFAULT_RETRY_ATTEMPTS: u64 = 3;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub origin: OriginSettings,
    pub cache: CacheSettings,
    pub tracker: TrackerSettings,
    pub invalidation: InvalidationSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub admin_addr: SocketAddr,
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
    /// Boolean column marking soft-deleted rows, shared by every table.
    pub soft_delete_column: String,
}

#[derive(Debug, Clone)]
pub struct OriginSettings {
    pub base_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable_entity_cache: bool,
    pub enable_page_cache: bool,
    pub storage_limit: NonZeroUsize,
    pub page_limit: NonZeroUsize,
    /// `None` caches fetched entities without expiry.
    pub default_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// `None` lets a resolution run unbounded.
    pub deadline: Option<Duration>,
    pub layer_concurrency: NonZeroUsize,
    pub include_deleted: bool,
}

#[derive(Debug, Clone)]
pub struct InvalidationSettings {
    pub auto_consume_interval: Duration,
    pub consume_batch_limit: NonZeroUsize,
    pub retry_attempts: NonZeroU32,
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

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Chain(args)) => {
            raw.apply_database_override(&args.database);
            if args.include_deleted {
                raw.tracker.include_deleted = Some(true);
            }
        }
        Some(Command::Relations) => {}
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
    origin: RawOriginSettings,
    cache: RawCacheSettings,
    tracker: RawTrackerSettings,
    invalidation: RawInvalidationSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_database_override(&overrides.database);
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
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
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(url) = overrides.origin_base_url.as_ref() {
            self.origin.base_url = Some(url.clone());
        }
        if let Some(interval) = overrides.auto_consume_interval_ms {
            self.invalidation.auto_consume_interval_ms = Some(interval);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            origin,
            cache,
            tracker,
            invalidation,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            origin: build_origin_settings(origin)?,
            cache: build_cache_settings(cache)?,
            tracker: build_tracker_settings(tracker)?,
            invalidation: build_invalidation_settings(invalidation)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;

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
        admin_addr,
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
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    let soft_delete_column = database
        .soft_delete_column
        .unwrap_or_else(|| DEFAULT_SOFT_DELETE_COLUMN.to_string());
    if soft_delete_column.trim().is_empty() {
        return Err(LoadError::invalid(
            "database.soft_delete_column",
            "column name must not be empty",
        ));
    }

    Ok(DatabaseSettings {
        url,
        max_connections,
        soft_delete_column,
    })
}

fn build_origin_settings(origin: RawOriginSettings) -> Result<OriginSettings, LoadError> {
    let raw_url = origin
        .base_url
        .unwrap_or_else(|| DEFAULT_ORIGIN_BASE_URL.to_string());
    let base_url = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("origin.base_url", format!("invalid URL: {err}")))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "origin.base_url",
            "scheme must be http or https",
        ));
    }

    let timeout_ms = origin.timeout_ms.unwrap_or(DEFAULT_ORIGIN_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "origin.timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(OriginSettings {
        base_url,
        timeout: Duration::from_millis(timeout_ms),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let storage_limit = non_zero_usize(
        cache.storage_limit.unwrap_or(DEFAULT_CACHE_STORAGE_LIMIT),
        "cache.storage_limit",
    )?;
    let page_limit = non_zero_usize(
        cache.page_limit.unwrap_or(DEFAULT_CACHE_PAGE_LIMIT),
        "cache.page_limit",
    )?;
    // Zero disables expiry.
    let default_ttl_seconds = Some(cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS))
        .filter(|seconds| *seconds > 0);

    Ok(CacheSettings {
        enable_entity_cache: cache.enable_entity_cache.unwrap_or(true),
        enable_page_cache: cache.enable_page_cache.unwrap_or(true),
        storage_limit,
        page_limit,
        default_ttl_seconds,
    })
}

fn build_tracker_settings(tracker: RawTrackerSettings) -> Result<TrackerSettings, LoadError> {
    let deadline_ms = tracker.deadline_ms.unwrap_or(DEFAULT_TRACKER_DEADLINE_MS);
    let deadline = (deadline_ms > 0).then(|| Duration::from_millis(deadline_ms));

    let layer_concurrency = non_zero_usize(
        tracker
            .layer_concurrency
            .unwrap_or(DEFAULT_TRACKER_LAYER_CONCURRENCY),
        "tracker.layer_concurrency",
    )?;

    Ok(TrackerSettings {
        deadline,
        layer_concurrency,
        include_deleted: tracker.include_deleted.unwrap_or(false),
    })
}

fn build_invalidation_settings(
    invalidation: RawInvalidationSettings,
) -> Result<InvalidationSettings, LoadError> {
    let interval_ms = invalidation
        .auto_consume_interval_ms
        .unwrap_or(DEFAULT_AUTO_CONSUME_INTERVAL_MS);
    if interval_ms == 0 {
        return Err(LoadError::invalid(
            "invalidation.auto_consume_interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(InvalidationSettings {
        auto_consume_interval: Duration::from_millis(interval_ms),
        consume_batch_limit: non_zero_usize(
            invalidation
                .consume_batch_limit
                .unwrap_or(DEFAULT_CONSUME_BATCH_LIMIT),
            "invalidation.consume_batch_limit",
        )?,
        retry_attempts: non_zero_u32(
            invalidation.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
            "invalidation.retry_attempts",
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    admin_host: Option<String>,
    admin_port: Option<u16>,
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
    soft_delete_column: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOriginSettings {
    base_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_entity_cache: Option<bool>,
    enable_page_cache: Option<bool>,
    storage_limit: Option<u64>,
    page_limit: Option<u64>,
    default_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTrackerSettings {
    deadline_ms: Option<u64>,
    layer_concurrency: Option<u64>,
    include_deleted: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawInvalidationSettings {
    auto_consume_interval_ms: Option<u64>,
    consume_batch_limit: Option<u64>,
    retry_attempts: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

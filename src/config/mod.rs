//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::HashMap,
    net::SocketAddr,
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::monitor::{MonitorConfig, Threshold};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "strato";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_REDIS_OP_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_MEMORY_ENTRY_LIMIT: usize = 1024;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_PROBE_TTL_SECS: u64 = 10;
const DEFAULT_WARMUP_CONCURRENCY: usize = 4;
const DEFAULT_WARMUP_BUDGET_SECS: u64 = 30;
const DEFAULT_RETENTION_LIMIT: usize = 500;

/// Command-line arguments for the Strato binary.
#[derive(Debug, Parser)]
#[command(name = "strato", version, about = "Strato cache service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STRATO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Strato HTTP service.
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

    /// Override the Redis connection URL.
    #[arg(long = "redis-url", value_name = "URL")]
    pub redis_url: Option<String>,

    /// Override the per-operation Redis timeout.
    #[arg(long = "redis-op-timeout-ms", value_name = "MILLIS")]
    pub redis_op_timeout_ms: Option<u64>,

    /// Override the in-process tier entry limit.
    #[arg(long = "cache-memory-entry-limit", value_name = "COUNT")]
    pub cache_memory_entry_limit: Option<usize>,

    /// Override the default cache entry TTL.
    #[arg(long = "cache-default-ttl-seconds", value_name = "SECONDS")]
    pub cache_default_ttl_seconds: Option<u64>,

    /// Override the warmup worker pool size.
    #[arg(long = "warmup-concurrency", value_name = "COUNT")]
    pub warmup_concurrency: Option<usize>,

    /// Override the warmup wall-clock budget.
    #[arg(long = "warmup-budget-seconds", value_name = "SECONDS")]
    pub warmup_budget_seconds: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub redis: RedisSettings,
    pub cache: CacheSettings,
    pub warmup: WarmupSettings,
    pub monitor: MonitorConfig,
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
pub struct RedisSettings {
    pub url: String,
    pub op_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub memory_entry_limit: usize,
    pub default_ttl: Duration,
    pub probe_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct WarmupSettings {
    pub concurrency: NonZeroUsize,
    pub budget: Duration,
    /// Hot keys warmed at startup; each is refreshed from the distributed
    /// tier under its own TTL (or the cache default when unset).
    pub keys: Vec<WarmupKeySettings>,
}

#[derive(Debug, Clone)]
pub struct WarmupKeySettings {
    pub key: String,
    pub ttl: Option<Duration>,
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

    builder = builder.add_source(Environment::with_prefix("STRATO").separator("__"));

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
    redis: RawRedisSettings,
    cache: RawCacheSettings,
    warmup: RawWarmupSettings,
    monitor: RawMonitorSettings,
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
        if let Some(url) = overrides.redis_url.as_ref() {
            self.redis.url = Some(url.clone());
        }
        if let Some(millis) = overrides.redis_op_timeout_ms {
            self.redis.op_timeout_ms = Some(millis);
        }
        if let Some(limit) = overrides.cache_memory_entry_limit {
            self.cache.memory_entry_limit = Some(limit);
        }
        if let Some(seconds) = overrides.cache_default_ttl_seconds {
            self.cache.default_ttl_seconds = Some(seconds);
        }
        if let Some(count) = overrides.warmup_concurrency {
            self.warmup.concurrency = Some(count);
        }
        if let Some(seconds) = overrides.warmup_budget_seconds {
            self.warmup.budget_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            redis,
            cache,
            warmup,
            monitor,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            redis: build_redis_settings(redis)?,
            cache: build_cache_settings(cache)?,
            warmup: build_warmup_settings(warmup)?,
            monitor: build_monitor_config(monitor)?,
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

fn build_redis_settings(redis: RawRedisSettings) -> Result<RedisSettings, LoadError> {
    let url = redis
        .url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());

    let millis = redis.op_timeout_ms.unwrap_or(DEFAULT_REDIS_OP_TIMEOUT_MS);
    if millis == 0 {
        return Err(LoadError::invalid(
            "redis.op_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(RedisSettings {
        url,
        op_timeout: Duration::from_millis(millis),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let memory_entry_limit = cache.memory_entry_limit.unwrap_or(DEFAULT_MEMORY_ENTRY_LIMIT);
    if memory_entry_limit == 0 {
        return Err(LoadError::invalid(
            "cache.memory_entry_limit",
            "must be greater than zero",
        ));
    }

    let default_ttl_secs = cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if default_ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.default_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let probe_ttl_secs = cache.probe_ttl_seconds.unwrap_or(DEFAULT_PROBE_TTL_SECS);
    if probe_ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.probe_ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        memory_entry_limit,
        default_ttl: Duration::from_secs(default_ttl_secs),
        probe_ttl: Duration::from_secs(probe_ttl_secs),
    })
}

fn build_warmup_settings(warmup: RawWarmupSettings) -> Result<WarmupSettings, LoadError> {
    let concurrency = warmup.concurrency.unwrap_or(DEFAULT_WARMUP_CONCURRENCY);
    let concurrency = NonZeroUsize::new(concurrency)
        .ok_or_else(|| LoadError::invalid("warmup.concurrency", "must be greater than zero"))?;

    let budget_secs = warmup.budget_seconds.unwrap_or(DEFAULT_WARMUP_BUDGET_SECS);
    if budget_secs == 0 {
        return Err(LoadError::invalid(
            "warmup.budget_seconds",
            "must be greater than zero",
        ));
    }

    let mut keys = Vec::with_capacity(warmup.keys.len());
    for raw_key in warmup.keys {
        let key = raw_key.key.trim().to_string();
        if key.is_empty() {
            return Err(LoadError::invalid("warmup.keys", "key must not be empty"));
        }
        keys.push(WarmupKeySettings {
            key,
            ttl: raw_key.ttl_seconds.map(Duration::from_secs),
        });
    }

    Ok(WarmupSettings {
        concurrency,
        budget: Duration::from_secs(budget_secs),
        keys,
    })
}

fn build_monitor_config(monitor: RawMonitorSettings) -> Result<MonitorConfig, LoadError> {
    let retention_limit = monitor.retention_limit.unwrap_or(DEFAULT_RETENTION_LIMIT);
    if retention_limit == 0 {
        return Err(LoadError::invalid(
            "monitor.retention_limit",
            "must be greater than zero",
        ));
    }

    let mut thresholds = HashMap::with_capacity(monitor.thresholds.len());
    for (metric, raw) in monitor.thresholds {
        let threshold = Threshold::new(raw.warning, raw.critical).map_err(|err| {
            LoadError::invalid("monitor.thresholds", format!("`{metric}`: {err}"))
        })?;
        thresholds.insert(metric, threshold);
    }

    Ok(MonitorConfig {
        retention_limit,
        thresholds,
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
struct RawRedisSettings {
    url: Option<String>,
    op_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    memory_entry_limit: Option<usize>,
    default_ttl_seconds: Option<u64>,
    probe_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWarmupSettings {
    concurrency: Option<usize>,
    budget_seconds: Option<u64>,
    keys: Vec<RawWarmupKey>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawWarmupKey {
    key: String,
    ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMonitorSettings {
    retention_limit: Option<usize>,
    thresholds: HashMap<String, RawThreshold>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawThreshold {
    warning: f64,
    critical: f64,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "catalog-index";
const ENV_PREFIX: &str = "CATALOG_INDEX";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_ENTRY_LIMIT: u64 = 10_000;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_REINDEX_CONCURRENCY: u64 = 4;

/// Command-line arguments for the catalog-index binary.
#[derive(Debug, Parser)]
#[command(
    name = "catalog-index",
    version,
    about = "Catalog price index and context cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "CATALOG_INDEX_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Re-index every shop product of a shop.
    Reindex(ReindexArgs),
    /// Index one product and invalidate its cached values.
    Index(IndexArgs),
    /// Print the catalog price of a shop product for a group context.
    Price(PriceArgs),
    /// Apply pending database migrations.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RuntimeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

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
}

#[derive(Debug, Args, Clone)]
pub struct ReindexArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    /// Shop whose shop products are re-indexed.
    #[arg(long, value_name = "ID")]
    pub shop: i64,

    /// Override the maximum number of concurrent index tasks.
    #[arg(long = "concurrency", value_name = "COUNT")]
    pub concurrency: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct IndexArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    /// Product to index.
    #[arg(long, value_name = "ID")]
    pub product: i64,
}

#[derive(Debug, Args, Clone)]
pub struct PriceArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    /// Shop product to price.
    #[arg(long = "shop-product", value_name = "ID")]
    pub shop_product: i64,

    /// Contact group; repeat for several groups.
    #[arg(long = "group", value_name = "ID")]
    pub groups: Vec<i64>,
}

#[derive(Debug, Args, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub indexer: IndexerSettings,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    /// Per-process LRU with in-memory counters.
    Memory,
    /// Shared tables, for several processes serving one catalog.
    Postgres,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            other => Err(format!("unknown backend `{other}` (expected memory|postgres)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub entry_limit: NonZeroUsize,
    pub default_ttl: Duration,
    pub backend: CacheBackendKind,
}

#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub reindex_concurrency: NonZeroUsize,
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

    match &cli.command {
        Command::Reindex(args) => {
            raw.apply_runtime_overrides(&args.overrides);
            if let Some(concurrency) = args.concurrency {
                raw.indexer.reindex_concurrency = Some(concurrency);
            }
        }
        Command::Index(args) => raw.apply_runtime_overrides(&args.overrides),
        Command::Price(args) => raw.apply_runtime_overrides(&args.overrides),
        Command::Migrate(args) => raw.apply_runtime_overrides(&args.overrides),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    indexer: RawIndexerSettings,
}

impl RawSettings {
    fn apply_runtime_overrides(&mut self, overrides: &RuntimeOverrides) {
        self.apply_database_override(&overrides.database);
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
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
            logging,
            database,
            cache,
            indexer,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            indexer: build_indexer_settings(indexer)?,
        })
    }
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

    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url,
        max_connections: non_zero_u32(max_connections.into(), "database.max_connections")?,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let entry_limit = non_zero_usize(
        cache.entry_limit.unwrap_or(DEFAULT_CACHE_ENTRY_LIMIT),
        "cache.entry_limit",
    )?;

    let ttl_seconds = cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.default_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let backend = match cache.backend {
        Some(value) => CacheBackendKind::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.backend", reason))?,
        None => CacheBackendKind::Memory,
    };

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        entry_limit,
        default_ttl: Duration::from_secs(ttl_seconds),
        backend,
    })
}

fn build_indexer_settings(indexer: RawIndexerSettings) -> Result<IndexerSettings, LoadError> {
    let reindex_concurrency = non_zero_usize(
        indexer
            .reindex_concurrency
            .unwrap_or(DEFAULT_REINDEX_CONCURRENCY),
        "indexer.reindex_concurrency",
    )?;

    Ok(IndexerSettings {
        reindex_concurrency,
    })
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
struct RawCacheSettings {
    enabled: Option<bool>,
    entry_limit: Option<u64>,
    default_ttl_seconds: Option<u64>,
    backend: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIndexerSettings {
    reindex_concurrency: Option<u64>,
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
    let value_usize: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value_usize)
        .ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

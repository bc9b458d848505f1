use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 8;
const DEFAULT_DB_IDLE_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default replenishment parameters, overridable per product at call time.
#[derive(Clone, Debug, Deserialize)]
pub struct ReplenishmentDefaults {
    /// Expected days between placing and receiving a purchase order.
    #[serde(default = "default_avg_delivery_days")]
    pub avg_delivery_days: u32,

    /// Days of sales the safety floor should cover when no explicit
    /// safety-stock override is configured.
    #[serde(default = "default_full_release_days")]
    pub full_release_days: u32,

    /// Products with runway above this many days are not surfaced.
    #[serde(default = "default_min_coverage_days")]
    pub min_coverage_days: u32,
}

impl Default for ReplenishmentDefaults {
    fn default() -> Self {
        Self {
            avg_delivery_days: default_avg_delivery_days(),
            full_release_days: default_full_release_days(),
            min_coverage_days: default_min_coverage_days(),
        }
    }
}

/// Batching knobs for consuming the external marketplace feed. The caller
/// sleeps `feed_batch_delay_ms` between batches; the core never paces
/// external calls itself.
#[derive(Clone, Debug, Deserialize)]
pub struct MarketplaceConfig {
    #[serde(default = "default_feed_batch_size")]
    pub feed_batch_size: usize,

    #[serde(default = "default_feed_batch_delay_ms")]
    pub feed_batch_delay_ms: u64,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            feed_batch_size: default_feed_batch_size(),
            feed_batch_delay_ms: default_feed_batch_delay_ms(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Runtime environment name ("development", "test", "production")
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level filter for tracing
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Run embedded migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[validate(range(min = 1, max = 1024))]
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default)]
    pub replenishment: ReplenishmentDefaults,

    #[serde(default)]
    pub marketplace: MarketplaceConfig,
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    DEFAULT_DB_MAX_CONNECTIONS
}
fn default_db_min_connections() -> u32 {
    DEFAULT_DB_MIN_CONNECTIONS
}
fn default_db_connect_timeout_secs() -> u64 {
    DEFAULT_DB_CONNECT_TIMEOUT_SECS
}
fn default_db_acquire_timeout_secs() -> u64 {
    DEFAULT_DB_ACQUIRE_TIMEOUT_SECS
}
fn default_db_idle_timeout_secs() -> u64 {
    DEFAULT_DB_IDLE_TIMEOUT_SECS
}
fn default_avg_delivery_days() -> u32 {
    7
}
fn default_full_release_days() -> u32 {
    14
}
fn default_min_coverage_days() -> u32 {
    30
}
fn default_feed_batch_size() -> usize {
    50
}
fn default_feed_batch_delay_ms() -> u64 {
    250
}

impl AppConfig {
    /// Builds a configuration programmatically; file/env layering is skipped.
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            environment,
            log_level: default_log_level(),
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            replenishment: ReplenishmentDefaults::default(),
            marketplace: MarketplaceConfig::default(),
        }
    }

    pub fn is_test(&self) -> bool {
        self.environment == "test"
    }
}

/// Loads configuration from `config/default`, an environment-specific
/// overlay, and `STOCKROOM__*` environment variables, in that order.
pub fn load_config() -> Result<AppConfig, ConfigLoadError> {
    let env_name =
        std::env::var("STOCKROOM_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(
            File::with_name(&format!("{}/{}", CONFIG_DIR, env_name)).required(false),
        )
        .add_source(Environment::with_prefix("STOCKROOM").separator("__"))
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    app_config.validate()?;

    info!(
        environment = %app_config.environment,
        db_max_connections = app_config.db_max_connections,
        "configuration loaded"
    );

    Ok(app_config)
}

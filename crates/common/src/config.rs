use anyhow::{Context, Result};
use serde::Deserialize;
use validator::Validate;

// Default constants
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SERVER_NAME: &str = "Vantage Server";

pub const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_LIMIT: usize = 1_000;
pub const DEFAULT_MAX_LIMIT: usize = 10_000;

pub const DEFAULT_POOL_MAX_SIZE: usize = 10;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;

pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;
pub const DEFAULT_CACHE_MAX_BYTES: u64 = 64 * 1024 * 1024;

pub const DEFAULT_CONNECTIONS_FILE: &str = "config/connections.yaml";
pub const DEFAULT_MODELS_FILE: &str = "config/models.yaml";

#[derive(Debug, Deserialize, Default, Clone, Validate)]
pub struct AppConfig {
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerSettings,
    #[serde(default)]
    pub query_limits: QueryLimits,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default = "default_connections_file")]
    pub connections_file: String,
    #[serde(default = "default_models_file")]
    pub models_file: String,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            name: default_server_name(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct QueryLimits {
    /// Hard upper bound on statement execution, enforced by the executor race.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
    /// Applied when a request carries no limit.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Caller limits are clamped to this.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            statement_timeout_ms: default_statement_timeout_ms(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PoolSettings {
    #[serde(default = "default_pool_max_size")]
    pub max_size: usize,
    /// Bounds both the network handshake and waiting for a free slot.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Idle connections beyond this age are reaped.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: default_pool_max_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CacheSettings {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Byte budget for the bounded LRU; entries are weighed by row payload.
    #[serde(default = "default_cache_max_bytes")]
    pub max_bytes: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_seconds: default_cache_ttl_seconds(),
            max_bytes: default_cache_max_bytes(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}
fn default_server_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}
fn default_statement_timeout_ms() -> u64 {
    DEFAULT_STATEMENT_TIMEOUT_MS
}
fn default_limit() -> usize {
    DEFAULT_LIMIT
}
fn default_max_limit() -> usize {
    DEFAULT_MAX_LIMIT
}
fn default_pool_max_size() -> usize {
    DEFAULT_POOL_MAX_SIZE
}
fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}
fn default_idle_timeout_ms() -> u64 {
    DEFAULT_IDLE_TIMEOUT_MS
}
fn default_cache_enabled() -> bool {
    true
}
fn default_cache_ttl_seconds() -> u64 {
    DEFAULT_CACHE_TTL_SECONDS
}
fn default_cache_max_bytes() -> u64 {
    DEFAULT_CACHE_MAX_BYTES
}
fn default_connections_file() -> String {
    DEFAULT_CONNECTIONS_FILE.to_string()
}
fn default_models_file() -> String {
    DEFAULT_MODELS_FILE.to_string()
}

impl AppConfig {
    /// Load configuration from an optional file, layered with environment
    /// variables. `VANTAGE_SERVER__LISTEN_ADDR` maps to `server.listen_addr`,
    /// and so on.
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = config::Config::builder();

        let builder = if std::path::Path::new(path).exists() {
            builder.add_source(config::File::with_name(path))
        } else {
            builder
        };

        let builder = builder.add_source(
            config::Environment::with_prefix("VANTAGE")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().context("Failed to build configuration")?;

        let app_config: AppConfig = cfg
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {:?}", e))?;

        Ok(app_config)
    }
}

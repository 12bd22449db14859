//! Configuration management for Tollgate.
//!
//! Service settings come from an optional YAML file overlaid with
//! `TOLLGATE_`-prefixed environment variables, e.g.
//! `TOLLGATE_SERVER__HTTP_ADDR=0.0.0.0:8080`. The endpoint limit table lives
//! in its own file (see [`crate::ratelimit::LimitsConfig`]).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Bearer token for the limits admin API; the API is disabled when unset
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            admin_token: None,
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to the endpoint limits file
    pub config_path: Option<PathBuf>,

    /// How often the limits file is checked for changes, in seconds
    #[serde(default = "default_reload_interval")]
    pub config_reload_interval_secs: u64,

    /// Number of buckets to preallocate room for
    #[serde(default = "default_table_capacity")]
    pub bucket_table_capacity: usize,

    /// Buckets untouched for this long (and fully refilled) are evicted
    #[serde(default = "default_idle_ttl")]
    pub bucket_idle_ttl_secs: u64,

    /// How often idle buckets are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Value sent in the `Retry-After` header of rejected requests
    #[serde(default = "default_retry_after")]
    pub retry_after_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            config_reload_interval_secs: default_reload_interval(),
            bucket_table_capacity: default_table_capacity(),
            bucket_idle_ttl_secs: default_idle_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            retry_after_secs: default_retry_after(),
        }
    }
}

impl RateLimitingConfig {
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.config_reload_interval_secs)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.bucket_idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_reload_interval() -> u64 {
    60
}

fn default_table_capacity() -> usize {
    10000
}

fn default_idle_ttl() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_retry_after() -> u64 {
    1
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TollgateConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }
}

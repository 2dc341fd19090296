//! Configuration management for Ratio.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use crate::error::{RatioError, Result};
use crate::ratelimit::{Frequency, HitRecording, Limit, StoreOptions};

/// Prefix of environment variables overriding the configuration.
const ENV_PREFIX: &str = "RATIO";

/// Main configuration for the Ratio service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatioConfig {
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
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 50051))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Window store descriptor, e.g. `redis://localhost:6379/0` or `inmemory://`
    #[serde(default = "default_storage")]
    pub storage: String,

    /// Limit applied to every owner/resource pair, e.g. `100/minute`
    #[serde(default = "default_limit")]
    pub limit: Limit,

    /// Record hits on a background task instead of before answering
    #[serde(default)]
    pub async_hits: bool,

    /// Serialize in-memory store operations behind one lock
    #[serde(default = "default_memory_safe")]
    pub memory_safe: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            storage: default_storage(),
            limit: default_limit(),
            async_hits: false,
            memory_safe: default_memory_safe(),
        }
    }
}

impl RateLimitingConfig {
    /// How the limiter should record hits.
    pub fn hit_recording(&self) -> HitRecording {
        if self.async_hits {
            HitRecording::Detached
        } else {
            HitRecording::Synchronous
        }
    }

    /// Options for building the window store.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            memory_safe: self.memory_safe,
        }
    }
}

fn default_storage() -> String {
    "inmemory://".to_string()
}

fn default_limit() -> Limit {
    Limit::new(Frequency::Minute, 100)
}

fn default_memory_safe() -> bool {
    true
}

/// Output format of the log subscriber.
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
    /// Default filter directive when `RUST_LOG` is not set
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

impl RatioConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RatioError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from an optional YAML file overlaid with
    /// `RATIO__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

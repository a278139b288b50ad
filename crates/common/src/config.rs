//! Configuration structures for Fanout
//!
//! This module defines the configuration of the distribution layer.
//! Configurations are loaded from YAML files and can be overridden by environment variables.

use crate::error::{FanoutError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Prefix for environment overrides layered over a config file,
/// e.g. `FANOUT__POOL__NUM_INSTANCES=4`
pub const ENV_PREFIX: &str = "FANOUT";

/// Top-level configuration for the distribution layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Worker pool layout
    #[serde(default)]
    pub pool: PoolConfig,

    /// Dispatch behaviour
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Health probing
    #[serde(default)]
    pub health: HealthConfig,

    /// Observability configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

/// Worker pool configuration
///
/// Workers live on `host` at ports `base_port .. base_port + num_instances`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Host every worker listens on
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the first worker
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// Number of workers in the pool
    #[serde(default = "default_num_instances")]
    pub num_instances: usize,

    /// Model served by the workers (reported in stats only)
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Relative capacity assigned to every worker
    #[serde(default = "default_load_weight")]
    pub load_weight: f64,
}

/// Dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Timeout for one partition call, connect through full response
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Reject empty batches instead of answering with an empty result
    #[serde(default = "default_reject_empty_batches")]
    pub reject_empty_batches: bool,

    /// Re-probe every worker before splitting a batch
    #[serde(default = "default_probe_before_dispatch")]
    pub probe_before_dispatch: bool,
}

/// Health probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Timeout for one health query
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,

    /// Interval of the optional background refresh (0 = disabled)
    #[serde(default)]
    pub refresh_interval_secs: u64,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_base_port() -> u16 {
    8000
}

fn default_num_instances() -> usize {
    2
}

fn default_model_name() -> String {
    "Qwen/Qwen2.5-0.5B-Instruct-AWQ".to_string()
}

fn default_load_weight() -> f64 {
    1.0
}

fn default_request_timeout() -> u64 {
    300
}

fn default_reject_empty_batches() -> bool {
    true
}

fn default_probe_before_dispatch() -> bool {
    true
}

fn default_health_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            base_port: default_base_port(),
            num_instances: default_num_instances(),
            model_name: default_model_name(),
            load_weight: default_load_weight(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            reject_empty_batches: default_reject_empty_batches(),
            probe_before_dispatch: default_probe_before_dispatch(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_health_timeout(),
            refresh_interval_secs: 0,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl FanoutConfig {
    /// Parse configuration from a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: FanoutConfig = serde_yaml::from_str(content)
            .map_err(|e| FanoutError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, layered with `FANOUT__*` environment overrides
    pub fn from_file<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let config: FanoutConfig = ::config::Config::builder()
            .add_source(::config::File::from(path.as_path()).format(::config::FileFormat::Yaml))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| FanoutError::Config(format!("Failed to load config file {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the plain deployment variables
    /// (`SERVER_HOST`, `SERVER_PORT`, `NUM_INSTANCES`, `MODEL_NAME`)
    pub fn from_env() -> Result<Self> {
        let mut pool = PoolConfig::default();

        if let Ok(host) = std::env::var("SERVER_HOST") {
            pool.host = host;
        }
        if let Ok(port) = std::env::var("SERVER_PORT") {
            pool.base_port = port
                .parse()
                .map_err(|_| FanoutError::Config(format!("Invalid port number: {}", port)))?;
        }
        if let Ok(count) = std::env::var("NUM_INSTANCES") {
            pool.num_instances = count
                .parse()
                .map_err(|_| FanoutError::Config(format!("Invalid instance count: {}", count)))?;
        }
        if let Ok(model) = std::env::var("MODEL_NAME") {
            pool.model_name = model;
        }

        let config = FanoutConfig {
            pool,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pool.num_instances == 0 {
            return Err(FanoutError::config("At least one worker instance is required"));
        }

        let last_port = (self.pool.base_port as usize)
            .checked_add(self.pool.num_instances - 1)
            .filter(|port| *port <= u16::MAX as usize);
        if last_port.is_none() {
            return Err(FanoutError::config(format!(
                "Port range starting at {} with {} instances exceeds {}",
                self.pool.base_port,
                self.pool.num_instances,
                u16::MAX
            )));
        }

        if self.pool.host.trim().is_empty() {
            return Err(FanoutError::config("Worker host must not be empty"));
        }

        if !self.pool.load_weight.is_finite() || self.pool.load_weight <= 0.0 {
            return Err(FanoutError::config(format!(
                "Load weight must be positive, got {}",
                self.pool.load_weight
            )));
        }

        if self.dispatch.request_timeout_secs == 0 {
            return Err(FanoutError::config("Request timeout must be non-zero"));
        }

        if self.health.timeout_secs == 0 {
            return Err(FanoutError::config("Health check timeout must be non-zero"));
        }

        Ok(())
    }

    /// Log level for the default tracing filter
    pub fn log_level(&self) -> &str {
        self.observability
            .as_ref()
            .map(|o| o.log_level.as_str())
            .unwrap_or("info")
    }

    /// Get dispatch timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.request_timeout_secs)
    }

    /// Get health probe timeout as Duration
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health.timeout_secs)
    }

    /// Get the background refresh interval, if enabled
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.health.refresh_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

//! # Pomelo Config - Configuration Management
//!
//! Handles configuration loading from files and environment variables.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub schema_cache: SchemaCacheConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    pub connection_string: Option<String>,
}

fn default_backend() -> String {
    "memory".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { backend: default_backend(), connection_string: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaCacheConfig {
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_cache_ttl_seconds() -> u64 {
    300
}

impl Default for SchemaCacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: default_cache_ttl_seconds() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

impl Config {
    /// Load configuration: defaults, then an optional file, then
    /// `POMELO_`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut builder = ConfigBuilder::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()));
        }
        let settings = builder
            .add_source(Environment::with_prefix("POMELO").separator("__"))
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend != "memory" {
            return Err(ConfigError::Invalid(format!(
                "unknown storage backend: {}",
                self.store.backend
            )));
        }
        if self.schema_cache.ttl_seconds == 0 {
            return Err(ConfigError::Invalid(
                "schema cache ttl must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.schema_cache.ttl_seconds, 300);
        assert_eq!(config.observability.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_backend() {
        let config = Config {
            store: StoreConfig { backend: "oracle".to_string(), connection_string: None },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_without_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.store.backend, "memory");
    }
}

//! Storage backend selection.

use std::sync::Arc;

use crate::{Error, MemoryBackend, Result, StorageAdapter};

/// Supported physical stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Memory,
}

impl std::str::FromStr for BackendType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(BackendType::Memory),
            other => Err(Error::Store(format!("unknown storage backend: {other}"))),
        }
    }
}

/// Backend construction parameters.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: BackendType,
    pub connection_string: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { backend: BackendType::Memory, connection_string: None }
    }
}

/// Builds a storage adapter from configuration.
pub struct StorageFactory;

impl StorageFactory {
    pub fn create(config: &StorageConfig) -> Result<Arc<dyn StorageAdapter>> {
        match config.backend {
            BackendType::Memory => Ok(Arc::new(MemoryBackend::new())),
        }
    }
}

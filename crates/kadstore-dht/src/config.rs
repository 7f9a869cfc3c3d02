//! Value store configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::error::DhtError;
use crate::keys::MAX_VALUES_PER_KEY;
use crate::storage::StorageEnv;
use crate::{MAX_VALUES, MAX_VALUES_IP, MAX_VALUES_NET};

/// Main value store configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub storage: StorageConfig,
    pub limits: ValueLimits,
    pub keys: KeysConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database directory, required by the sled backend
    pub path: Option<PathBuf>,
}

/// Abuse limits on the values we accept to manage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueLimits {
    /// Max # of values managed by this node
    pub max_values: usize,
    /// Max # of values per creator IP address
    pub max_values_ip: usize,
    /// Max # of values per creator class C network
    pub max_values_net: usize,
}

impl Default for ValueLimits {
    fn default() -> Self {
        Self {
            max_values: MAX_VALUES,
            max_values_ip: MAX_VALUES_IP,
            max_values_net: MAX_VALUES_NET,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub max_values_per_key: usize,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            max_values_per_key: MAX_VALUES_PER_KEY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        Self::from_yaml(&contents).context("Failed to parse configuration file")
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: StoreConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::Sled && self.storage.path.is_none() {
            anyhow::bail!("storage.path is required by the sled backend");
        }
        if self.keys.max_values_per_key == 0 {
            anyhow::bail!("keys.max_values_per_key must be at least 1");
        }
        Ok(())
    }

    /// Open the configured storage environment
    pub fn open_storage(&self) -> crate::Result<StorageEnv> {
        match self.storage.backend {
            StorageBackend::Memory => Ok(StorageEnv::memory()),
            StorageBackend::Sled => {
                let path = self.storage.path.as_deref().ok_or_else(|| {
                    DhtError::Config("storage.path is required by the sled backend".to_string())
                })?;
                fs::create_dir_all(path)?;
                StorageEnv::sled(path)
            }
        }
    }
}

/// Install a global `fmt` subscriber filtered at the configured level
///
/// `RUST_LOG`, when set, takes precedence over the configuration.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid log level: {}", logging.level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.limits.max_values, 65536);
        assert_eq!(config.limits.max_values_ip, 16);
        assert_eq!(config.limits.max_values_net, 256);
        assert_eq!(config.keys.max_values_per_key, MAX_VALUES_PER_KEY);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_yaml() {
        let config = StoreConfig::from_yaml(
            r#"
limits:
  max_values_ip: 4
logging:
  level: debug
"#,
        )
        .unwrap();

        assert_eq!(config.limits.max_values_ip, 4);
        assert_eq!(config.limits.max_values_net, MAX_VALUES_NET);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_sled_requires_path() {
        let result = StoreConfig::from_yaml("storage:\n  backend: sled\n");
        assert!(result.is_err());

        let config =
            StoreConfig::from_yaml("storage:\n  backend: sled\n  path: /tmp/kadstore\n").unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/kadstore")));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(StoreConfig::from_yaml("storage:\n  backend: redis\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.yaml");

        let mut config = StoreConfig::default();
        config.storage.backend = StorageBackend::Sled;
        config.storage.path = Some(dir.path().join("db"));
        config.keys.max_values_per_key = 8;
        fs::write(&path, serde_yaml::to_string(&config).unwrap()).unwrap();

        let loaded = StoreConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let env = loaded.open_storage().unwrap();
        assert!(matches!(env, StorageEnv::Sled(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}

//! Configuration Loader
//!
//! Loads and merges keypool configuration from the built-in defaults and
//! optional user files.

use crate::config::provider::KeypoolConfig;
use crate::error::{PoolError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration loader with support for multiple sources
pub struct ConfigLoader {
    config: KeypoolConfig,
}

impl ConfigLoader {
    /// Create a new config loader and load from default locations
    pub fn new() -> Result<Self> {
        let mut loader = Self {
            config: KeypoolConfig::default(),
        };

        loader.load_builtin_defaults()?;
        loader.load_from_default_paths()?;

        Ok(loader)
    }

    /// Create a loader with a specific config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut loader = Self {
            config: KeypoolConfig::default(),
        };

        loader.load_builtin_defaults()?;
        loader.load_from_file(path)?;

        Ok(loader)
    }

    /// Load built-in provider defaults
    fn load_builtin_defaults(&mut self) -> Result<()> {
        let defaults = include_str!("../../providers.json");
        let config: KeypoolConfig = serde_json::from_str(defaults).map_err(|e| {
            PoolError::Config(format!("Failed to parse built-in providers.json: {}", e))
        })?;

        self.merge_config(config);
        Ok(())
    }

    /// Load configuration from default paths
    fn load_from_default_paths(&mut self) -> Result<()> {
        for path in Self::get_config_paths() {
            if path.exists() {
                self.load_from_file(&path)?;
            }
        }

        Ok(())
    }

    /// Config paths, lowest priority first
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("keypool").join("config.json"));
        }

        paths.push(PathBuf::from("keypool.json"));

        if let Ok(custom_path) = std::env::var("KEYPOOL_CONFIG") {
            paths.push(PathBuf::from(custom_path));
        }

        paths
    }

    /// Load configuration from a specific file
    fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PoolError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: KeypoolConfig = serde_json::from_str(&content).map_err(|e| {
            PoolError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), providers = config.providers.len(), "loaded config file");
        self.merge_config(config);
        Ok(())
    }

    /// Merge another config into this one (later configs override earlier)
    fn merge_config(&mut self, other: KeypoolConfig) {
        self.config.providers.extend(other.providers);

        if other.cooldown.is_some() {
            self.config.cooldown = other.cooldown;
        }
        if other.rate_limit.is_some() {
            self.config.rate_limit = other.rate_limit;
        }
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &KeypoolConfig {
        &self.config
    }

    /// Take ownership of the configuration
    pub fn into_config(self) -> KeypoolConfig {
        self.config
    }
}

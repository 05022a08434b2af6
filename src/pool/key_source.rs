//! Key discovery for the credential pool.

use crate::config::KeypoolConfig;
use std::collections::HashMap;

/// Supplies the configured keys for a provider.
///
/// Called once per provider, the first time the pool sees it.
pub trait KeySource: Send + Sync {
    fn keys_for(&self, provider: &str) -> Vec<String>;
}

/// Keys read from the process environment using the configured base names
#[derive(Debug, Clone)]
pub struct EnvKeySource {
    config: KeypoolConfig,
}

impl EnvKeySource {
    pub fn new(config: KeypoolConfig) -> Self {
        Self { config }
    }
}

impl KeySource for EnvKeySource {
    fn keys_for(&self, provider: &str) -> Vec<String> {
        self.config
            .providers
            .get(provider)
            .map(|p| p.get_api_keys())
            .unwrap_or_default()
    }
}

/// Fixed key lists, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticKeySource {
    keys: HashMap<String, Vec<String>>,
}

impl StaticKeySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys<I, S>(mut self, provider: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys
            .entry(provider.to_string())
            .or_default()
            .extend(keys.into_iter().map(Into::into));
        self
    }
}

impl KeySource for StaticKeySource {
    fn keys_for(&self, provider: &str) -> Vec<String> {
        self.keys.get(provider).cloned().unwrap_or_default()
    }
}

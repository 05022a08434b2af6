//! Provider Configuration
//!
//! Defines the configuration schema for upstream providers, cooldown tuning
//! and inbound rate limiting.

use crate::pool::CooldownPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Highest numeric suffix checked when discovering keys (`BASE_1` .. `BASE_20`)
pub const DEFAULT_MAX_KEY_SUFFIX: u32 = 20;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeypoolConfig {
    /// Provider configurations keyed by provider id (e.g. "GEMINI")
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Cooldown tuning; built-in defaults when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<CooldownConfig>,

    /// Inbound abuse protection; built-in defaults when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

impl KeypoolConfig {
    /// Effective cooldown policy
    pub fn cooldown_policy(&self) -> CooldownPolicy {
        self.cooldown.clone().unwrap_or_default().into()
    }

    /// Effective inbound rate limit
    pub fn rate_limit(&self) -> RateLimitConfig {
        self.rate_limit.clone().unwrap_or_default()
    }
}

/// Configuration for a single upstream provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL for the API
    pub base_url: String,

    /// Base environment variable name for the API keys
    pub key_env: String,

    /// Highest numeric suffix checked after the base name
    #[serde(default = "default_max_key_suffix")]
    pub max_key_suffix: u32,

    /// Optional environment variable for custom base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_env: Option<String>,

    /// Default model (LLM providers only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Request path appended to the base URL (RapidAPI services)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Additional headers to send with requests
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

fn default_max_key_suffix() -> u32 {
    DEFAULT_MAX_KEY_SUFFIX
}

impl ProviderConfig {
    /// Get the effective base URL (from env var if configured, otherwise default)
    pub fn get_base_url(&self) -> String {
        if let Some(env_var) = &self.api_base_env {
            if let Ok(url) = std::env::var(env_var) {
                return url;
            }
        }
        self.base_url.clone()
    }

    /// Get all API keys for this provider from the process environment
    pub fn get_api_keys(&self) -> Vec<String> {
        discover_keys(&self.key_env, self.max_key_suffix, |name| {
            std::env::var(name).ok()
        })
    }
}

/// Collect `base`, `base_1` .. `base_{max_suffix}` from `lookup`.
///
/// Values are trimmed, blanks skipped, duplicates dropped; first occurrence
/// keeps its position.
pub fn discover_keys<F>(base: &str, max_suffix: u32, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let names = std::iter::once(base.to_string())
        .chain((1..=max_suffix).map(|n| format!("{}_{}", base, n)));

    let mut keys: Vec<String> = Vec::new();
    for name in names {
        let Some(raw) = lookup(&name) else {
            continue;
        };
        let key = raw.trim();
        if !key.is_empty() && !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

/// Cooldown durations, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Unit multiplied by `2^fail_count` for rate-limit backoff
    #[serde(default = "default_unit_secs")]
    pub unit_secs: u64,

    /// Cap for rate-limit backoff
    #[serde(default = "default_rate_limit_cap_secs")]
    pub rate_limit_cap_secs: u64,

    /// Flat cooldown after a quota failure
    #[serde(default = "default_quota_secs")]
    pub quota_secs: u64,

    /// Flat cooldown after an invalid-credential failure
    #[serde(default = "default_invalid_secs")]
    pub invalid_secs: u64,
}

fn default_unit_secs() -> u64 {
    60
}

fn default_rate_limit_cap_secs() -> u64 {
    60 * 60
}

fn default_quota_secs() -> u64 {
    60 * 60
}

fn default_invalid_secs() -> u64 {
    24 * 60 * 60
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            unit_secs: default_unit_secs(),
            rate_limit_cap_secs: default_rate_limit_cap_secs(),
            quota_secs: default_quota_secs(),
            invalid_secs: default_invalid_secs(),
        }
    }
}

impl From<CooldownConfig> for CooldownPolicy {
    fn from(config: CooldownConfig) -> Self {
        Self {
            unit: Duration::from_secs(config.unit_secs),
            rate_limit_cap: Duration::from_secs(config.rate_limit_cap_secs),
            quota: Duration::from_secs(config.quota_secs),
            invalid: Duration::from_secs(config.invalid_secs),
        }
    }
}

/// Fixed-window limit applied per caller identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub limit: u32,

    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 20,
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

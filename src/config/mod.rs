//! Configuration Module
//!
//! Handles provider configuration loading and key discovery.

pub mod loader;
pub mod provider;

pub use loader::ConfigLoader;
pub use provider::{
    discover_keys, CooldownConfig, KeypoolConfig, ProviderConfig, RateLimitConfig,
    DEFAULT_MAX_KEY_SUFFIX,
};

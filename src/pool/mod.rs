//! Credential Pool Module
//!
//! API key health tracking, failure classification and rotation.

pub mod classify;
pub mod credential;
pub mod credential_pool;
pub mod key_source;

pub use classify::{classify, ErrorClass};
pub use credential::{mask_key, CooldownPolicy, Credential, CredentialSnapshot, CredentialStatus};
pub use credential_pool::{CredentialPool, ExecuteOptions, PoolStats};
pub use key_source::{EnvKeySource, KeySource, StaticKeySource};

//! Credential Pool
//!
//! Rotates requests across a provider's API keys. Keys that fail with a
//! retryable error are put on cooldown and the next key is tried; fatal
//! errors are handed straight back to the caller.

use crate::error::{CallError, PoolError, Result};
use crate::pool::classify::classify;
use crate::pool::credential::{mask_key, CooldownPolicy, Credential, CredentialSnapshot};
use crate::pool::key_source::KeySource;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-call options for [`CredentialPool::execute`]
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Caller-supplied key tried before the pool. Its failure falls back to
    /// the pool instead of failing the call.
    pub override_credential: Option<String>,
}

impl ExecuteOptions {
    pub fn with_override(key: impl Into<String>) -> Self {
        Self {
            override_credential: Some(key.into()),
        }
    }

    /// Blank overrides (empty form fields, empty headers) count as absent
    pub fn from_override(key: Option<String>) -> Self {
        Self {
            override_credential: key.filter(|k| !k.trim().is_empty()),
        }
    }
}

/// Counts for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total_keys: usize,
    pub available_keys: usize,
    pub cooling_down_keys: usize,
}

/// Outbound credential pool shared by all request handlers
pub struct CredentialPool {
    policy: CooldownPolicy,
    source: Arc<dyn KeySource>,
    providers: RwLock<HashMap<String, Vec<Arc<Credential>>>>,
}

impl std::fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPool")
            .field("policy", &self.policy)
            .field("providers", &self.providers.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CredentialPool {
    pub fn new(source: Arc<dyn KeySource>, policy: CooldownPolicy) -> Self {
        Self {
            policy,
            source,
            providers: RwLock::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    /// Credentials of a provider, discovering them on first use
    pub fn credentials(&self, provider: &str) -> Vec<Arc<Credential>> {
        if let Some(existing) = self.providers.read().get(provider) {
            return existing.clone();
        }

        let discovered = self.source.keys_for(provider);
        let mut providers = self.providers.write();
        let entry = providers.entry(provider.to_string()).or_insert_with(|| {
            info!(provider, keys = discovered.len(), "registered provider credentials");
            let mut credentials: Vec<Arc<Credential>> = Vec::with_capacity(discovered.len());
            for key in discovered {
                if !credentials.iter().any(|c| c.value() == key) {
                    credentials.push(Arc::new(Credential::new(key)));
                }
            }
            credentials
        });
        entry.clone()
    }

    /// Add keys to a provider; known keys keep their health
    pub fn register<I, S>(&self, provider: &str, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.credentials(provider);

        let mut providers = self.providers.write();
        let credentials = providers.entry(provider.to_string()).or_default();
        for key in keys {
            let key = key.into();
            if !credentials.iter().any(|c| c.value() == key) {
                debug!(provider, key = %mask_key(&key), "registered credential");
                credentials.push(Arc::new(Credential::new(key)));
            }
        }
    }

    /// Eligible credentials, least recently used first
    pub fn candidates(&self, provider: &str) -> Vec<Arc<Credential>> {
        let now = Instant::now();
        let mut eligible: Vec<(Option<Instant>, Arc<Credential>)> = self
            .credentials(provider)
            .into_iter()
            .filter(|c| c.is_eligible_at(now))
            .map(|c| (c.last_used_at(), c))
            .collect();

        eligible.sort_by_key(|(last_used, _)| *last_used);
        eligible.into_iter().map(|(_, c)| c).collect()
    }

    /// Run `request_fn` with the override key, then with pool keys until one
    /// succeeds, a fatal error occurs, or the pool runs out.
    pub async fn execute<T, F, Fut>(
        &self,
        provider: &str,
        mut request_fn: F,
        options: ExecuteOptions,
    ) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = std::result::Result<T, CallError>>,
    {
        let mut last_error: Option<CallError> = None;
        let mut failed_override: Option<String> = None;

        if let Some(key) = options.override_credential {
            match request_fn(key.clone()).await {
                Ok(value) => {
                    debug!(provider, key = %mask_key(&key), "override credential succeeded");
                    return Ok(value);
                }
                Err(err) => {
                    warn!(
                        provider,
                        key = %mask_key(&key),
                        class = %classify(err.status, &err.message),
                        error = %err,
                        "override credential failed, falling back to pool"
                    );
                    last_error = Some(err);
                    failed_override = Some(key);
                }
            }
        }

        let candidates: Vec<Arc<Credential>> = self
            .candidates(provider)
            .into_iter()
            .filter(|c| failed_override.as_deref() != Some(c.value()))
            .collect();

        if candidates.is_empty() {
            warn!(provider, "no eligible credentials");
            return Err(PoolError::Exhausted {
                provider: provider.to_string(),
                last_error,
            });
        }

        for credential in candidates {
            let attempt = Attempt::begin(&credential);
            let outcome = request_fn(credential.value().to_string()).await;
            attempt.complete();

            match outcome {
                Ok(value) => {
                    credential.record_success();
                    debug!(provider, key = %credential.masked(), "request succeeded");
                    return Ok(value);
                }
                Err(err) => {
                    let class = classify(err.status, &err.message);
                    let cooldown = credential.record_failure(&err, class, &self.policy);

                    if !class.is_retryable() {
                        warn!(
                            provider,
                            key = %credential.masked(),
                            %class,
                            error = %err,
                            "non-retryable provider error"
                        );
                        return Err(PoolError::Call(err));
                    }

                    warn!(
                        provider,
                        key = %credential.masked(),
                        %class,
                        fail_count = credential.fail_count(),
                        cooldown = ?cooldown,
                        error = %err,
                        "credential failed, rotating"
                    );
                    last_error = Some(err);
                }
            }
        }

        warn!(provider, "all credentials failed");
        Err(PoolError::Exhausted {
            provider: provider.to_string(),
            last_error,
        })
    }

    /// Health counts for a provider
    pub fn stats(&self, provider: &str) -> PoolStats {
        let now = Instant::now();
        let credentials = self.credentials(provider);
        let available = credentials.iter().filter(|c| c.is_eligible_at(now)).count();

        PoolStats {
            total_keys: credentials.len(),
            available_keys: available,
            cooling_down_keys: credentials.len() - available,
        }
    }

    /// Masked per-credential view for a provider
    pub fn snapshot(&self, provider: &str) -> Vec<CredentialSnapshot> {
        self.credentials(provider)
            .iter()
            .map(|c| c.snapshot())
            .collect()
    }

    /// Providers seen so far
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Marks a credential as used for the duration of one attempt. Dropping it
/// before `complete` (the caller cancelled) rolls the mark back.
struct Attempt<'a> {
    credential: &'a Credential,
    marked: Instant,
    previous: Option<Instant>,
    completed: bool,
}

impl<'a> Attempt<'a> {
    fn begin(credential: &'a Credential) -> Self {
        let marked = Instant::now();
        let previous = credential.mark_used(marked);
        Self {
            credential,
            marked,
            previous,
            completed: false,
        }
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.credential
                .restore_last_used(self.marked, self.previous);
        }
    }
}

//! Credential Health
//!
//! A single provider API key and its health record.

use crate::error::CallError;
use crate::pool::classify::ErrorClass;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Health of a credential as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Healthy,
    RateLimited,
    Exhausted,
    Invalid,
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialStatus::Healthy => "healthy",
            CredentialStatus::RateLimited => "rate_limited",
            CredentialStatus::Exhausted => "exhausted",
            CredentialStatus::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// Cooldown durations applied after retryable failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownPolicy {
    /// Rate-limit cooldown is `unit * 2^fail_count`
    pub unit: Duration,
    /// Upper bound for rate-limit cooldown
    pub rate_limit_cap: Duration,
    /// Flat cooldown after a quota failure
    pub quota: Duration,
    /// Flat cooldown after the provider rejected the key
    pub invalid: Duration,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            unit: Duration::from_secs(60),
            rate_limit_cap: Duration::from_secs(60 * 60),
            quota: Duration::from_secs(60 * 60),
            invalid: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl CooldownPolicy {
    /// Cooldown for a failure of `class`, given the already-incremented
    /// failure count. `None` for fatal failures.
    pub fn cooldown_for(&self, class: ErrorClass, fail_count: u32) -> Option<Duration> {
        match class {
            ErrorClass::RateLimited => Some(self.rate_limit_backoff(fail_count)),
            ErrorClass::QuotaExceeded => Some(self.quota),
            ErrorClass::InvalidCredential => Some(self.invalid),
            ErrorClass::Fatal => None,
        }
    }

    /// `min(unit * 2^fail_count, rate_limit_cap)`, saturating at the cap
    pub fn rate_limit_backoff(&self, fail_count: u32) -> Duration {
        2u32.checked_pow(fail_count)
            .and_then(|factor| self.unit.checked_mul(factor))
            .map_or(self.rate_limit_cap, |d| d.min(self.rate_limit_cap))
    }
}

/// Show only the last four characters of a secret
pub fn mask_key(value: &str) -> String {
    let count = value.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let suffix: String = value.chars().skip(count - 4).collect();
    format!("...{}", suffix)
}

#[derive(Debug)]
struct KeyState {
    status: CredentialStatus,
    last_used_at: Option<Instant>,
    retry_after: Option<Instant>,
    fail_count: u32,
    request_count: u64,
    last_error: Option<CallError>,
}

/// A single API key with health tracking
#[derive(Debug)]
pub struct Credential {
    /// The actual API key value
    value: String,

    state: Mutex<KeyState>,
}

impl Credential {
    /// Create a new, healthy credential
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            state: Mutex::new(KeyState {
                status: CredentialStatus::Healthy,
                last_used_at: None,
                retry_after: None,
                fail_count: 0,
                request_count: 0,
                last_error: None,
            }),
        }
    }

    /// Get the key value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Masked form safe for logs
    pub fn masked(&self) -> String {
        mask_key(&self.value)
    }

    pub fn status(&self) -> CredentialStatus {
        self.state.lock().status
    }

    pub fn fail_count(&self) -> u32 {
        self.state.lock().fail_count
    }

    pub fn request_count(&self) -> u64 {
        self.state.lock().request_count
    }

    pub fn last_used_at(&self) -> Option<Instant> {
        self.state.lock().last_used_at
    }

    pub fn last_error(&self) -> Option<CallError> {
        self.state.lock().last_error.clone()
    }

    /// Healthy, or its cooldown has run out
    pub fn is_eligible_at(&self, now: Instant) -> bool {
        let state = self.state.lock();
        state.status == CredentialStatus::Healthy
            || state.retry_after.map_or(true, |until| now >= until)
    }

    /// Time left before the credential may be tried again
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let until = self.state.lock().retry_after?;
        let now = Instant::now();
        (now < until).then(|| until - now)
    }

    /// Stamp the credential as picked; returns the previous stamp so an
    /// abandoned attempt can put it back.
    pub(crate) fn mark_used(&self, now: Instant) -> Option<Instant> {
        let mut state = self.state.lock();
        state.last_used_at.replace(now)
    }

    /// Undo `mark_used` unless someone else has picked the key since
    pub(crate) fn restore_last_used(&self, marked: Instant, previous: Option<Instant>) {
        let mut state = self.state.lock();
        if state.last_used_at == Some(marked) {
            state.last_used_at = previous;
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.status = CredentialStatus::Healthy;
        state.retry_after = None;
        state.fail_count = 0;
        state.request_count += 1;
    }

    /// Record a failed call and apply the cooldown for its class.
    ///
    /// Fatal failures are only remembered as `last_error`. Returns the
    /// cooldown that was applied.
    pub fn record_failure(
        &self,
        error: &CallError,
        class: ErrorClass,
        policy: &CooldownPolicy,
    ) -> Option<Duration> {
        let mut state = self.state.lock();
        state.request_count += 1;
        state.last_error = Some(error.clone());

        let status = match class {
            ErrorClass::RateLimited => CredentialStatus::RateLimited,
            ErrorClass::QuotaExceeded => CredentialStatus::Exhausted,
            ErrorClass::InvalidCredential => CredentialStatus::Invalid,
            ErrorClass::Fatal => return None,
        };

        state.fail_count = state.fail_count.saturating_add(1);
        let cooldown = policy.cooldown_for(class, state.fail_count)?;
        state.status = status;
        state.retry_after = Some(Instant::now() + cooldown);
        Some(cooldown)
    }

    /// Diagnostic view of the credential
    pub fn snapshot(&self) -> CredentialSnapshot {
        let state = self.state.lock();
        let now = Instant::now();
        let remaining = state
            .retry_after
            .and_then(|until| (now < until).then(|| until - now));

        CredentialSnapshot {
            key: mask_key(&self.value),
            status: state.status,
            fail_count: state.fail_count,
            request_count: state.request_count,
            cooldown_remaining_secs: remaining.map(|d| d.as_secs()),
            retry_after: remaining.and_then(|d| {
                chrono::Duration::from_std(d).ok().map(|d| Utc::now() + d)
            }),
            last_error: state.last_error.as_ref().map(ToString::to_string),
        }
    }

    #[cfg(test)]
    pub(crate) fn force_state(
        &self,
        status: CredentialStatus,
        retry_after: Option<Instant>,
        fail_count: u32,
    ) {
        let mut state = self.state.lock();
        state.status = status;
        state.retry_after = retry_after;
        state.fail_count = fail_count;
    }
}

/// Serializable view of one credential, secret masked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSnapshot {
    pub key: String,
    pub status: CredentialStatus,
    pub fail_count: u32,
    pub request_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

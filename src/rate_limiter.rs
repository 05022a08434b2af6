//! Inbound Rate Limiting
//!
//! Fixed-window request counter per caller identity (usually the client
//! address). In-memory only; counts start over when the process restarts.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug, Default)]
struct Windows {
    by_identity: HashMap<String, Window>,
    last_sweep: Option<Instant>,
}

impl Windows {
    /// Drop windows that ended, at most once per `window`
    fn sweep(&mut self, window: Duration, now: Instant) {
        let due = self
            .last_sweep
            .map_or(true, |at| now.saturating_duration_since(at) > window);
        if !due {
            return;
        }
        self.last_sweep = Some(now);
        let before = self.by_identity.len();
        self.by_identity
            .retain(|_, entry| now.saturating_duration_since(entry.started) <= window);
        let dropped = before - self.by_identity.len();
        if dropped > 0 {
            debug!(dropped, tracked = self.by_identity.len(), "expired rate limit windows");
        }
    }
}

/// Fixed-window limiter keyed by caller identity.
///
/// Expired windows are swept on the `allow` path, so memory follows the
/// number of identities seen within one window.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request from `identity`; `false` once more than `limit`
    /// requests arrived in the current window
    pub fn allow(&self, identity: &str, limit: u32, window: Duration) -> bool {
        self.allow_at(identity, limit, window, Instant::now())
    }

    fn allow_at(&self, identity: &str, limit: u32, window: Duration, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        windows.sweep(window, now);

        let entry = windows.by_identity.entry(identity.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.saturating_duration_since(entry.started) > window {
            entry.count = 0;
            entry.started = now;
        }

        entry.count = entry.count.saturating_add(1);
        let allowed = entry.count <= limit;
        if !allowed {
            debug!(identity, count = entry.count, limit, "rate limit exceeded");
        }
        allowed
    }

    /// Number of identities currently tracked
    pub fn tracked(&self) -> usize {
        self.windows.lock().by_identity.len()
    }
}

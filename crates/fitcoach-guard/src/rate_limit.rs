//! Sliding-window rate limiter.
//!
//! Each key owns an ordered list of admission instants. Every call to
//! [`RateLimiter::allow`] prunes instants older than the window, then either
//! rejects (without recording) or records `now` and admits. The check and
//! the record happen under one lock, so there is no gap between them.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fitcoach_vault::Clock;

/// Per-key sliding-window request counter.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admit one request for `key` if fewer than `max_requests` were admitted
    /// during the trailing `window`.
    pub fn allow(&self, key: &str, max_requests: usize, window: Duration) -> bool {
        let now = self.clock.now();
        // A window too large for chrono is effectively unbounded.
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w));

        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let stamps = windows.entry(key.to_string()).or_default();

        if let Some(cutoff) = cutoff {
            while stamps.front().is_some_and(|t| *t <= cutoff) {
                stamps.pop_front();
            }
        }

        if stamps.len() >= max_requests {
            tracing::debug!(
                key = key,
                in_window = stamps.len(),
                max_requests = max_requests,
                "rate limit reached"
            );
            return false;
        }

        stamps.push_back(now);
        true
    }

    /// Forget the history for `key`.
    pub fn reset(&self, key: &str) {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    /// Forget all history.
    pub fn clear(&self) {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Keys with recorded history, sorted.
    pub fn tracked_keys(&self) -> Vec<String> {
        let windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = windows.keys().cloned().collect();
        keys.sort();
        keys
    }
}

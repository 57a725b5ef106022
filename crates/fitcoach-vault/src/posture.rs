//! Security posture report.
//!
//! The posture is never stored authoritatively. [`PostureMonitor`] derives
//! it on demand from the live store and caches the result; a cached posture
//! older than the recheck interval (30 minutes by default) is recomputed on
//! the next [`PostureMonitor::current`] call.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::crypto;
use crate::store::SecureStore;

/// Default recheck interval, in minutes.
pub const DEFAULT_RECHECK_MINUTES: i64 = 30;

/// Overall assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureLevel {
    Secure = 0,
    Warning = 1,
    Critical = 2,
}

impl PostureLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secure => "secure",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for PostureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-in-time security report for the vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityPosture {
    pub level: PostureLevel,
    /// Legacy keys still holding plaintext credentials.
    pub legacy_plaintext_credentials: Vec<String>,
    /// Whether an encrypt/decrypt round trip with the live key succeeded.
    pub encryption_self_test: bool,
    /// Human-readable vulnerability indicators.
    pub vulnerabilities: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl SecurityPosture {
    pub fn vulnerability_count(&self) -> usize {
        self.vulnerabilities.len()
    }
}

/// Computes and caches [`SecurityPosture`] reports.
pub struct PostureMonitor {
    store: Arc<SecureStore>,
    clock: Arc<dyn Clock>,
    weak_fingerprint: bool,
    recheck_interval: Duration,
    last: Mutex<Option<SecurityPosture>>,
}

impl PostureMonitor {
    pub fn new(store: Arc<SecureStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            weak_fingerprint: false,
            recheck_interval: Duration::minutes(DEFAULT_RECHECK_MINUTES),
            last: Mutex::new(None),
        }
    }

    /// Record that the key was derived from a low-entropy fingerprint.
    pub fn with_weak_fingerprint(mut self, weak: bool) -> Self {
        self.weak_fingerprint = weak;
        self
    }

    pub fn with_recheck_interval(mut self, interval: Duration) -> Self {
        self.recheck_interval = interval;
        self
    }

    /// The cached posture, recomputed first if missing or stale.
    pub async fn current(&self) -> SecurityPosture {
        if let Some(cached) = self.cached() {
            if self.clock.now() - cached.checked_at < self.recheck_interval {
                return cached;
            }
        }
        self.recheck().await
    }

    /// Recompute the posture now.
    pub async fn recheck(&self) -> SecurityPosture {
        let legacy = self.store.legacy_plaintext_keys().await;
        let self_test = crypto::self_test(self.store.encryption_key());

        let mut vulnerabilities = Vec::new();
        if !legacy.is_empty() {
            vulnerabilities.push(format!(
                "{} credential(s) stored without encryption",
                legacy.len()
            ));
        }
        if !self_test {
            vulnerabilities.push("encryption self-test failed".to_string());
        }
        if self.weak_fingerprint {
            vulnerabilities.push("encryption key derived from a weak fingerprint".to_string());
        }

        let level = if !self_test {
            PostureLevel::Critical
        } else if vulnerabilities.is_empty() {
            PostureLevel::Secure
        } else {
            PostureLevel::Warning
        };

        let posture = SecurityPosture {
            level,
            legacy_plaintext_credentials: legacy,
            encryption_self_test: self_test,
            vulnerabilities,
            checked_at: self.clock.now(),
        };

        tracing::info!(
            level = %posture.level,
            vulnerabilities = posture.vulnerability_count(),
            "security posture checked"
        );

        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(posture.clone());
        posture
    }

    /// The last computed posture without triggering a check.
    pub fn cached(&self) -> Option<SecurityPosture> {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drop the cached posture (session teardown).
    pub fn discard(&self) {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

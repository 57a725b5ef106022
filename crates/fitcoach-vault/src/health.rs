//! Integrity-checked, expiring health record vault.
//!
//! Records are wrapped in an envelope carrying creation and expiry times
//! plus a SHA-256 checksum of the serialized payload, then stored through
//! [`SecureStore::set_sensitive`] under `health:{key}`. The envelope keeps
//! the payload as the exact JSON text that was checksummed, so verification
//! never depends on a float surviving a parse and re-serialize cycle.
//!
//! Reads are strict: an expired record, a record whose checksum no longer
//! matches, and an envelope that does not parse are all deleted and reported
//! as absent. There is no background eviction; stale records go away when
//! read or during [`HealthVault::sweep`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::crypto;
use crate::error::{Result, VaultError};
use crate::store::SecureStore;

/// Sub-prefix inside the sensitive-data partition.
pub const RECORD_PREFIX: &str = "health:";

/// Default time-to-live for a record, in days.
pub const DEFAULT_TTL_DAYS: i64 = 7;

/// Largest accepted serialized payload (1 MiB).
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Longest accepted time-to-live, in days (about a century).
pub const MAX_TTL_DAYS: i64 = 36_500;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The stored envelope around a health payload.
///
/// `payload` is compact JSON text; `checksum` covers exactly those bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub checksum: String,
}

impl HealthRecord {
    fn seal(payload: String, now: DateTime<Utc>, ttl: Duration) -> Result<Self> {
        let expires_at = expiry(now, ttl)?;
        Ok(Self {
            checksum: crypto::checksum(payload.as_bytes()),
            payload,
            created_at: now,
            expires_at,
        })
    }

    fn inspect(&self, now: DateTime<Utc>) -> RecordState {
        if now >= self.expires_at {
            return RecordState::Expired;
        }
        if crypto::checksum(self.payload.as_bytes()) != self.checksum {
            return RecordState::Tampered;
        }
        match serde_json::from_str::<serde::de::IgnoredAny>(&self.payload) {
            Ok(_) => RecordState::Valid,
            Err(_) => RecordState::Malformed,
        }
    }

    /// Deserialize the payload text.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.payload)
    }
}

/// What a read found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Valid,
    Expired,
    Tampered,
    Malformed,
}

/// Eviction counters. Integrity violations are counted apart from plain
/// expiry so operators can tell the two apart.
#[derive(Debug, Default)]
pub struct VaultStats {
    expired: AtomicU64,
    integrity_violations: AtomicU64,
    malformed: AtomicU64,
}

impl VaultStats {
    pub fn expired(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    pub fn integrity_violations(&self) -> u64 {
        self.integrity_violations.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    fn record(&self, state: RecordState) {
        let counter = match state {
            RecordState::Expired => &self.expired,
            RecordState::Tampered => &self.integrity_violations,
            RecordState::Malformed => &self.malformed,
            RecordState::Valid => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for VaultStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expired={} integrity_violations={} malformed={}",
            self.expired(),
            self.integrity_violations(),
            self.malformed()
        )
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Expiring, checksum-verified record storage on top of [`SecureStore`].
pub struct HealthVault {
    store: Arc<SecureStore>,
    clock: Arc<dyn Clock>,
    stats: VaultStats,
}

impl HealthVault {
    pub fn new(store: Arc<SecureStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            stats: VaultStats::default(),
        }
    }

    pub fn stats(&self) -> &VaultStats {
        &self.stats
    }

    /// Store `value` under `key` for `ttl` (default seven days).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::PayloadTooLarge`] if the serialized value is
    /// over [`MAX_PAYLOAD_BYTES`], [`VaultError::TtlOutOfRange`] if `ttl` is
    /// longer than [`MAX_TTL_DAYS`] or does not fit a timestamp, or any error
    /// from the underlying store.
    pub async fn store<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        let size = payload.len();
        if size > MAX_PAYLOAD_BYTES {
            return Err(VaultError::PayloadTooLarge {
                size,
                limit: MAX_PAYLOAD_BYTES,
            });
        }

        let ttl = ttl.unwrap_or_else(|| Duration::days(DEFAULT_TTL_DAYS));
        let record = HealthRecord::seal(payload, self.clock.now(), ttl)?;
        let envelope = serde_json::to_string(&record)?;

        self.store.set_sensitive(&record_key(key), &envelope).await?;
        tracing::debug!(
            key = key,
            bytes = size,
            expires_at = %record.expires_at,
            "stored health record"
        );
        Ok(())
    }

    /// Fetch the payload stored under `key` as raw JSON.
    pub async fn retrieve_value(&self, key: &str) -> Option<serde_json::Value> {
        self.retrieve(key).await
    }

    /// Fetch and deserialize the payload stored under `key`.
    ///
    /// A payload that does not deserialize into `T` is returned as `None`
    /// but left in place; that is a caller type mismatch, not corruption.
    pub async fn retrieve<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let record_key = record_key(key);
        let raw = self.store.get_sensitive(&record_key).await?;
        let record = self.check(&record_key, &raw).await?;
        match record.decode() {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::debug!(key = key, error = %e, "health record has unexpected shape");
                None
            }
        }
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.delete_sensitive(&record_key(key)).await
    }

    /// Keys of all stored records (without the prefix).
    pub async fn keys(&self) -> Vec<String> {
        self.store
            .sensitive_keys()
            .await
            .into_iter()
            .filter_map(|k| k.strip_prefix(RECORD_PREFIX).map(str::to_string))
            .collect()
    }

    /// Evict every expired, tampered, malformed, or undecryptable record.
    ///
    /// Returns the number of records removed.
    pub async fn sweep(&self) -> usize {
        let mut removed = 0;
        for key in self.keys().await {
            let record_key = record_key(&key);
            let Some(raw) = self.store.get_sensitive(&record_key).await else {
                // Present in the listing but unreadable under the current key.
                if self.evict(&record_key, RecordState::Malformed).await {
                    removed += 1;
                }
                continue;
            };
            if self.check(&record_key, &raw).await.is_none() {
                removed += 1;
            }
        }

        tracing::info!(removed = removed, stats = %self.stats, "health vault sweep finished");
        removed
    }

    // -- Internal helpers ---------------------------------------------------

    /// Validate an envelope; evict and return `None` if it is not usable.
    async fn check(&self, record_key: &str, raw: &str) -> Option<HealthRecord> {
        let state = match serde_json::from_str::<HealthRecord>(raw) {
            Ok(record) => match record.inspect(self.clock.now()) {
                RecordState::Valid => return Some(record),
                other => other,
            },
            Err(_) => RecordState::Malformed,
        };
        self.evict(record_key, state).await;
        None
    }

    async fn evict(&self, record_key: &str, state: RecordState) -> bool {
        self.stats.record(state);
        match state {
            RecordState::Tampered => tracing::warn!(
                key = record_key,
                integrity_violation = true,
                "health record checksum mismatch, discarding"
            ),
            RecordState::Malformed => tracing::warn!(
                key = record_key,
                "health record envelope unreadable, discarding"
            ),
            RecordState::Expired => {
                tracing::debug!(key = record_key, "health record expired")
            }
            RecordState::Valid => {}
        }

        match self.store.delete_sensitive(record_key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = record_key, error = %e, "failed to delete health record");
                false
            }
        }
    }
}

fn record_key(key: &str) -> String {
    format!("{RECORD_PREFIX}{key}")
}

/// `now + ttl`, refusing spans past [`MAX_TTL_DAYS`] or past the timestamp
/// range.
fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    let out_of_range = || VaultError::TtlOutOfRange {
        seconds: ttl.num_seconds(),
    };
    if ttl > Duration::days(MAX_TTL_DAYS) {
        return Err(out_of_range());
    }
    now.checked_add_signed(ttl).ok_or_else(out_of_range)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::clock::ManualClock;
    use crate::crypto::EncryptionKey;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct HeartRate {
        bpm: u32,
        resting: bool,
    }

    fn test_vault() -> (Arc<SecureStore>, Arc<ManualClock>, HealthVault) {
        let store = Arc::new(SecureStore::new(
            Arc::new(MemoryBackend::new()),
            EncryptionKey::generate().unwrap(),
        ));
        let clock = Arc::new(ManualClock::starting_now());
        let vault = HealthVault::new(store.clone(), clock.clone());
        (store, clock, vault)
    }

    #[tokio::test]
    async fn store_and_retrieve_typed_record() {
        let (_, _, vault) = test_vault();
        let reading = HeartRate { bpm: 58, resting: true };

        vault.store("heart_rate", &reading, None).await.unwrap();
        assert_eq!(vault.retrieve::<HeartRate>("heart_rate").await, Some(reading));
    }

    #[tokio::test]
    async fn record_expires_after_default_ttl() {
        let (_, clock, vault) = test_vault();
        vault.store("steps", &9_000, None).await.unwrap();

        clock.advance(Duration::days(7) - Duration::seconds(1));
        assert_eq!(vault.retrieve::<u32>("steps").await, Some(9_000));

        clock.advance(Duration::seconds(2));
        assert_eq!(vault.retrieve::<u32>("steps").await, None);
        assert!(vault.keys().await.is_empty());
        assert_eq!(vault.stats().expired(), 1);
    }

    #[tokio::test]
    async fn zero_ttl_is_immediately_absent() {
        let (_, _, vault) = test_vault();
        vault
            .store("weight", &72.5, Some(Duration::zero()))
            .await
            .unwrap();
        assert_eq!(vault.retrieve_value("weight").await, None);
    }

    #[tokio::test]
    async fn tampered_payload_is_discarded() {
        let (store, _, vault) = test_vault();
        vault
            .store("sleep", &serde_json::json!({ "hours": 7 }), None)
            .await
            .unwrap();

        let raw = store.get_sensitive("health:sleep").await.unwrap();
        let tampered = raw.replacen(r#"\"hours\":7"#, r#"\"hours\":9"#, 1);
        assert_ne!(raw, tampered);
        store.set_sensitive("health:sleep", &tampered).await.unwrap();

        assert_eq!(vault.retrieve_value("sleep").await, None);
        assert_eq!(store.get_sensitive("health:sleep").await, None);
        assert_eq!(vault.stats().integrity_violations(), 1);
        assert_eq!(vault.stats().expired(), 0);
    }

    #[tokio::test]
    async fn malformed_envelope_is_discarded() {
        let (store, _, vault) = test_vault();
        store.set_sensitive("health:junk", "{not json").await.unwrap();

        assert_eq!(vault.retrieve_value("junk").await, None);
        assert_eq!(vault.stats().malformed(), 1);
    }

    #[tokio::test]
    async fn oversized_payload_rejected() {
        let (_, _, vault) = test_vault();
        let big = "x".repeat(MAX_PAYLOAD_BYTES + 1);
        let result = vault.store("big", &big, None).await;
        assert!(matches!(result, Err(VaultError::PayloadTooLarge { .. })));
    }

    #[tokio::test]
    async fn sweep_removes_only_bad_records() {
        let (store, clock, vault) = test_vault();
        vault.store("fresh", &1, Some(Duration::hours(2))).await.unwrap();
        vault.store("stale", &2, Some(Duration::minutes(5))).await.unwrap();
        store.set_sensitive("health:broken", "[]").await.unwrap();
        store.set_sensitive("oauth_token", "keep-me").await.unwrap();

        clock.advance(Duration::minutes(10));
        let removed = vault.sweep().await;

        assert_eq!(removed, 2);
        assert_eq!(vault.keys().await, ["fresh"]);
        assert_eq!(store.get_sensitive("oauth_token").await.as_deref(), Some("keep-me"));
    }

    #[tokio::test]
    async fn computed_floats_survive_verification() {
        let (_, _, vault) = test_vault();
        let base = 40.0 / 3.0 * 1.000_000_1;

        for i in 0..2_000 {
            let weight = f64::from(i) * 0.001 + base;
            let pace = 1.0 / (f64::from(i) + 3.0);
            let payload = serde_json::json!({ "weight_kg": weight, "pace": [pace, -pace] });

            vault.store("weight", &payload, None).await.unwrap();
            assert_eq!(vault.retrieve_value("weight").await, Some(payload), "i = {i}");
        }
        assert_eq!(vault.retrieve::<f64>("missing").await, None);
        assert_eq!(vault.stats().integrity_violations(), 0);
    }

    #[tokio::test]
    async fn extreme_float_bit_patterns_survive_verification() {
        let (_, _, vault) = test_vault();
        let values = [
            f64::MIN_POSITIVE,
            f64::MAX,
            f64::MIN,
            f64::EPSILON,
            5e-324,
            0.1 + 0.2,
            std::f64::consts::PI,
            f64::from_bits(0x3FD5_5555_5555_5555),
        ];

        vault.store("extremes", &values, None).await.unwrap();
        assert_eq!(vault.retrieve::<Vec<f64>>("extremes").await, Some(values.to_vec()));
        assert_eq!(vault.stats().integrity_violations(), 0);
    }

    #[tokio::test]
    async fn longest_allowed_ttl_is_accepted() {
        let (_, clock, vault) = test_vault();
        vault
            .store("baseline", &1, Some(Duration::days(MAX_TTL_DAYS)))
            .await
            .unwrap();

        clock.advance(Duration::days(MAX_TTL_DAYS - 1));
        assert_eq!(vault.retrieve::<u32>("baseline").await, Some(1));
    }

    #[tokio::test]
    async fn oversized_ttl_is_rejected_not_a_panic() {
        let (_, _, vault) = test_vault();
        for ttl in [
            Duration::days(MAX_TTL_DAYS + 1),
            Duration::MAX,
            Duration::days(1_000_000),
        ] {
            let result = vault.store("k", &1, Some(ttl)).await;
            assert!(matches!(result, Err(VaultError::TtlOutOfRange { .. })), "{ttl:?}");
        }
        assert!(vault.keys().await.is_empty());
    }

    #[tokio::test]
    async fn negative_ttl_is_immediately_absent() {
        let (_, _, vault) = test_vault();
        vault.store("k", &1, Some(Duration::hours(-1))).await.unwrap();
        assert_eq!(vault.retrieve::<u32>("k").await, None);

        let result = vault.store("k", &1, Some(Duration::MIN)).await;
        assert!(matches!(result, Err(VaultError::TtlOutOfRange { .. })));
    }

    #[tokio::test]
    async fn type_mismatch_keeps_record() {
        let (_, _, vault) = test_vault();
        vault.store("note", &"hello", None).await.unwrap();

        assert_eq!(vault.retrieve::<u32>("note").await, None);
        assert_eq!(vault.retrieve::<String>("note").await.as_deref(), Some("hello"));
    }
}

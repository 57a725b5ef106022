//! Integration tests for the fitcoach-vault crate.
//!
//! These exercise the full vault stack: fingerprint key derivation, the
//! encrypted store on both backends, and the expiring health vault.

use std::sync::Arc;

use chrono::Duration;
use fitcoach_vault::crypto::{self, EnvironmentFingerprint};
use fitcoach_vault::{
    HealthVault, KvBackend, ManualClock, MemoryBackend, PostureLevel, PostureMonitor,
    SecureStore, SqliteBackend,
};

const OPENAI_KEY: &str = "sk-proj-abcdefghijklmnopqrstuvwxyz";

fn browser() -> EnvironmentFingerprint {
    EnvironmentFingerprint::new(
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15",
        "en-GB",
        2560,
        1440,
    )
}

// ═══════════════════════════════════════════════════════════════════════
//  Environment-derived keys
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn same_environment_reads_previous_session() {
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());

    let first = SecureStore::new(backend.clone(), crypto::derive_key(&browser()));
    first.set_credential("openai", OPENAI_KEY).await.unwrap();
    drop(first);

    let second = SecureStore::new(backend, crypto::derive_key(&browser()));
    assert_eq!(second.get_credential("openai").await.as_deref(), Some(OPENAI_KEY));
}

#[tokio::test]
async fn changed_environment_reads_as_not_configured() {
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());

    let first = SecureStore::new(backend.clone(), crypto::derive_key(&browser()));
    first.set_credential("openai", OPENAI_KEY).await.unwrap();

    let mut resized = browser();
    resized.screen_width = 1280;
    let second = SecureStore::new(backend, crypto::derive_key(&resized));

    assert_eq!(second.get_credential("openai").await, None);
    assert_eq!(second.list_providers().await, ["openai"]);
}

// ═══════════════════════════════════════════════════════════════════════
//  SQLite-backed lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn sqlite_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.db");

    {
        let backend = Arc::new(SqliteBackend::open(&path).unwrap());
        let store = SecureStore::new(backend, crypto::derive_key(&browser()));
        store.set_credential("openai", OPENAI_KEY).await.unwrap();
        store.set_sensitive("google_oauth", "ya29.token").await.unwrap();
    }

    let backend = Arc::new(SqliteBackend::open(&path).unwrap());
    let store = SecureStore::new(backend, crypto::derive_key(&browser()));
    assert_eq!(store.get_credential("openai").await.as_deref(), Some(OPENAI_KEY));
    assert_eq!(store.get_sensitive("google_oauth").await.as_deref(), Some("ya29.token"));

    assert_eq!(store.clear_all().await.unwrap(), 2);
    assert!(store.list_providers().await.is_empty());
    assert!(store.sensitive_keys().await.is_empty());
}

#[tokio::test]
async fn empty_credential_after_value_is_absent() {
    let store = SecureStore::new(
        Arc::new(SqliteBackend::open_in_memory().unwrap()),
        crypto::derive_key(&browser()),
    );

    store.set_credential("openai", OPENAI_KEY).await.unwrap();
    store.set_credential("openai", "").await.unwrap();
    assert_eq!(store.get_credential("openai").await, None);
}

// ═══════════════════════════════════════════════════════════════════════
//  Health records
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn health_record_lifecycle_on_sqlite() {
    let store = Arc::new(SecureStore::new(
        Arc::new(SqliteBackend::open_in_memory().unwrap()),
        crypto::derive_key(&browser()),
    ));
    let clock = Arc::new(ManualClock::starting_now());
    let vault = HealthVault::new(store.clone(), clock.clone());

    let metrics = serde_json::json!({
        "weight_kg": 71.4,
        "body_fat": 0.18,
        "goals": ["5k", "sleep 8h"],
    });
    vault.store("metrics", &metrics, Some(Duration::days(1))).await.unwrap();
    assert_eq!(vault.retrieve_value("metrics").await, Some(metrics));

    clock.advance(Duration::days(1));
    assert_eq!(vault.retrieve_value("metrics").await, None);
    assert!(vault.keys().await.is_empty());
}

#[tokio::test]
async fn single_byte_payload_mutation_is_detected() {
    let store = Arc::new(SecureStore::new(
        Arc::new(MemoryBackend::new()),
        crypto::derive_key(&browser()),
    ));
    let vault = HealthVault::new(store.clone(), Arc::new(ManualClock::starting_now()));

    vault.store("calories", &[2100, 1950, 2300], None).await.unwrap();

    let raw = store.get_sensitive("health:calories").await.unwrap();
    let tampered = raw.replacen("2100", "2101", 1);
    store.set_sensitive("health:calories", &tampered).await.unwrap();

    assert_eq!(vault.retrieve::<Vec<u32>>("calories").await, None);
    assert_eq!(vault.stats().integrity_violations(), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  Posture
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn migrating_legacy_credentials_restores_secure_posture() {
    let backend = Arc::new(MemoryBackend::new());
    backend.set("anthropic_api_key", "sk-ant-legacy").await.unwrap();

    let store = Arc::new(SecureStore::new(backend.clone(), crypto::derive_key(&browser())));
    let posture = PostureMonitor::new(store.clone(), Arc::new(ManualClock::starting_now()));

    assert_eq!(posture.recheck().await.level, PostureLevel::Warning);

    store.migrate_legacy_credentials().await.unwrap();
    assert_eq!(posture.recheck().await.level, PostureLevel::Secure);
    assert_eq!(
        store.get_credential("anthropic").await.as_deref(),
        Some("sk-ant-legacy")
    );
    assert_eq!(backend.get("anthropic_api_key").await.unwrap(), None);
}

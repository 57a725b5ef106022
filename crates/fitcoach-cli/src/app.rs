//! Composition root: builds the shared vault components from configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use fitcoach_guard::ApiSecurityManager;
use fitcoach_vault::crypto;
use fitcoach_vault::{
    Clock, HealthVault, KvBackend, PostureMonitor, SecureStore, SqliteBackend, SystemClock,
};

use crate::config::Config;

pub struct App {
    pub config: Config,
    pub db_path: PathBuf,
    pub store: Arc<SecureStore>,
    pub health: Arc<HealthVault>,
    pub posture: Arc<PostureMonitor>,
    pub guard: ApiSecurityManager,
}

impl App {
    /// Open the vault database and wire every component to it.
    pub fn open(config: Config, db_override: Option<PathBuf>) -> Result<Self> {
        let db_path = db_override.unwrap_or_else(|| config.storage.path.clone());
        let backend: Arc<dyn KvBackend> = Arc::new(
            SqliteBackend::open(&db_path)
                .with_context(|| format!("failed to open vault at {}", db_path.display()))?,
        );

        let fingerprint = config.fingerprint.resolve();
        if fingerprint.is_weak() {
            tracing::warn!("fingerprint has no user agent; derived key is weak");
        }
        let key = crypto::derive_key(&fingerprint);

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(SecureStore::new(backend, key));
        let health = Arc::new(HealthVault::new(store.clone(), clock.clone()));

        let recheck = chrono::Duration::from_std(config.session.posture_recheck())
            .context("posture recheck interval out of range")?;
        let posture = Arc::new(
            PostureMonitor::new(store.clone(), clock.clone())
                .with_weak_fingerprint(fingerprint.is_weak())
                .with_recheck_interval(recheck),
        );

        let guard =
            ApiSecurityManager::new(clock.clone()).with_overrides(config.rate_limits.clone());

        tracing::debug!(db = %db_path.display(), "vault opened");
        Ok(Self {
            config,
            db_path,
            store,
            health,
            posture,
            guard,
        })
    }
}

//! Vault wipe run on session expiry.

use std::sync::Arc;

use async_trait::async_trait;
use fitcoach_vault::{HealthVault, SecureStore};

use crate::monitor::ExpiryHandler;

/// Sweeps stale health records, then removes every credential and every
/// sensitive value from the store.
pub struct VaultWipe {
    store: Arc<SecureStore>,
    health: Arc<HealthVault>,
}

impl VaultWipe {
    pub fn new(store: Arc<SecureStore>, health: Arc<HealthVault>) -> Self {
        Self { store, health }
    }
}

#[async_trait]
impl ExpiryHandler for VaultWipe {
    async fn on_expire(&self) {
        let swept = self.health.sweep().await;
        match self.store.clear_all().await {
            Ok(removed) => {
                tracing::info!(swept = swept, removed = removed, "vault wiped on session expiry");
            }
            Err(e) => {
                tracing::error!(error = %e, swept = swept, "vault wipe failed");
            }
        }
    }
}

//! Namespaced, encrypted key-value store.
//!
//! [`SecureStore`] sits on top of a host [`KvBackend`] and keeps two
//! partitions apart by key prefix:
//!
//! - `api:{provider}`: third-party API credentials.
//! - `data:{key}`: other sensitive values (OAuth tokens, health records).
//!
//! Every value is encrypted with the environment-derived key before it
//! reaches the backend. Reads never distinguish "missing" from "could not
//! decrypt" or "storage is down": all three come back as `None`.

use std::sync::Arc;

use crate::backend::KvBackend;
use crate::crypto::{self, EncryptionKey};
use crate::error::{Result, VaultError};
use crate::validate;

/// Prefix for the credential partition.
pub const API_PREFIX: &str = "api:";

/// Prefix for the generic sensitive-data partition.
pub const DATA_PREFIX: &str = "data:";

/// Plaintext keys written by builds that predate the vault, paired with the
/// provider each one belongs to.
pub const LEGACY_CREDENTIAL_KEYS: &[(&str, &str)] = &[
    ("openai_api_key", "openai"),
    ("anthropic_api_key", "anthropic"),
    ("google_api_key", "google"),
    ("strava_access_token", "strava"),
];

/// The logical partition a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Api,
    Data,
}

impl Namespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Api => API_PREFIX,
            Self::Data => DATA_PREFIX,
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{name}", self.prefix())
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Api => "api",
            Self::Data => "data",
        })
    }
}

/// Encrypted, namespaced key-value store.
pub struct SecureStore {
    backend: Arc<dyn KvBackend>,
    key: EncryptionKey,
}

impl SecureStore {
    pub fn new(backend: Arc<dyn KvBackend>, key: EncryptionKey) -> Self {
        tracing::debug!(backend = backend.name(), "secure store ready");
        Self { backend, key }
    }

    /// The key this store encrypts with.
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.key
    }

    // -- Credentials --------------------------------------------------------

    /// Store an API credential for `provider`.
    ///
    /// An empty or whitespace-only `value` deletes the entry instead. The
    /// trimmed value must pass the provider's format check.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidCredential`] for a malformed key,
    /// [`VaultError::EncryptionFailed`] if encryption fails (nothing is
    /// written), or a storage error.
    pub async fn set_credential(&self, provider: &str, value: &str) -> Result<()> {
        let value = value.trim();
        if value.is_empty() {
            return self.delete_credential(provider).await;
        }

        validate::validate_credential(provider, value).map_err(|source| {
            VaultError::InvalidCredential {
                provider: provider.to_string(),
                source,
            }
        })?;

        self.put(Namespace::Api, provider, value).await?;
        tracing::info!(provider = provider, "stored credential");
        Ok(())
    }

    /// Fetch the plaintext credential for `provider`, if any.
    pub async fn get_credential(&self, provider: &str) -> Option<String> {
        self.fetch(Namespace::Api, provider).await
    }

    pub async fn has_credential(&self, provider: &str) -> bool {
        self.get_credential(provider).await.is_some()
    }

    pub async fn delete_credential(&self, provider: &str) -> Result<()> {
        self.remove(Namespace::Api, provider).await?;
        tracing::info!(provider = provider, "deleted credential");
        Ok(())
    }

    /// Providers with an entry in the credential partition. Entries are not
    /// decrypted, so an entry written under another key is still listed.
    pub async fn list_providers(&self) -> Vec<String> {
        self.names(Namespace::Api).await
    }

    // -- Sensitive data -----------------------------------------------------

    /// Store a sensitive value under `key`. Empty values delete the entry.
    pub async fn set_sensitive(&self, key: &str, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return self.remove(Namespace::Data, key).await;
        }
        self.put(Namespace::Data, key, value).await?;
        tracing::debug!(key = key, "stored sensitive value");
        Ok(())
    }

    pub async fn get_sensitive(&self, key: &str) -> Option<String> {
        self.fetch(Namespace::Data, key).await
    }

    pub async fn delete_sensitive(&self, key: &str) -> Result<()> {
        self.remove(Namespace::Data, key).await
    }

    /// Names in the sensitive-data partition (without the prefix).
    pub async fn sensitive_keys(&self) -> Vec<String> {
        self.names(Namespace::Data).await
    }

    // -- Bulk ---------------------------------------------------------------

    /// Remove every entry in both partitions in a single backend call.
    ///
    /// Returns the number of removed entries.
    pub async fn clear_all(&self) -> Result<usize> {
        let removed = self
            .backend
            .delete_prefixed(&[API_PREFIX, DATA_PREFIX])
            .await?;
        tracing::warn!(removed = removed, "cleared all vault entries");
        Ok(removed)
    }

    // -- Legacy plaintext ---------------------------------------------------

    /// Legacy plaintext credential keys currently present in the backend.
    pub async fn legacy_plaintext_keys(&self) -> Vec<String> {
        let keys = match self.backend.list_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list keys for legacy scan");
                return Vec::new();
            }
        };
        LEGACY_CREDENTIAL_KEYS
            .iter()
            .filter(|(legacy, _)| keys.iter().any(|k| k == legacy))
            .map(|(legacy, _)| legacy.to_string())
            .collect()
    }

    /// Re-store every legacy plaintext credential encrypted under its
    /// provider and delete the plaintext copy.
    ///
    /// The format check is skipped so that a key the user already relies on
    /// is never dropped during migration. Returns how many were migrated.
    pub async fn migrate_legacy_credentials(&self) -> Result<usize> {
        let mut migrated = 0;
        for (legacy, provider) in LEGACY_CREDENTIAL_KEYS {
            let Some(plaintext) = self.backend.get(legacy).await? else {
                continue;
            };
            if !plaintext.trim().is_empty() {
                self.put(Namespace::Api, provider, plaintext.trim()).await?;
                migrated += 1;
            }
            self.backend.delete(legacy).await?;
            tracing::info!(provider = provider, "migrated legacy plaintext credential");
        }
        Ok(migrated)
    }

    // -- Internal helpers ---------------------------------------------------

    async fn put(&self, namespace: Namespace, name: &str, value: &str) -> Result<()> {
        let ciphertext = crypto::encrypt(value, &self.key).inspect_err(|e| {
            tracing::error!(
                namespace = %namespace,
                name = name,
                error = %e,
                "encryption failed, refusing to persist"
            );
        })?;
        self.backend.set(&namespace.key(name), &ciphertext).await
    }

    async fn fetch(&self, namespace: Namespace, name: &str) -> Option<String> {
        let stored = match self.backend.get(&namespace.key(name)).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(namespace = %namespace, name = name, error = %e, "storage read failed");
                return None;
            }
        };

        match crypto::decrypt(&stored, &self.key) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                tracing::debug!(
                    namespace = %namespace,
                    name = name,
                    error = %e,
                    "stored value could not be decrypted"
                );
                None
            }
        }
    }

    async fn remove(&self, namespace: Namespace, name: &str) -> Result<()> {
        self.backend.delete(&namespace.key(name)).await
    }

    async fn names(&self, namespace: Namespace) -> Vec<String> {
        match self.backend.list_keys().await {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(namespace.prefix()).map(str::to_string))
                .collect(),
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "storage list failed");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

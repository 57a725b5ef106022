//! Local secure vault for FitCoach.
//!
//! This crate protects third-party API credentials and sensitive health data
//! at rest in an untrusted, persistent key-value store. Values are encrypted
//! with AES-256-GCM under a key derived from the runtime environment, health
//! records carry a checksum and an expiry, and every read path collapses
//! failures into absence so callers never have to handle a crash.
//!
//! The environment-derived key is a convenience, not a secret: code running
//! in the same environment can rebuild it. The threat model is data at rest
//! read by something that does not share that environment.
//!
//! # Modules
//!
//! - [`crypto`]: fingerprint key derivation, AES-256-GCM string framing.
//! - [`backend`]: the host [`KvBackend`] contract plus memory and SQLite
//!   implementations.
//! - [`store`]: namespaced encrypted store for credentials and sensitive data.
//! - [`health`]: checksum-verified, expiring health records.
//! - [`validate`]: per-provider credential format checks.
//! - [`posture`]: on-demand security posture report.
//! - [`clock`]: injectable time source.
//! - [`error`]: unified error types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fitcoach_vault::crypto::{self, EnvironmentFingerprint};
//! use fitcoach_vault::{HealthVault, MemoryBackend, SecureStore, SystemClock};
//!
//! # async fn example() -> fitcoach_vault::Result<()> {
//! let fingerprint = EnvironmentFingerprint::new("Mozilla/5.0", "en-US", 1920, 1080);
//! let key = crypto::derive_key(&fingerprint);
//!
//! let store = Arc::new(SecureStore::new(Arc::new(MemoryBackend::new()), key));
//! store.set_credential("openai", "sk-proj-abcdefghijklmnopqrstuvwxyz").await?;
//! assert!(store.get_credential("openai").await.is_some());
//!
//! let vault = HealthVault::new(store.clone(), Arc::new(SystemClock));
//! vault.store("resting_heart_rate", &58, None).await?;
//! assert_eq!(vault.retrieve::<u32>("resting_heart_rate").await, Some(58));
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod health;
pub mod posture;
pub mod store;
pub mod validate;

pub use backend::{KvBackend, MemoryBackend, SqliteBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{EncryptionKey, EnvironmentFingerprint};
pub use error::{Result, VaultError};
pub use health::{HealthRecord, HealthVault, VaultStats};
pub use posture::{PostureLevel, PostureMonitor, SecurityPosture};
pub use store::{Namespace, SecureStore};
pub use validate::{FormatError, provider_id, validate_credential};

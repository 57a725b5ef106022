//! Session security for FitCoach.
//!
//! A [`SessionMonitor`] tracks user activity and, after a configurable idle
//! period, wipes the vault through an [`ExpiryHandler`] (normally
//! [`VaultWipe`]). Periodic checks run on a [`TimerScheduler`], which owns
//! cancellable repeating tasks and aborts them all on shutdown or drop.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fitcoach_session::{SessionConfig, SessionMonitor, TimerScheduler, VaultWipe};
//! use fitcoach_vault::crypto::{self, EnvironmentFingerprint};
//! use fitcoach_vault::{HealthVault, MemoryBackend, SecureStore, SystemClock};
//!
//! # async fn example() -> fitcoach_session::Result<()> {
//! let key = crypto::derive_key(&EnvironmentFingerprint::new("agent", "en-US", 1280, 800));
//! let store = Arc::new(SecureStore::new(Arc::new(MemoryBackend::new()), key));
//! let health = Arc::new(HealthVault::new(store.clone(), Arc::new(SystemClock)));
//!
//! let monitor = Arc::new(SessionMonitor::new(
//!     SessionConfig::default(),
//!     Arc::new(VaultWipe::new(store, health)),
//! ));
//! let scheduler = TimerScheduler::new();
//! monitor.start(&scheduler)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod monitor;
pub mod scheduler;
pub mod wipe;

pub use error::{Result, SessionError};
pub use monitor::{
    ActivityKind, ExpiryHandler, SessionConfig, SessionEvent, SessionMonitor, SessionState,
};
pub use scheduler::{TaskId, TaskInfo, TaskStatus, TimerScheduler};
pub use wipe::VaultWipe;

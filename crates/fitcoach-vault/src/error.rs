//! Vault error types.
//!
//! All vault subsystems surface errors through [`VaultError`]. Read paths in
//! the public API collapse every failure into absence (`None`), so these
//! errors are mostly seen by write paths and by the backends themselves.

use crate::validate::FormatError;

/// Unified error type for the FitCoach secure vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Crypto errors ------------------------------------------------------
    /// Encryption failed. Nothing is persisted when this is returned.
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Decryption failed (wrong key, corrupted ciphertext, bad framing).
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    // -- Input errors -------------------------------------------------------
    /// The credential does not match the provider's expected format.
    #[error("invalid credential for {provider}: {source}")]
    InvalidCredential {
        provider: String,
        #[source]
        source: FormatError,
    },

    /// A record payload exceeds the vault's size limit.
    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    /// A record time-to-live is too long to represent as an expiry.
    #[error("ttl out of range: {seconds}s")]
    TtlOutOfRange { seconds: i64 },

    // -- Storage errors -----------------------------------------------------
    /// The host key-value storage is unavailable (disabled, quota exceeded).
    #[error("storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    /// SQLite error from `rusqlite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking storage task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors that don't fit a specific
    /// variant.
    #[error("internal vault error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;

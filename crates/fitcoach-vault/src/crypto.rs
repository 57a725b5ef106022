//! Environment-derived key material and AES-256-GCM string encryption.
//!
//! This module provides the cryptographic primitives for the vault:
//!
//! - **Key derivation**: SHA-256 over an [`EnvironmentFingerprint`] and a
//!   fixed application salt. No user password is involved.
//! - **Encryption/decryption**: AES-256-GCM with a random 96-bit nonce per
//!   call, framed as `v1.` + base64(`nonce || ciphertext || tag`).
//! - **Checksums**: hex SHA-256 digests used by the health record vault.
//!
//! # Security Notes
//!
//! - The fingerprint is not a secret. Anything that can read the same
//!   environment attributes can rebuild the key, so this only protects data
//!   at rest against readers that do not also run in the same environment.
//! - A changed fingerprint (new user agent, locale, or display) yields a
//!   different key. Old ciphertexts then fail authentication and are treated
//!   as absent by the store.
//! - Encryption is fail-closed: any failure is returned as an error and the
//!   caller must not persist anything.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the GCM authentication tag appended by `ring`.
pub const TAG_LEN: usize = 16;

/// Prefix marking a framed vault ciphertext.
pub const CIPHERTEXT_PREFIX: &str = "v1.";

/// Application salt mixed into the fingerprint digest. Changing this
/// invalidates every stored ciphertext.
const APP_SALT: &[u8] = b"fitcoach-secure-vault-v1";

/// Separator between fingerprint fields so that `("ab", "c")` and
/// `("a", "bc")` hash differently.
const FIELD_SEPARATOR: u8 = 0x1f;

/// AES-256-GCM algorithm from `ring`.
static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Fingerprint and key
// ---------------------------------------------------------------------------

/// The environment attributes the encryption key is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentFingerprint {
    pub user_agent: String,
    pub language: String,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl EnvironmentFingerprint {
    pub fn new(
        user_agent: impl Into<String>,
        language: impl Into<String>,
        screen_width: u32,
        screen_height: u32,
    ) -> Self {
        Self {
            user_agent: user_agent.into(),
            language: language.into(),
            screen_width,
            screen_height,
        }
    }

    /// A fingerprint with no user agent carries almost no entropy.
    pub fn is_weak(&self) -> bool {
        self.user_agent.trim().is_empty()
    }

    fn material(&self) -> Vec<u8> {
        let geometry = format!("{}x{}", self.screen_width, self.screen_height);
        let mut material = Vec::with_capacity(
            self.user_agent.len() + self.language.len() + geometry.len() + APP_SALT.len() + 3,
        );
        material.extend_from_slice(self.user_agent.as_bytes());
        material.push(FIELD_SEPARATOR);
        material.extend_from_slice(self.language.as_bytes());
        material.push(FIELD_SEPARATOR);
        material.extend_from_slice(geometry.as_bytes());
        material.push(FIELD_SEPARATOR);
        material.extend_from_slice(APP_SALT);
        material
    }
}

/// A 256-bit symmetric key. Never persisted; rebuilt from the fingerprint.
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a random key (tests and throwaway sessions).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Internal`] if the system CSPRNG fails.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| VaultError::Internal("failed to generate random key".into()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        ring::constant_time::verify_slices_are_equal(&self.0, &other.0).is_ok()
    }
}

impl Eq for EncryptionKey {}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Derive the vault key from environment fingerprint material.
///
/// Pure and deterministic: the same fingerprint always yields the same key.
pub fn derive_key(fingerprint: &EnvironmentFingerprint) -> EncryptionKey {
    let digest = digest::digest(&digest::SHA256, &fingerprint.material());
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(digest.as_ref());

    tracing::debug!(
        weak = fingerprint.is_weak(),
        "derived vault key from environment fingerprint"
    );

    EncryptionKey(key)
}

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A single-use nonce sequence that yields exactly one nonce and then errors.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Byte-level AEAD
// ---------------------------------------------------------------------------

/// Seal `plaintext` and return `(nonce, ciphertext || tag)`.
fn seal(plaintext: &[u8], key: &EncryptionKey) -> Result<([u8; NONCE_LEN_BYTES], Vec<u8>)> {
    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;

    let unbound_key =
        UnboundKey::new(AEAD_ALG, key.as_bytes()).map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        })?;

    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    Ok((nonce_bytes, in_out))
}

/// Open `ciphertext || tag` sealed under `nonce`.
fn open(nonce: &[u8; NONCE_LEN_BYTES], ciphertext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
    let unbound_key =
        UnboundKey::new(AEAD_ALG, key.as_bytes()).map_err(|_| VaultError::DecryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        })?;

    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(*nonce));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "authentication failed: wrong key or corrupted data".into(),
        })?;

    Ok(plaintext.to_vec())
}

// ---------------------------------------------------------------------------
// String encryption
// ---------------------------------------------------------------------------

/// Encrypt a string and return the framed ciphertext.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] on any failure. The caller must
/// not fall back to storing `plaintext`.
pub fn encrypt(plaintext: &str, key: &EncryptionKey) -> Result<String> {
    let (nonce, sealed) = seal(plaintext.as_bytes(), key)?;

    let mut framed = Vec::with_capacity(NONCE_LEN_BYTES + sealed.len());
    framed.extend_from_slice(&nonce);
    framed.extend_from_slice(&sealed);

    tracing::trace!(
        plaintext_len = plaintext.len(),
        framed_len = framed.len(),
        "encrypted value"
    );

    Ok(format!("{CIPHERTEXT_PREFIX}{}", BASE64.encode(framed)))
}

/// Decrypt a framed ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`VaultError::DecryptionFailed`] if the framing is wrong, the
/// key does not match, the data was tampered with, or the plaintext is not
/// UTF-8.
pub fn decrypt(ciphertext: &str, key: &EncryptionKey) -> Result<String> {
    let body = ciphertext
        .strip_prefix(CIPHERTEXT_PREFIX)
        .ok_or_else(|| VaultError::DecryptionFailed {
            reason: "value is not a framed vault ciphertext".into(),
        })?;

    let raw = BASE64
        .decode(body)
        .map_err(|e| VaultError::DecryptionFailed {
            reason: format!("invalid base64: {e}"),
        })?;

    if raw.len() < NONCE_LEN_BYTES + TAG_LEN {
        return Err(VaultError::DecryptionFailed {
            reason: format!("ciphertext too short: {} bytes", raw.len()),
        });
    }

    let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN_BYTES);
    let mut nonce = [0u8; NONCE_LEN_BYTES];
    nonce.copy_from_slice(nonce_bytes);

    let plaintext = open(&nonce, sealed, key)?;

    String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed {
        reason: "plaintext is not valid UTF-8".into(),
    })
}

/// Round-trip a fixed sample value through [`encrypt`] and [`decrypt`].
pub fn self_test(key: &EncryptionKey) -> bool {
    const SAMPLE: &str = "fitcoach-vault-self-test";
    match encrypt(SAMPLE, key).and_then(|ct| decrypt(&ct, key)) {
        Ok(roundtrip) => roundtrip == SAMPLE,
        Err(e) => {
            tracing::error!(error = %e, "encryption self-test failed");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Checksums
// ---------------------------------------------------------------------------

/// Lowercase hex SHA-256 of `data`.
pub fn checksum(data: &[u8]) -> String {
    let digest = digest::digest(&digest::SHA256, data);
    digest.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint() -> EnvironmentFingerprint {
        EnvironmentFingerprint::new("Mozilla/5.0 (X11; Linux x86_64)", "en-US", 1920, 1080)
    }

    #[test]
    fn derive_key_is_deterministic() {
        assert_eq!(derive_key(&fingerprint()), derive_key(&fingerprint()));
    }

    #[test]
    fn changed_environment_changes_key() {
        let mut other = fingerprint();
        other.screen_width = 1280;
        assert_ne!(derive_key(&fingerprint()), derive_key(&other));

        let mut other = fingerprint();
        other.language = "de-DE".into();
        assert_ne!(derive_key(&fingerprint()), derive_key(&other));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let a = EnvironmentFingerprint::new("ab", "c", 1, 1);
        let b = EnvironmentFingerprint::new("a", "bc", 1, 1);
        assert_ne!(derive_key(&a), derive_key(&b));
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = derive_key(&fingerprint());
        let ciphertext = encrypt("sk-test-12345", &key).unwrap();

        assert!(ciphertext.starts_with(CIPHERTEXT_PREFIX));
        assert!(!ciphertext.contains("sk-test-12345"));
        assert_eq!(decrypt(&ciphertext, &key).unwrap(), "sk-test-12345");
    }

    #[test]
    fn printable_ascii_roundtrip() {
        let key = derive_key(&fingerprint());
        let printable: String = (0x20u8..0x7f).map(char::from).collect();

        for len in [0, 1, 17, 95, 500, 1000] {
            let input: String = printable.chars().cycle().take(len).collect();
            let ciphertext = encrypt(&input, &key).unwrap();
            assert_eq!(decrypt(&ciphertext, &key).unwrap(), input, "len {len}");
        }
    }

    #[test]
    fn nonces_are_fresh_per_call() {
        let key = derive_key(&fingerprint());
        let a = encrypt("same", &key).unwrap();
        let b = encrypt("same", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let key_a = EncryptionKey::generate().unwrap();
        let key_b = EncryptionKey::generate().unwrap();

        let ciphertext = encrypt("secret data", &key_a).unwrap();
        assert!(matches!(
            decrypt(&ciphertext, &key_b),
            Err(VaultError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn decrypt_with_tampered_ciphertext_fails() {
        let key = EncryptionKey::generate().unwrap();
        let ciphertext = encrypt("secret data", &key).unwrap();

        let body = ciphertext.strip_prefix(CIPHERTEXT_PREFIX).unwrap();
        let mut raw = BASE64.decode(body).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = format!("{CIPHERTEXT_PREFIX}{}", BASE64.encode(raw));

        assert!(decrypt(&tampered, &key).is_err());
    }

    #[test]
    fn plaintext_input_is_not_mistaken_for_ciphertext() {
        let key = EncryptionKey::generate().unwrap();
        assert!(decrypt("sk-plain-legacy-key", &key).is_err());
        assert!(decrypt("v1.not-base64!!", &key).is_err());
        assert!(decrypt("v1.AAAA", &key).is_err());
    }

    #[test]
    fn self_test_passes_with_valid_key() {
        assert!(self_test(&EncryptionKey::generate().unwrap()));
    }

    #[test]
    fn checksum_is_hex_sha256() {
        let sum = checksum(b"abc");
        assert_eq!(
            sum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = EncryptionKey::from_bytes([7u8; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "EncryptionKey(<redacted>)");
    }

    #[test]
    fn weak_fingerprint_detected() {
        assert!(EnvironmentFingerprint::new("  ", "en", 0, 0).is_weak());
        assert!(!fingerprint().is_weak());
    }
}

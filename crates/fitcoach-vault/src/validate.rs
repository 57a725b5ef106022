//! Per-provider credential format checks.
//!
//! These checks are advisory and client-side only. They stop obviously
//! malformed keys from being persisted or sent anywhere; they say nothing
//! about whether a key is actually accepted by the provider.

use std::sync::LazyLock;

use regex::Regex;

/// Why a credential was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("credential is empty")]
    Empty,

    #[error("expected prefix `{expected}`")]
    MissingPrefix { expected: &'static str },

    #[error("too short: {actual} characters, need at least {min}")]
    TooShort { min: usize, actual: usize },

    #[error("contains characters outside {allowed}")]
    InvalidCharacters { allowed: &'static str },
}

/// The expected shape of one provider's credentials.
#[derive(Debug)]
pub struct CredentialFormat {
    pub prefix: &'static str,
    pub min_len: usize,
    pub allowed: &'static str,
    charset: Regex,
}

impl CredentialFormat {
    fn new(prefix: &'static str, min_len: usize, allowed: &'static str, charset: &str) -> Self {
        Self {
            prefix,
            min_len,
            allowed,
            // The patterns below are literals; a failure here is a typo.
            charset: Regex::new(charset).unwrap_or_else(|e| panic!("bad charset pattern: {e}")),
        }
    }

    fn check(&self, key: &str) -> Result<(), FormatError> {
        if !key.starts_with(self.prefix) {
            return Err(FormatError::MissingPrefix {
                expected: self.prefix,
            });
        }
        let len = key.chars().count();
        if len < self.min_len {
            return Err(FormatError::TooShort {
                min: self.min_len,
                actual: len,
            });
        }
        if !self.charset.is_match(key) {
            return Err(FormatError::InvalidCharacters {
                allowed: self.allowed,
            });
        }
        Ok(())
    }
}

static FORMATS: LazyLock<Vec<(&'static str, CredentialFormat)>> = LazyLock::new(|| {
    vec![
        (
            "openai",
            CredentialFormat::new("sk-", 20, "[A-Za-z0-9_-]", r"^[A-Za-z0-9_-]+$"),
        ),
        (
            "anthropic",
            CredentialFormat::new("sk-ant-", 40, "[A-Za-z0-9_-]", r"^[A-Za-z0-9_-]+$"),
        ),
        (
            "google",
            CredentialFormat::new("AIza", 39, "[A-Za-z0-9_-]", r"^[A-Za-z0-9_-]+$"),
        ),
        (
            "strava",
            CredentialFormat::new("", 40, "lowercase hex", r"^[0-9a-f]+$"),
        ),
    ]
});

/// Canonical provider name: trimmed and ASCII-lowercased. Every per-provider
/// table is keyed by this form.
pub fn provider_id(provider: &str) -> String {
    provider.trim().to_ascii_lowercase()
}

/// Look up the format for a provider (case-insensitive).
pub fn format_for(provider: &str) -> Option<&'static CredentialFormat> {
    let provider = provider_id(provider);
    FORMATS
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, format)| format)
}

/// Names of providers with a known format.
pub fn known_providers() -> impl Iterator<Item = &'static str> {
    FORMATS.iter().map(|(name, _)| *name)
}

/// Validate `key` for `provider`.
///
/// Empty keys are always invalid. Unknown providers accept any non-empty
/// key.
pub fn validate_credential(provider: &str, key: &str) -> Result<(), FormatError> {
    if key.trim().is_empty() {
        return Err(FormatError::Empty);
    }
    match format_for(provider) {
        Some(format) => format.check(key),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_are_normalised() {
        assert_eq!(provider_id("  OpenAI "), "openai");
        assert!(format_for("STRAVA").is_some());
    }

    #[test]
    fn empty_key_always_invalid() {
        assert_eq!(validate_credential("openai", ""), Err(FormatError::Empty));
        assert_eq!(validate_credential("unknown", "   "), Err(FormatError::Empty));
    }

    #[test]
    fn openai_shape() {
        assert!(validate_credential("openai", "sk-abcdefghijklmnopqrstuvwxyz").is_ok());
        assert_eq!(
            validate_credential("openai", "pk-abcdefghijklmnopqrstuvwxyz"),
            Err(FormatError::MissingPrefix { expected: "sk-" })
        );
        assert!(matches!(
            validate_credential("openai", "sk-short"),
            Err(FormatError::TooShort { min: 20, actual: 8 })
        ));
        assert!(matches!(
            validate_credential("openai", "sk-abcdefghij klmnopqrstuv"),
            Err(FormatError::InvalidCharacters { .. })
        ));
    }

    #[test]
    fn anthropic_requires_longer_prefix() {
        let key = format!("sk-ant-{}", "a".repeat(40));
        assert!(validate_credential("anthropic", &key).is_ok());
        assert!(matches!(
            validate_credential("anthropic", "sk-abcdefghijklmnopqrstuvwxyz0123456789abcd"),
            Err(FormatError::MissingPrefix { .. })
        ));
    }

    #[test]
    fn google_shape() {
        let key = format!("AIza{}", "B".repeat(35));
        assert!(validate_credential("google", &key).is_ok());
        assert!(validate_credential("Google", &key).is_ok());
    }

    #[test]
    fn strava_requires_hex() {
        assert!(validate_credential("strava", &"ab12".repeat(10)).is_ok());
        assert!(matches!(
            validate_credential("strava", &"XYZ1".repeat(10)),
            Err(FormatError::InvalidCharacters { .. })
        ));
    }

    #[test]
    fn unknown_provider_accepts_anything_non_empty() {
        assert!(validate_credential("withings", "x").is_ok());
    }

    #[test]
    fn known_provider_list() {
        let names: Vec<_> = known_providers().collect();
        assert_eq!(names, ["openai", "anthropic", "google", "strava"]);
    }
}

//! `fitcoach.toml` loading.
//!
//! Every field has a default, and a missing file yields the defaults. A file
//! that exists but does not parse is an error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use fitcoach_guard::RatePolicy;
use fitcoach_session::SessionConfig;
use fitcoach_vault::EnvironmentFingerprint;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/fitcoach.toml";
pub const DEFAULT_DB_PATH: &str = "data/fitcoach.db";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub fingerprint: FingerprintConfig,
    pub session: SessionSettings,
    pub rate_limits: HashMap<String, RatePolicy>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

/// Fingerprint fields. Unset fields are filled from the process
/// environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            language: None,
            screen_width: 1920,
            screen_height: 1080,
        }
    }
}

impl FingerprintConfig {
    pub fn resolve(&self) -> EnvironmentFingerprint {
        let user_agent = self.user_agent.clone().unwrap_or_else(|| {
            format!(
                "fitcoach-cli/{} ({})",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS
            )
        });
        let language = self
            .language
            .clone()
            .or_else(|| std::env::var("LANG").ok().and_then(|lang| language_tag(&lang)))
            .unwrap_or_else(|| "en-US".to_string());

        EnvironmentFingerprint::new(user_agent, language, self.screen_width, self.screen_height)
    }
}

/// `en_GB.UTF-8` -> `en-GB`. `C` and `POSIX` carry no language.
fn language_tag(locale: &str) -> Option<String> {
    let base = locale.split(['.', '@']).next()?.trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub warn_after_secs: u64,
    pub expire_after_secs: u64,
    pub tick_secs: u64,
    pub posture_recheck_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            warn_after_secs: defaults.warn_after.as_secs(),
            expire_after_secs: defaults.expire_after.as_secs(),
            tick_secs: defaults.tick.as_secs(),
            posture_recheck_secs: 30 * 60,
        }
    }
}

impl SessionSettings {
    pub fn monitor_config(&self) -> SessionConfig {
        SessionConfig {
            warn_after: Duration::from_secs(self.warn_after_secs),
            expire_after: Duration::from_secs(self.expire_after_secs),
            tick: Duration::from_secs(self.tick_secs),
        }
    }

    pub fn posture_recheck(&self) -> Duration {
        Duration::from_secs(self.posture_recheck_secs)
    }
}

impl Config {
    /// Load from `path`, or from [`DEFAULT_CONFIG_PATH`] when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };

        let config = Self::parse(&content).with_context(|| format!("invalid {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        let s = &self.session;
        if s.tick_secs == 0 || s.posture_recheck_secs == 0 {
            bail!("session.tick_secs and session.posture_recheck_secs must be positive");
        }
        if s.warn_after_secs >= s.expire_after_secs {
            bail!(
                "session.warn_after_secs ({}) must be less than session.expire_after_secs ({})",
                s.warn_after_secs,
                s.expire_after_secs
            );
        }
        for (provider, policy) in &self.rate_limits {
            if policy.window_secs == 0 {
                bail!("rate_limits.{provider}.window_secs must be positive");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.storage.path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.session.monitor_config(), SessionConfig::default());
        assert_eq!(config.session.posture_recheck(), Duration::from_secs(1800));
        assert!(config.rate_limits.is_empty());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(config.fingerprint.screen_width, 1920);
    }

    #[test]
    fn parses_all_sections() {
        let config = Config::parse(
            r#"
            [storage]
            path = "/tmp/vault.db"

            [fingerprint]
            user_agent = "Mozilla/5.0"
            language = "fr-FR"
            screen_width = 1440
            screen_height = 900

            [session]
            warn_after_secs = 600
            expire_after_secs = 900

            [rate_limits.openai]
            max_requests = 5
            window_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.path, PathBuf::from("/tmp/vault.db"));
        assert_eq!(
            config.fingerprint.resolve(),
            EnvironmentFingerprint::new("Mozilla/5.0", "fr-FR", 1440, 900)
        );
        assert_eq!(config.session.warn_after_secs, 600);
        assert_eq!(config.session.tick_secs, 60);
        assert_eq!(config.rate_limits["openai"], RatePolicy::new(5, 60));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let err = Config::parse("[session]\nwarn_after_secs = 100\nexpire_after_secs = 50\n")
            .unwrap_err();
        assert!(err.to_string().contains("warn_after_secs"));
    }

    #[test]
    fn rejects_zero_window() {
        let result = Config::parse("[rate_limits.strava]\nmax_requests = 1\nwindow_secs = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fitcoach.toml");
        std::fs::write(&path, "[session\n").unwrap();
        assert!(Config::load(Some(path.as_path())).is_err());
    }

    #[test]
    fn locale_to_language_tag() {
        assert_eq!(language_tag("en_GB.UTF-8").as_deref(), Some("en-GB"));
        assert_eq!(language_tag("de_DE@euro").as_deref(), Some("de-DE"));
        assert_eq!(language_tag("C"), None);
        assert_eq!(language_tag("POSIX"), None);
    }

    #[test]
    fn default_user_agent_names_the_client() {
        let fingerprint = FingerprintConfig::default().resolve();
        assert!(fingerprint.user_agent.starts_with("fitcoach-cli/"));
        assert!(!fingerprint.is_weak());
    }
}

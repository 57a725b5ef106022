//! Per-provider API security policy.
//!
//! [`ApiSecurityManager`] is the single gate outbound calls pass through:
//! it enforces the provider's request budget, sanitizes the request body,
//! validates the response body, and checks credential shape before use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fitcoach_vault::{Clock, FormatError, provider_id, validate_credential};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rate_limit::RateLimiter;
use crate::{response, sanitize};

// ---------------------------------------------------------------------------
// Policy table
// ---------------------------------------------------------------------------

/// Request budget for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePolicy {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl RatePolicy {
    pub const fn new(max_requests: usize, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Built-in budgets. Providers not listed here are not rate limited.
/// Lookups are case-insensitive; see [`provider_id`].
pub const DEFAULT_POLICIES: &[(&str, RatePolicy)] = &[
    ("openai", RatePolicy::new(20, 60)),
    ("anthropic", RatePolicy::new(20, 60)),
    ("google", RatePolicy::new(100, 60)),
    ("strava", RatePolicy::new(100, 15 * 60)),
];

pub fn default_policies() -> HashMap<String, RatePolicy> {
    DEFAULT_POLICIES
        .iter()
        .map(|(provider, policy)| ((*provider).to_string(), *policy))
        .collect()
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct ApiSecurityManager {
    limiter: Arc<RateLimiter>,
    policies: HashMap<String, RatePolicy>,
}

impl ApiSecurityManager {
    /// Manager with the built-in policy table.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_limiter(Arc::new(RateLimiter::new(clock)))
    }

    /// Manager sharing an existing limiter.
    pub fn with_limiter(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            policies: default_policies(),
        }
    }

    /// Replace or add policies. Providers not mentioned keep their budget.
    pub fn with_overrides(mut self, overrides: HashMap<String, RatePolicy>) -> Self {
        for (provider, policy) in overrides {
            let provider = provider_id(&provider);
            tracing::debug!(
                provider = %provider,
                max_requests = policy.max_requests,
                window_secs = policy.window_secs,
                "rate policy override"
            );
            self.policies.insert(provider, policy);
        }
        self
    }

    pub fn policy(&self, provider: &str) -> Option<RatePolicy> {
        self.policies.get(&provider_id(provider)).copied()
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Consume one request from `provider`'s budget. Returns `false` when the
    /// budget is exhausted; the rejected call is not counted.
    pub fn can_call(&self, provider: &str) -> bool {
        let provider = provider_id(provider);
        let Some(policy) = self.policies.get(&provider) else {
            return true;
        };
        let allowed = self
            .limiter
            .allow(&provider, policy.max_requests, policy.window());
        if !allowed {
            tracing::warn!(provider = %provider, "API rate limit exceeded");
        }
        allowed
    }

    pub fn sanitize_request(&self, payload: &Value) -> Value {
        sanitize::sanitize_value(payload)
    }

    pub fn validate_response(&self, response: &Value, schema: Option<&Value>) -> bool {
        response::validate_response(response, schema)
    }

    /// Check `key` against `provider`'s expected credential shape.
    pub fn check_credential(&self, provider: &str, key: &str) -> Result<(), FormatError> {
        validate_credential(provider, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitcoach_vault::ManualClock;
    use serde_json::json;

    fn manager() -> (Arc<ManualClock>, ApiSecurityManager) {
        let clock = Arc::new(ManualClock::starting_now());
        (clock.clone(), ApiSecurityManager::new(clock))
    }

    #[test]
    fn openai_budget_is_twenty_per_minute() {
        let (clock, manager) = manager();

        for _ in 0..20 {
            assert!(manager.can_call("openai"));
        }
        assert!(!manager.can_call("openai"));

        clock.advance(chrono::Duration::seconds(60));
        assert!(manager.can_call("openai"));
    }

    #[test]
    fn strava_window_is_fifteen_minutes() {
        let (clock, manager) = manager();

        for _ in 0..100 {
            assert!(manager.can_call("strava"));
        }
        assert!(!manager.can_call("strava"));

        clock.advance(chrono::Duration::minutes(14));
        assert!(!manager.can_call("strava"));
        clock.advance(chrono::Duration::minutes(1));
        assert!(manager.can_call("strava"));
    }

    #[test]
    fn provider_case_shares_one_budget() {
        let (_, manager) = manager();

        for i in 0..20 {
            let provider = if i % 2 == 0 { "OpenAI" } else { " openai " };
            assert!(manager.can_call(provider));
        }
        assert!(!manager.can_call("OPENAI"));
        assert!(!manager.can_call("openai"));
        assert_eq!(manager.limiter().tracked_keys(), ["openai"]);
        assert_eq!(manager.policy("Strava"), Some(RatePolicy::new(100, 15 * 60)));
    }

    #[test]
    fn override_keys_are_case_insensitive() {
        let (_, manager) = manager();
        let manager =
            manager.with_overrides(HashMap::from([("OpenAI".to_string(), RatePolicy::new(1, 60))]));

        assert_eq!(manager.policy("openai"), Some(RatePolicy::new(1, 60)));
        assert!(manager.can_call("openai"));
        assert!(!manager.can_call("OpenAI"));
    }

    #[test]
    fn unknown_provider_is_unlimited() {
        let (_, manager) = manager();
        for _ in 0..1000 {
            assert!(manager.can_call("garmin"));
        }
        assert!(manager.limiter().tracked_keys().is_empty());
    }

    #[test]
    fn overrides_replace_defaults() {
        let (_, manager) = manager();
        let manager = manager.with_overrides(HashMap::from([
            ("openai".to_string(), RatePolicy::new(1, 60)),
            ("garmin".to_string(), RatePolicy::new(2, 60)),
        ]));

        assert!(manager.can_call("openai"));
        assert!(!manager.can_call("openai"));

        assert!(manager.can_call("garmin"));
        assert!(manager.can_call("garmin"));
        assert!(!manager.can_call("garmin"));

        assert_eq!(manager.policy("anthropic"), Some(RatePolicy::new(20, 60)));
    }

    #[test]
    fn policy_deserializes_from_toml_shape() {
        let policy: RatePolicy =
            serde_json::from_value(json!({ "max_requests": 5, "window_secs": 30 })).unwrap();
        assert_eq!(policy, RatePolicy::new(5, 30));
        assert_eq!(policy.window(), Duration::from_secs(30));
    }

    #[test]
    fn delegates_payload_checks() {
        let (_, manager) = manager();

        let sanitized = manager.sanitize_request(&json!({ "q": "<b>" }));
        assert_eq!(sanitized, json!({ "q": "&lt;b&gt;" }));

        assert!(manager.validate_response(&json!({ "ok": true }), None));
        assert!(!manager.validate_response(&json!({ "x": "<script>" }), None));
    }

    #[test]
    fn checks_credential_shape() {
        let (_, manager) = manager();
        assert!(manager.check_credential("openai", "sk-abcdefghijklmnopqrstu").is_ok());
        assert_eq!(
            manager.check_credential("openai", "pk-abcdefghijklmnopqrstu"),
            Err(FormatError::MissingPrefix { expected: "sk-" })
        );
        assert_eq!(manager.check_credential("garmin", ""), Err(FormatError::Empty));
    }
}

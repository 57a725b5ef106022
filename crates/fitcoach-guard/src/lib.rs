//! Outbound API guard for FitCoach.
//!
//! Every call to a third-party AI or fitness provider goes through
//! [`ApiSecurityManager`], which combines:
//!
//! - [`rate_limit`]: a per-key sliding-window counter with atomic
//!   check-and-record.
//! - [`sanitize`]: idempotent HTML-entity escaping of outbound JSON.
//! - [`response`]: rejection of inbound JSON carrying active content or the
//!   wrong shape.
//! - [`policy`]: the per-provider budget table and the manager itself.

pub mod policy;
pub mod rate_limit;
pub mod response;
pub mod sanitize;

pub use policy::{ApiSecurityManager, RatePolicy, default_policies};
pub use rate_limit::RateLimiter;
pub use response::{Rejection, check_response, validate_response};
pub use sanitize::{MAX_FIELD_CHARS, sanitize_str, sanitize_value};

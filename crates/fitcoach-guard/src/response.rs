//! Inbound response validation.
//!
//! A response is accepted only if it is a JSON object, its serialized form
//! carries no active-content markers, and (when a schema is given) it has
//! the schema's shape.

use std::sync::LazyLock;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::Regex;
use serde_json::Value;

/// Literal markers of executable content, matched ASCII case-insensitively.
const THREAT_MARKERS: &[&str] = &["<script", "javascript:", "vbscript:", "data:text/html"];

static MARKERS: LazyLock<Option<AhoCorasick>> = LazyLock::new(|| {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostFirst)
        .build(THREAT_MARKERS)
        .map_err(|e| tracing::error!(error = %e, "failed to build threat matcher"))
        .ok()
});

static EVENT_HANDLER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\bon[a-z]+\s*=")
        .map_err(|e| tracing::error!(error = %e, "failed to build event handler pattern"))
        .ok()
});

/// Why a response was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotAnObject,
    Threat(&'static str),
    EventHandler,
    SchemaMismatch(String),
    ScannerUnavailable,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "response is not a JSON object"),
            Self::Threat(marker) => write!(f, "response contains `{marker}`"),
            Self::EventHandler => write!(f, "response contains an inline event handler"),
            Self::SchemaMismatch(path) => write!(f, "response does not match schema at `{path}`"),
            Self::ScannerUnavailable => write!(f, "threat scanner unavailable"),
        }
    }
}

/// Validate `response`, returning the first reason it is rejected.
pub fn check_response(response: &Value, schema: Option<&Value>) -> Result<(), Rejection> {
    if !response.is_object() {
        return Err(Rejection::NotAnObject);
    }

    let serialized = response.to_string();
    scan(&serialized)?;

    if let Some(schema) = schema {
        matches_shape(response, schema, "$")?;
    }
    Ok(())
}

/// `true` if `response` passes [`check_response`].
pub fn validate_response(response: &Value, schema: Option<&Value>) -> bool {
    match check_response(response, schema) {
        Ok(()) => true,
        Err(reason) => {
            tracing::warn!(reason = %reason, "rejected API response");
            false
        }
    }
}

fn scan(text: &str) -> Result<(), Rejection> {
    // Fail closed if either matcher could not be built.
    let (Some(markers), Some(handler)) = (MARKERS.as_ref(), EVENT_HANDLER.as_ref()) else {
        return Err(Rejection::ScannerUnavailable);
    };

    if let Some(m) = markers.find(text) {
        return Err(Rejection::Threat(THREAT_MARKERS[m.pattern().as_usize()]));
    }
    if handler.is_match(text) {
        return Err(Rejection::EventHandler);
    }
    Ok(())
}

fn matches_shape(value: &Value, schema: &Value, path: &str) -> Result<(), Rejection> {
    let mismatch = || Rejection::SchemaMismatch(path.to_string());

    match (schema, value) {
        (Value::Object(expected), Value::Object(actual)) => {
            for (key, expected_value) in expected {
                let child_path = format!("{path}.{key}");
                let actual_value = actual
                    .get(key)
                    .ok_or_else(|| Rejection::SchemaMismatch(child_path.clone()))?;
                matches_shape(actual_value, expected_value, &child_path)?;
            }
            Ok(())
        }
        (Value::Array(_), Value::Array(_))
        | (Value::String(_), Value::String(_))
        | (Value::Number(_), Value::Number(_))
        | (Value::Bool(_), Value::Bool(_))
        | (Value::Null, Value::Null) => Ok(()),
        _ => Err(mismatch()),
    }
}

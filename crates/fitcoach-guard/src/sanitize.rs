//! Outbound payload sanitization.
//!
//! Strings are HTML-entity escaped and capped at [`MAX_FIELD_CHARS`]
//! characters. Entities that are already escaped are left alone and the cap
//! never splits an entity, so running the sanitizer twice gives the same
//! result as running it once.
//!
//! Two object keys can escape to the same text (`<a>` and `&lt;a&gt;`). The
//! entry whose key was already in escaped form wins; the other is dropped
//! with a `warn` log.

use serde_json::{Map, Value};

/// Maximum length of a sanitized string, in characters.
pub const MAX_FIELD_CHARS: usize = 1000;

/// Entities the sanitizer emits, plus the decimal apostrophe. An `&` that
/// starts one of these is treated as already escaped.
const ENTITIES: &[&str] = &["&amp;", "&lt;", "&gt;", "&quot;", "&#x27;", "&#39;"];

/// Sanitize every string (values and object keys) in `payload`.
pub fn sanitize_value(payload: &Value) -> Value {
    match payload {
        Value::String(s) => Value::String(sanitize_str(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                let clean = sanitize_str(key);
                let verbatim = clean == *key;
                if out.contains_key(&clean) {
                    if !verbatim {
                        tracing::warn!(
                            key = %clean,
                            "sanitized key collides with an existing field, dropping"
                        );
                        continue;
                    }
                    tracing::warn!(key = %clean, "escaped key replaces a colliding field");
                }
                out.insert(clean, sanitize_value(value));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Escape and cap a single string.
pub fn sanitize_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_FIELD_CHARS));
    let mut chars = 0;
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
        let (unit, consumed): (&str, usize) = match c {
            '&' => match ENTITIES.iter().find(|e| rest.starts_with(**e)) {
                Some(entity) => (entity, entity.len()),
                None => ("&amp;", 1),
            },
            '<' => ("&lt;", 1),
            '>' => ("&gt;", 1),
            '"' => ("&quot;", 1),
            '\'' => ("&#x27;", 1),
            _ => {
                let len = c.len_utf8();
                (&rest[..len], len)
            }
        };

        // Every escaped unit is ASCII, so its byte length is its char count.
        let unit_chars = if unit.len() == c.len_utf8() { 1 } else { unit.len() };
        if chars + unit_chars > MAX_FIELD_CHARS {
            break;
        }

        out.push_str(unit);
        chars += unit_chars;
        rest = &rest[consumed..];
    }

    out
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sanitizer for audit records and logged payloads.
//!
//! Masks secret-bearing keys, truncates oversized strings and lists, and
//! caps recursion depth so nested payloads cannot explode the audit log.

use serde_json::{Map, Value};

/// Keys whose lowercase form contains any of these markers are masked.
const SECRET_MARKERS: &[&str] = &["password", "secret", "token", "key", "authorization"];

/// Replacement for masked values.
const MASKED: &str = "*** MASKED ***";

/// Maximum recursion depth before the subtree is replaced wholesale.
const MAX_DEPTH: usize = 5;

/// Maximum string length kept verbatim.
const MAX_STRING_LEN: usize = 500;

/// Maximum number of list elements kept.
const MAX_LIST_LEN: usize = 50;

/// Sanitize a JSON value for audit logging.
///
/// - keys containing `password`, `secret`, `token`, `key`, or
///   `authorization` (case-insensitive) are masked;
/// - strings longer than 500 chars are truncated with a marker;
/// - lists longer than 50 elements are truncated;
/// - recursion past depth 5 is replaced with `"*** DEPTH LIMIT ***"`.
pub fn sanitize(value: &Value) -> Value {
    sanitize_at(value, 0)
}

fn sanitize_at(value: &Value, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return Value::String("*** DEPTH LIMIT ***".into());
    }
    match value {
        Value::Object(map) => {
            let mut safe = Map::with_capacity(map.len());
            for (key, val) in map {
                if is_secret_key(key) {
                    safe.insert(key.clone(), Value::String(MASKED.into()));
                } else {
                    safe.insert(key.clone(), sanitize_at(val, depth + 1));
                }
            }
            Value::Object(safe)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .take(MAX_LIST_LEN)
                .map(|v| sanitize_at(v, depth + 1))
                .collect(),
        ),
        Value::String(s) if s.chars().count() > MAX_STRING_LEN => {
            let truncated: String = s.chars().take(MAX_STRING_LEN).collect();
            Value::String(format!("{truncated}… TRUNCATED"))
        }
        other => other.clone(),
    }
}

fn is_secret_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SECRET_MARKERS.iter().any(|m| lower.contains(m))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

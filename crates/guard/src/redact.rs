// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sensitive-data redaction for logging.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Key substrings whose values are redacted.
pub const SENSITIVE_KEYS: &[&str] = &[
    "token",
    "password",
    "secret",
    "key",
    "api_key",
    "apikey",
    "auth",
    "credential",
    "private",
];

const MAX_DEPTH: usize = 10;
const REDACTED: &str = "[REDACTED]";

/// Redact sensitive values from a JSON value for logging.
///
/// Object keys containing a sensitive word (case-insensitive) have their
/// values replaced; nesting is followed to a fixed depth.
pub fn redact_value(value: &Value) -> Value {
    redact_at_depth(value, 0)
}

fn redact_at_depth(value: &Value, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return Value::String("[max depth exceeded]".to_string());
    }
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                let lower = key.to_lowercase();
                if SENSITIVE_KEYS.iter().any(|s| lower.contains(s)) {
                    out.insert(key.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(key.clone(), redact_at_depth(inner, depth + 1));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| redact_at_depth(v, depth + 1)).collect())
        }
        other => other.clone(),
    }
}

fn sensitive_env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // static pattern, exercised by tests
        Regex::new(
            r"(?i)((?:-e|--env)\s+\S*(?:PASSWORD|SECRET|KEY|TOKEN|CREDENTIAL)\S*=)\S+",
        )
        .unwrap()
    })
}

/// Redact sensitive parts of a command string for safe logging.
///
/// Env-var values whose names look secret are masked and the result is
/// truncated to 100 characters.
pub fn redact_command(command: &str) -> String {
    let redacted = sensitive_env_pattern().replace_all(command, "$1[REDACTED]");
    if redacted.len() > 100 {
        let mut end = 100;
        while !redacted.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &redacted[..end])
    } else {
        redacted.into_owned()
    }
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;

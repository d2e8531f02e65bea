//! `{{placeholder}}` resolution.
//!
//! Placeholders name a path into a JSON scope (see [`json_path`]). Resolution
//! never fails: a missing value renders as the empty string, strings render
//! verbatim and any other value renders as compact JSON.
//!
//! [`json_path`]: crate::json_path

use crate::json_path;
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder pattern is valid")
});

/// Renders a value the way it appears inside resolved text.
#[must_use]
pub fn render_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolves every placeholder in `template` against `scope`.
#[must_use]
pub fn resolve(template: &str, scope: &JsonValue) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            json_path::lookup(scope, &caps[1])
                .map(render_value)
                .unwrap_or_default()
        })
        .into_owned()
}

/// Returns the path if `template` is exactly one placeholder.
#[must_use]
pub fn sole_placeholder(template: &str) -> Option<&str> {
    let caps = PLACEHOLDER.captures(template.trim())?;
    let whole = caps.get(0)?;
    (whole.as_str().len() == template.trim().len()).then(|| caps.get(1).map(|m| m.as_str()))?
}

/// Resolves every string leaf of a JSON document.
///
/// A string that is exactly one placeholder is replaced by the raw value
/// it names, so numbers, booleans and objects keep their JSON type. Object
/// keys are left untouched.
#[must_use]
pub fn resolve_json(document: &JsonValue, scope: &JsonValue) -> JsonValue {
    match document {
        JsonValue::String(text) => match sole_placeholder(text) {
            Some(path) => json_path::lookup(scope, path)
                .cloned()
                .unwrap_or_else(|| JsonValue::String(String::new())),
            None => JsonValue::String(resolve(text, scope)),
        },
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|item| resolve_json(item, scope)).collect())
        }
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), resolve_json(value, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolves a JSON body authored as text.
///
/// Well-formed documents have their string leaves resolved. Text that only
/// becomes JSON after substitution (an unquoted `{{count}}`, say) is
/// resolved textually and parsed afterwards; `None` if it still is not JSON.
#[must_use]
pub fn resolve_json_text(text: &str, scope: &JsonValue) -> Option<JsonValue> {
    match serde_json::from_str::<JsonValue>(text) {
        Ok(document) => Some(resolve_json(&document, scope)),
        Err(_) => serde_json::from_str(&resolve(text, scope)).ok(),
    }
}

//! Parameter accessors for tool executors.
//!
//! Values are already classified by the parser, so a numeric-looking path
//! arrives as a number; the text accessors render it back.

use lumina_core::error::ToolError;
use lumina_core::value::{ParamValue, Params};

/// First non-empty text value among `keys` (aliases in priority order).
pub fn optional_text(params: &Params, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| params.get(*k))
        .map(ParamValue::to_text)
        .find(|s| !s.trim().is_empty())
}

pub fn required_text(params: &Params, keys: &[&str]) -> Result<String, ToolError> {
    optional_text(params, keys)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{}' parameter", keys[0])))
}

/// Like [`optional_text`] but keeps empty strings, for content bodies.
pub fn raw_text(params: &Params, key: &str) -> Option<String> {
    params.get(key).map(ParamValue::to_text)
}

pub fn optional_u64(params: &Params, key: &str) -> Option<u64> {
    params.get(key).and_then(ParamValue::as_u64)
}

pub fn optional_f64(params: &Params, key: &str) -> Option<f64> {
    params.get(key).and_then(ParamValue::as_f64)
}

pub fn optional_bool(params: &Params, key: &str) -> Option<bool> {
    params.get(key).and_then(ParamValue::as_bool)
}

/// A list parameter. A JSON array yields its items; a plain string is one
/// item, or several if it is comma separated.
pub fn text_list(params: &Params, key: &str) -> Option<Vec<String>> {
    let value = params.get(key)?;
    let items: Vec<String> = match value {
        ParamValue::Array(items) => items.iter().map(ParamValue::to_text).collect(),
        ParamValue::String(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
        other => vec![other.to_text()],
    };
    Some(items.into_iter().filter(|s| !s.is_empty()).collect())
}

//! Typed tool-call parameter values.
//!
//! Parameter bodies arrive as raw text inside XML-like tags. Each body is
//! classified exactly once by [`ParamValue::classify`]: valid JSON arrays,
//! objects, numbers, and booleans become typed values, everything else is
//! kept as a trimmed string.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters of one tool call, keyed by parameter name.
pub type Params = BTreeMap<String, ParamValue>;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<ParamValue>),
    Object(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Classify a raw tag body.
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Null) | Err(_) => Self::String(trimmed.to_string()),
            Ok(value) => Self::from(value),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ParamValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, ParamValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Render the value as text.
    ///
    /// Strings are returned as-is; other variants use their compact JSON form,
    /// so `<path>2024</path>` still works as a path.
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_json().to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(ParamValue::to_json).collect())
            }
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::String(String::new()),
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(ParamValue::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_array() {
        let value = ParamValue::classify(r#"["a.md", "b.md"]"#);
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_str(), Some("a.md"));
    }

    #[test]
    fn classify_number_and_bool() {
        assert_eq!(ParamValue::classify(" 10 ").as_u64(), Some(10));
        assert_eq!(ParamValue::classify("true"), ParamValue::Bool(true));
    }

    #[test]
    fn classify_plain_text_is_trimmed() {
        let value = ParamValue::classify("\n  notes/daily.md \n");
        assert_eq!(value, ParamValue::String("notes/daily.md".into()));
    }

    #[test]
    fn classify_null_keeps_text() {
        assert_eq!(ParamValue::classify("null").as_str(), Some("null"));
    }

    #[test]
    fn numbers_render_as_text() {
        assert_eq!(ParamValue::classify("2024").to_text(), "2024");
    }

    #[test]
    fn serializes_compactly() {
        let mut params = Params::new();
        params.insert("limit".into(), ParamValue::classify("10"));
        params.insert("query".into(), "rust".into());
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"limit":10,"query":"rust"}"#);
    }
}

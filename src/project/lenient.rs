//! Permissive deserializers for model-authored JSON.
//!
//! Models drift between strings, numbers, arrays and nested objects for
//! fields that are conceptually free text. These helpers fold whatever
//! arrives into text instead of rejecting the whole response.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Render any JSON value as free text.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, value_to_text(v)))
            .collect::<Vec<_>>()
            .join("; "),
    }
}

fn value_to_list(value: Value) -> Vec<String> {
    match value {
        Value::Null => vec![],
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, value_to_text(v)))
            .collect(),
        other => {
            let text = value_to_text(&other);
            if text.is_empty() {
                vec![]
            } else {
                vec![text]
            }
        }
    }
}

pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_text(&value))
}

pub fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let text = value_to_text(&value);
    Ok(if text.is_empty() { None } else { Some(text) })
}

pub fn text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_list(value))
}

/// Name → state map. A list of `{name, state}` objects is accepted too.
pub fn text_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    match value {
        Value::Object(map) => {
            for (name, state) in map {
                out.insert(name, value_to_text(&state));
            }
        }
        Value::Array(items) => {
            for item in items {
                let Some(name) = item.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let state = item
                    .get("state")
                    .or_else(|| item.get("status"))
                    .map(value_to_text)
                    .unwrap_or_default();
                out.insert(name.to_string(), state);
            }
        }
        _ => {}
    }
    Ok(out)
}

/// Integer index that may arrive as a number or numeric string.
pub fn optional_index<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Enum tag that falls back to `None` when the value is not a known variant.
pub fn optional_tag<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

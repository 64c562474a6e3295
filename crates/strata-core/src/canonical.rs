use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonicalJsonError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn canonical_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries = map
                .into_iter()
                .map(|(key, inner)| (key, canonical_value(inner)))
                .collect::<Vec<_>>();
            entries.sort_by(|left, right| left.0.cmp(&right.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, inner);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical_value).collect()),
        other => other,
    }
}

pub fn sort_extension_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries = map
                .into_iter()
                .map(|(key, inner)| (key, sort_extension_value(inner)))
                .collect::<Vec<_>>();
            entries.sort_by(|left, right| left.0.cmp(&right.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, inner);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => {
            let mut sorted = items
                .into_iter()
                .map(sort_extension_value)
                .collect::<Vec<_>>();
            sorted.sort_by(|left, right| {
                let left_bytes = serde_json::to_vec(left).unwrap_or_default();
                let right_bytes = serde_json::to_vec(right).unwrap_or_default();
                left_bytes.cmp(&right_bytes)
            });
            Value::Array(sorted)
        }
        other => other,
    }
}

pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalJsonError> {
    let raw = serde_json::to_value(value)?;
    let normalized = canonical_value(raw);
    Ok(serde_json::to_vec(&normalized)?)
}

pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String, CanonicalJsonError> {
    let bytes = canonical_bytes(value)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

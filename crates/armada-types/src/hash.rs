//! Canonical content hashing.
//!
//! Hashes are SHA-256 over a canonical JSON rendering where all object
//! keys are sorted, so the same logical value always yields the same hash
//! regardless of field or map ordering.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Compute the canonical content hash of any serializable value.
pub fn content_hash<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_value(value).unwrap_or(Value::Null);
    let canonical = canonicalize(json);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

/// Rebuild a JSON value with all object keys sorted.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

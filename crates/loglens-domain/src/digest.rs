//! Canonical JSON and content digesting.
//!
//! Grounded in the teacher's RFC-8785-class canonicalization: keys are
//! sorted by UTF-16 code unit, numbers are normalized, and the resulting
//! string is SHA-256 hashed to a hex digest. Used for cache keys, pattern
//! ids, and snapshot ids.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{LoglensError, Result};

fn sort_keys_utf16(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| {
                let a16: Vec<u16> = a.encode_utf16().collect();
                let b16: Vec<u16> = b.encode_utf16().collect();
                a16.cmp(&b16)
            });
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), sort_keys_utf16(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys_utf16).collect()),
        other => other.clone(),
    }
}

fn normalize_value(value: &Value) -> Result<Value> {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.is_nan() || f.is_infinite() {
                    return Err(LoglensError::validation(
                        "NaN/Infinity cannot be canonicalized",
                    ));
                }
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    return Ok(Value::Number(serde_json::Number::from(f as i64)));
                }
            }
            Ok(value.clone())
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), normalize_value(v)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(normalize_value(item)?);
            }
            Ok(Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

/// Produce a canonical, deterministic JSON string for a value.
pub fn canonical_json(value: &Value) -> Result<String> {
    let normalized = normalize_value(value)?;
    let sorted = sort_keys_utf16(&normalized);
    serde_json::to_string(&sorted).map_err(|e| LoglensError::Parse {
        message: format!("failed to serialize canonical json: {e}"),
    })
}

/// SHA-256 hex digest of a value's canonical JSON form.
pub fn compute_digest(value: &Value) -> Result<String> {
    let canonical = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 hex digest of raw bytes (used for file snapshots, spec §6.3).
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

//! Cache key derivation — JSON body normalization and key building.
//!
//! Two requests that are semantically identical (same method, path, query,
//! and body up to JSON key ordering and whitespace) must map to the same
//! key; anything else must not. Keys carry a version tag so a scheme change
//! invalidates all prior entries at once.

use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::Method;

/// Version tag prefixed to every cache key. Bump to invalidate all entries
/// written under the previous scheme.
pub const KEY_VERSION: &str = "v1";

/// The request body could not be normalized as JSON.
///
/// Callers recover by hashing the raw bytes instead of failing the request.
#[derive(Debug, Error)]
#[error("body is not valid JSON: {0}")]
pub struct NormalizeError(#[from] serde_json::Error);

/// Canonicalizes a JSON body: object keys are sorted recursively, arrays
/// keep their order, scalars pass through. Empty input is returned as-is.
///
/// # Errors
///
/// [`NormalizeError`] if the input is non-empty and not valid JSON.
pub fn normalize_json(input: &[u8]) -> Result<Vec<u8>, NormalizeError> {
    if input.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_slice(input)?;
    let normalized = sort_object_keys(value);
    Ok(serde_json::to_vec(&normalized)?)
}

// Rebuilds the value tree with every object's entries inserted in sorted
// key order. Done explicitly rather than relying on serde_json's map
// ordering, so the result is stable even if a dependency elsewhere enables
// the `preserve_order` feature.
fn sort_object_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = serde_json::Map::with_capacity(entries.len());
            for (key, val) in entries {
                sorted.insert(key, sort_object_keys(val));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_object_keys).collect()),
        scalar => scalar,
    }
}

/// Builds the cache key for a request.
///
/// Layout: `<version>:<path>`, then `?<query>` for safe (read-style)
/// methods with a non-empty query, or `:<hex sha256 of normalized body>`
/// for body-bearing methods with a non-empty body. Pure and deterministic.
///
/// A body that fails JSON normalization is hashed raw — the request still
/// gets a stable key, it just loses key-order insensitivity.
///
/// # Examples
///
/// ```
/// use cachet::Method;
/// use cachet::cache::build_key;
///
/// let key = build_key(&Method::Get, "/ping", Some("name=world"), b"");
/// assert_eq!(key, "v1:/ping?name=world");
/// ```
pub fn build_key(method: &Method, path: &str, query: Option<&str>, body: &[u8]) -> String {
    let mut key = format!("{KEY_VERSION}:{path}");

    if method.is_safe() {
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            key.push('?');
            key.push_str(query);
        }
        return key;
    }

    if !body.is_empty() {
        let normalized = match normalize_json(body) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(error = %e, "body normalization failed — hashing raw bytes");
                body.to_vec()
            }
        };
        let mut hasher = Sha256::new();
        hasher.update(&normalized);
        key.push(':');
        key.push_str(&hex::encode(hasher.finalize()));
    }

    key
}

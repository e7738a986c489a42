// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical JSON serialization and SHA-256 helpers.
//!
//! Every hash the pipeline relies on for determinism (reference hashes,
//! collection hashes, canonical node ids) is built on these two primitives:
//! a stable byte representation of a JSON value, and a hex-encoded SHA-256
//! digest of it.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize `value` to a canonical JSON byte string: object keys are sorted
/// recursively so that the output is stable regardless of field insertion
/// order.
///
/// # Errors
///
/// Returns an error if `value` cannot be represented as JSON.
pub fn canonical_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let raw = serde_json::to_value(value)?;
    let sorted = sort_value(raw);
    serde_json::to_vec(&sorted)
}

fn sort_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> =
                std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k, sort_value(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
        other => other,
    }
}

/// Hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Compute the stable hash of an external reference: SHA-256 over
/// `"<referenceType>:<lowercased normalized identifier>"`.
///
/// This is the hash every [`crate::model::ExternalReference`] carries and
/// the key the External Object Index is partitioned by (per tenant).
#[must_use]
pub fn reference_hash(reference_type: &str, normalized_identifier: &str) -> String {
    let input = format!(
        "{}:{}",
        reference_type,
        normalized_identifier.to_lowercase()
    );
    sha256_hex(input.as_bytes())
}

/// Ordered SHA-256 over a sorted set of member hashes.
///
/// Used by an [`crate::model::IndexEntry`] to detect whether the underlying
/// scan's references changed since the index was last built, and by the
/// Merge Engine to derive deterministic canonical node ids from equivalence
/// classes.
#[must_use]
pub fn collection_hash<I, S>(hashes: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sorted: Vec<String> = hashes.into_iter().map(|s| s.as_ref().to_string()).collect();
    sorted.sort();
    sorted.dedup();
    sha256_hex(sorted.join("\n").as_bytes())
}

//! ============================================================================
//! Content Addressing - Deterministic identity hashing
//! ============================================================================
//! A memory's id is the SHA-256 digest of its content plus its metadata.
//! Identical (content, metadata) inputs always produce identical ids, across
//! process restarts and platforms; any change produces a different id.
//! ============================================================================

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Compute the content hash for a memory.
///
/// Metadata pairs are folded in key-sorted order (BTreeMap iteration order)
/// with length prefixes, so `{"a": "bc"}` and `{"ab": "c"}` cannot collide.
pub fn content_hash(content: &str, metadata: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update((content.len() as u64).to_be_bytes());
    hasher.update(content.as_bytes());
    for (key, value) in metadata {
        hasher.update((key.len() as u64).to_be_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

//! ============================================================================
//! Memory Types - Data structures for the storage core
//! ============================================================================
//! Defines memory entries, search results, insert outcomes, and the stats
//! structures reported by each backend.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::hashing::content_hash;

/// Prefix for blob reference tokens stored in place of offloaded content
pub const BLOB_REF_PREFIX: &str = "blob://";

/// Where a memory's content physically lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLocation {
    /// Content stored inline in the relational row
    Inline,
    /// Content offloaded to the blob store; the row holds a reference token
    Blob,
}

impl StorageLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageLocation::Inline => "inline",
            StorageLocation::Blob => "blob",
        }
    }
}

impl std::str::FromStr for StorageLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inline" => Ok(StorageLocation::Inline),
            "blob" => Ok(StorageLocation::Blob),
            _ => Err(format!("Unknown storage location: {}", s)),
        }
    }
}

/// A single memory entry
///
/// The id is the SHA-256 hash of (content, metadata), so identical inputs
/// dedupe to one row. Immutable after store except via explicit delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Content hash, hex digest; stable identity and dedup key
    pub id: String,
    /// The memory content, or a `blob://` reference token when offloaded
    pub content: String,
    /// Case-sensitive tags for organization
    pub tags: Vec<String>,
    /// Free-form type label (e.g. "note", "fact")
    pub memory_type: String,
    /// Importance score (0.0 - 1.0)
    pub importance: f32,
    /// String-keyed metadata; participates in the content hash
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Unix timestamp when the memory was created
    pub created_at: i64,
    /// ISO-8601 rendering of created_at
    pub created_at_iso: String,
    /// Vector embedding (not serialized when empty)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    /// Whether content is inline or blob-offloaded
    pub storage_location: StorageLocation,
}

impl Memory {
    /// Create a new memory entry; the id is derived from content + metadata.
    pub fn new(
        content: String,
        tags: Vec<String>,
        memory_type: String,
        importance: f32,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: content_hash(&content, &metadata),
            content,
            tags,
            memory_type,
            importance,
            metadata,
            created_at: now.timestamp(),
            created_at_iso: now.to_rfc3339(),
            embedding: Vec::new(),
            storage_location: StorageLocation::Inline,
        }
    }

    /// Attach a pre-computed embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// The blob key for this memory's offloaded content
    pub fn blob_key(&self) -> &str {
        &self.id
    }

    /// Build the reference token stored in place of offloaded content
    pub fn blob_ref(id: &str) -> String {
        format!("{}{}", BLOB_REF_PREFIX, id)
    }

    /// Whether a content field is a blob reference token
    pub fn is_blob_ref(content: &str) -> bool {
        content.starts_with(BLOB_REF_PREFIX)
    }
}

/// A memory plus its similarity score from semantic search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub memory: Memory,
    /// Normalized similarity, nominally 0.0 - 1.0
    pub relevance_score: f32,
}

/// Outcome of a conditional insert into the relational store.
/// Duplicate is idempotent success, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Statistics from the relational source of truth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalStats {
    pub memory_count: i64,
    pub blob_count: i64,
    pub avg_vector_dims: f64,
    pub oldest: Option<String>,
    pub newest: Option<String>,
}

/// Statistics from the ANN mirror
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorStats {
    pub points_count: u64,
    pub vector_dims: u64,
}

/// Statistics from the blob store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStats {
    pub bucket: String,
    pub object_count: u64,
}

/// Aggregated stats across all providers.
///
/// Any individual provider failure yields a partial report: its slot stays
/// None and the failure message is recorded in `errors`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relational: Option<RelationalStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror: Option<MirrorStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<BlobStats>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
}

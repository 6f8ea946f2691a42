//! ============================================================================
//! Backend Interfaces - Capability contracts for the three stores
//! ============================================================================
//! Each backend adapter declares what it implements through these traits,
//! queried structurally by the orchestrator. Stats and delete are part of
//! the contract, not probed at runtime.
//! ============================================================================

use async_trait::async_trait;

use crate::error::MemoryError;
use crate::types::{
    BlobStats, InsertOutcome, Memory, MirrorStats, RelationalStats, SearchResult,
};

/// The relational source of truth for memory rows.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persist a row keyed by content hash. Returns `Duplicate` when the
    /// hash already exists; callers treat that as idempotent success.
    async fn insert_if_absent(&self, memory: &Memory) -> Result<InsertOutcome, MemoryError>;

    /// Whether a row with this id exists.
    async fn exists(&self, id: &str) -> Result<bool, MemoryError>;

    /// Fetch one row by id.
    async fn get(&self, id: &str) -> Result<Option<Memory>, MemoryError>;

    /// Vector similarity query against the inline embedding column.
    /// Ranked similarity descending, ties broken by newer created_at.
    async fn search_by_vector(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, MemoryError>;

    /// Tag filter query. Matches ANY of the requested tags (case-sensitive).
    async fn search_by_tags(
        &self,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError>;

    /// Delete one row. Returns false when the id was not present.
    async fn delete(&self, id: &str) -> Result<bool, MemoryError>;

    /// Aggregate statistics.
    async fn stats(&self) -> Result<RelationalStats, MemoryError>;
}

/// Secondary ANN index mirroring embeddings; eventually consistent with the
/// relational store and rebuildable from it.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotent upsert: replaces any existing point for this memory id.
    async fn upsert(&self, memory: &Memory) -> Result<(), MemoryError>;

    /// Ranked search, cosine similarity normalized to 0.0 - 1.0. Results
    /// are self-contained memories rebuilt from the point payload.
    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, MemoryError>;

    /// Best-effort delete; a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<(), MemoryError>;

    /// Index statistics.
    async fn stats(&self) -> Result<MirrorStats, MemoryError>;
}

/// Content-addressed object storage for oversized payloads.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a content-hash key. Re-putting an existing key is
    /// a no-op (equal keys imply equal content).
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), MemoryError>;

    /// Fetch bytes; `NotFound` if the key is absent.
    async fn get(&self, key: &str) -> Result<Vec<u8>, MemoryError>;

    /// Best-effort delete.
    async fn delete(&self, key: &str) -> Result<(), MemoryError>;

    /// Store statistics.
    async fn stats(&self) -> Result<BlobStats, MemoryError>;
}

/// The embedding collaborator: text in, fixed-dimension vector out.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The fixed process-wide embedding dimension.
    fn dimension(&self) -> usize;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}

//! ============================================================================
//! MEMVAULT-CORE: Durable semantic memory storage
//! ============================================================================
//! This crate handles all storage logic for memvault:
//! - Content-addressed memory identity (SHA-256)
//! - Postgres + pgvector as the relational source of truth
//! - Qdrant as a best-effort ANN mirror for low-latency semantic search
//! - S3-compatible object storage for oversized payloads
//! - The orchestrator that routes every memory across the three backends
//!   and merges dual-source search results under partial failure
//! ============================================================================

pub mod backend;
pub mod blob;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod hashing;
pub mod mirror;
pub mod orchestrator;
pub mod relational;
pub mod tools;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use backend::{BlobStore, Embedder, MetadataStore, VectorIndex};
pub use blob::S3BlobStore;
pub use config::VaultConfig;
pub use embeddings::EmbeddingClient;
pub use error::MemoryError;
pub use hashing::content_hash;
pub use mirror::QdrantMirror;
pub use orchestrator::{MemoryVault, StoreOutcome};
pub use relational::PgMetadataStore;
pub use tools::ToolHandler;
pub use types::{
    BlobStats, InsertOutcome, Memory, MirrorStats, RelationalStats, SearchResult, StorageLocation,
    VaultStats,
};

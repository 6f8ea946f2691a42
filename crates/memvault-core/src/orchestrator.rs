//! ============================================================================
//! Memory Vault - Orchestrates storage across the three backends
//! ============================================================================
//! Routes each memory across Postgres (source of truth), Qdrant (best-effort
//! ANN mirror), and the blob store (oversized payloads), and merges semantic
//! search results from both vector sources under partial failure.
//! ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::backend::{BlobStore, Embedder, MetadataStore, VectorIndex};
use crate::blob::S3BlobStore;
use crate::config::VaultConfig;
use crate::embeddings::EmbeddingClient;
use crate::error::MemoryError;
use crate::mirror::QdrantMirror;
use crate::relational::PgMetadataStore;
use crate::types::{InsertOutcome, Memory, SearchResult, StorageLocation, VaultStats};

/// Result of a store call
#[derive(Debug, Clone)]
pub struct StoreOutcome {
    /// Content hash of the stored (or pre-existing) memory
    pub id: String,
    pub message: String,
    /// True when the content hash already existed (idempotent success)
    pub duplicate: bool,
    /// False when the ANN mirror could not be updated; the relational
    /// vector column remains queryable as fallback
    pub mirrored: bool,
}

/// The storage orchestrator
pub struct MemoryVault {
    metadata: Arc<dyn MetadataStore>,
    mirror: Arc<dyn VectorIndex>,
    blobs: Arc<dyn BlobStore>,
    embedder: Arc<dyn Embedder>,
    blob_threshold: usize,
    query_timeout: Duration,
}

impl MemoryVault {
    /// Assemble a vault from explicit backend handles.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        mirror: Arc<dyn VectorIndex>,
        blobs: Arc<dyn BlobStore>,
        embedder: Arc<dyn Embedder>,
        blob_threshold: usize,
        query_timeout: Duration,
    ) -> Self {
        Self {
            metadata,
            mirror,
            blobs,
            embedder,
            blob_threshold,
            query_timeout,
        }
    }

    /// Connect all production backends from configuration.
    pub async fn connect(config: &VaultConfig) -> Result<Self, MemoryError> {
        let metadata = PgMetadataStore::new(
            &config.database_url,
            config.max_db_connections,
            config.embedding_dim,
        )
        .await?;
        let mirror = QdrantMirror::new(
            &config.qdrant_url,
            config.qdrant_api_key.clone(),
            &config.collection_name,
            config.embedding_dim,
        )
        .await?;
        let blobs = S3BlobStore::new(
            &config.blob_endpoint,
            &config.blob_bucket,
            &config.blob_access_key,
            &config.blob_secret_key,
        )
        .await?;
        let embedder = EmbeddingClient::new(
            config.embedding_api_key.clone(),
            config.embedding_base_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dim,
        );

        info!("Memory vault connected (collection {})", config.collection_name);

        Ok(Self::new(
            Arc::new(metadata),
            Arc::new(mirror),
            Arc::new(blobs),
            Arc::new(embedder),
            config.blob_threshold_bytes,
            Duration::from_millis(config.query_timeout_ms),
        ))
    }

    /// Store a memory.
    ///
    /// Content is hashed for identity; oversized content is offloaded to the
    /// blob store; the row plus embedding lands in Postgres (mandatory); the
    /// embedding is mirrored to Qdrant (best-effort). Storing the same
    /// (content, metadata) twice is idempotent success.
    pub async fn store(
        &self,
        content: String,
        tags: Vec<String>,
        memory_type: String,
        importance: f32,
        metadata: BTreeMap<String, String>,
    ) -> Result<StoreOutcome, MemoryError> {
        if content.is_empty() {
            return Err(MemoryError::InvalidInput("content is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&importance) {
            return Err(MemoryError::InvalidInput(format!(
                "importance {} out of range [0, 1]",
                importance
            )));
        }

        let mut memory = Memory::new(content, tags, memory_type, importance, metadata);

        // Idempotent short-circuit: the hash is the dedup key
        if self.metadata.exists(&memory.id).await? {
            debug!("Memory {} already exists", memory.id);
            return Ok(StoreOutcome {
                id: memory.id,
                message: "Memory already exists".to_string(),
                duplicate: true,
                mirrored: false,
            });
        }

        // Size-based routing: oversized content moves to the blob store and
        // the row keeps a reference token. A blob failure here is fatal; a
        // row must never point at bytes that were not written.
        let embed_source = memory.content.clone();
        if memory.content.len() > self.blob_threshold {
            self.blobs
                .put(memory.blob_key(), memory.content.as_bytes())
                .await?;
            debug!(
                "Offloaded {} bytes to blob {}",
                memory.content.len(),
                memory.id
            );
            memory.content = Memory::blob_ref(&memory.id);
            memory.storage_location = StorageLocation::Blob;
        }

        // Embed the original text, never the reference token. Failure is
        // fatal for this call: no vector-less row is ever persisted.
        let embedding = self.embedder.embed(&embed_source).await?;
        memory = memory.with_embedding(embedding);

        // Mandatory write to the source of truth. A same-hash race resolves
        // here: the loser gets Duplicate and yields gracefully.
        match self.metadata.insert_if_absent(&memory).await? {
            InsertOutcome::Duplicate => {
                debug!("Memory {} inserted concurrently", memory.id);
                return Ok(StoreOutcome {
                    id: memory.id,
                    message: "Memory already exists".to_string(),
                    duplicate: true,
                    mirrored: false,
                });
            }
            InsertOutcome::Inserted => {}
        }

        // Best-effort mirror. The relational vector column remains
        // queryable, so a failure here degrades reads without failing the
        // write.
        let mirrored = match self.mirror.upsert(&memory).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Mirror upsert failed for {}: {}", memory.id, e);
                false
            }
        };

        info!("Stored memory {} (mirrored: {})", memory.id, mirrored);
        Ok(StoreOutcome {
            id: memory.id,
            message: "Memory stored successfully".to_string(),
            duplicate: false,
            mirrored,
        })
    }

    /// Semantic search across both vector sources.
    ///
    /// Fans out to Postgres and Qdrant concurrently, each under its own
    /// timeout; one side failing degrades, both failing fails the call.
    /// Results merge by memory id keeping the maximum normalized score.
    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<SearchResult>, MemoryError> {
        let embedding = self.embedder.embed(query).await?;

        let relational_fut = timeout(
            self.query_timeout,
            self.metadata.search_by_vector(&embedding, limit),
        );
        let mirror_fut = timeout(self.query_timeout, self.mirror.search(&embedding, limit));
        let (relational_out, mirror_out) = tokio::join!(relational_fut, mirror_fut);

        let relational = flatten_leg("postgres", relational_out);
        let mirror = flatten_leg("qdrant", mirror_out);

        let merged = match (relational, mirror) {
            (None, None) => {
                return Err(MemoryError::BackendUnavailable {
                    backend: "vector search",
                    reason: "both the relational store and the mirror failed".to_string(),
                })
            }
            (relational, mirror) => merge_results(relational, mirror),
        };

        let mut results: Vec<SearchResult> = merged
            .into_iter()
            .filter(|r| r.relevance_score >= similarity_threshold)
            .collect();
        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
        });
        results.truncate(limit);

        for result in &mut results {
            self.resolve_blob_content(&mut result.memory).await;
        }

        debug!("Retrieve returned {} results", results.len());
        Ok(results)
    }

    /// Tag filter query; matches ANY of the requested tags. Tags are not
    /// mirrored, so this is relational-only.
    pub async fn search_by_tags(
        &self,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        let mut memories = self.metadata.search_by_tags(tags, limit).await?;
        for memory in &mut memories {
            self.resolve_blob_content(memory).await;
        }
        Ok(memories)
    }

    /// Aggregate stats across all providers. Any individual provider
    /// failure yields a partial report, never an overall failure.
    pub async fn stats(&self) -> VaultStats {
        let (relational, mirror, blob) = tokio::join!(
            self.metadata.stats(),
            self.mirror.stats(),
            self.blobs.stats()
        );

        let mut stats = VaultStats::default();
        match relational {
            Ok(s) => stats.relational = Some(s),
            Err(e) => stats.errors.push(format!("relational: {}", e)),
        }
        match mirror {
            Ok(s) => stats.mirror = Some(s),
            Err(e) => stats.errors.push(format!("mirror: {}", e)),
        }
        match blob {
            Ok(s) => stats.blob = Some(s),
            Err(e) => stats.errors.push(format!("blob: {}", e)),
        }
        stats
    }

    /// Cascading delete. The relational delete alone decides the outcome;
    /// mirror and blob deletes are best-effort.
    pub async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let existing = self.metadata.get(id).await?;
        let Some(memory) = existing else {
            return Ok(false);
        };

        if !self.metadata.delete(id).await? {
            // Raced with another delete
            return Ok(false);
        }

        if let Err(e) = self.mirror.delete(id).await {
            warn!("Mirror delete failed for {}: {}", id, e);
        }
        if memory.storage_location == StorageLocation::Blob {
            if let Err(e) = self.blobs.delete(memory.blob_key()).await {
                warn!("Blob delete failed for {}: {}", id, e);
            }
        }

        info!("Deleted memory {}", id);
        Ok(true)
    }

    /// Swap a blob reference token for the full content. Resolution failure
    /// keeps the token: a derived store's outage must not hide a row the
    /// source of truth returned.
    async fn resolve_blob_content(&self, memory: &mut Memory) {
        if memory.storage_location != StorageLocation::Blob
            && !Memory::is_blob_ref(&memory.content)
        {
            return;
        }
        match self.blobs.get(memory.blob_key()).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => memory.content = text,
                Err(e) => warn!("Blob {} is not valid UTF-8: {}", memory.id, e),
            },
            Err(e) => warn!("Blob resolution failed for {}: {}", memory.id, e),
        }
    }
}

/// Collapse one fan-out leg: a timeout or backend error degrades to None
/// so the other leg can still serve the query.
fn flatten_leg(
    backend: &'static str,
    leg: Result<Result<Vec<SearchResult>, MemoryError>, tokio::time::error::Elapsed>,
) -> Option<Vec<SearchResult>> {
    match leg {
        Ok(Ok(results)) => Some(results),
        Ok(Err(e)) => {
            warn!("{} search failed: {}", backend, e);
            None
        }
        Err(_) => {
            warn!("{} search timed out", backend);
            None
        }
    }
}

/// Merge the two result sets by memory id, keeping the maximum of the two
/// normalized scores. The relational row wins for memory data when an id
/// appears in both sets, since the relational store is canonical.
fn merge_results(
    relational: Option<Vec<SearchResult>>,
    mirror: Option<Vec<SearchResult>>,
) -> Vec<SearchResult> {
    let mut by_id: HashMap<String, SearchResult> = HashMap::new();

    for result in relational.into_iter().flatten() {
        by_id.insert(result.memory.id.clone(), result);
    }
    for result in mirror.into_iter().flatten() {
        match by_id.get_mut(&result.memory.id) {
            Some(existing) => {
                existing.relevance_score = existing.relevance_score.max(result.relevance_score);
            }
            None => {
                by_id.insert(result.memory.id.clone(), result);
            }
        }
    }

    by_id.into_values().collect()
}

//! ============================================================================
//! Vector Mirror - Qdrant ANN index operations
//! ============================================================================
//! Secondary index mirroring embeddings for low-latency semantic search.
//! Eventually consistent with the relational store and rebuildable from it;
//! every failure here degrades reads rather than losing data.
//! ============================================================================

use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, CreateCollectionBuilder, DeletePointsBuilder, Distance, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::VectorIndex;
use crate::error::MemoryError;
use crate::types::{Memory, MirrorStats, SearchResult, StorageLocation};

/// ANN mirror backed by a Qdrant collection
pub struct QdrantMirror {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantMirror {
    /// Connect to Qdrant and ensure the collection exists with the agreed
    /// dimension. A pre-existing collection with a different dimension is a
    /// fatal configuration error; it is never silently reconciled.
    pub async fn new(
        url: &str,
        api_key: Option<String>,
        collection: &str,
        dimension: usize,
    ) -> Result<Self, MemoryError> {
        debug!("Connecting to Qdrant at {}", url);

        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| MemoryError::backend("qdrant", e))?;

        let mirror = Self {
            client,
            collection: collection.to_string(),
            dimension,
        };
        mirror.ensure_collection().await?;

        Ok(mirror)
    }

    async fn ensure_collection(&self) -> Result<(), MemoryError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| MemoryError::backend("qdrant", e))?;

        if !exists {
            info!("Creating collection: {}", self.collection);

            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| MemoryError::backend("qdrant", e))?;

            info!("Collection {} created ({} dims)", self.collection, self.dimension);
            return Ok(());
        }

        // Validate the existing collection's dimension against ours
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| MemoryError::backend("qdrant", e))?;

        if let Some(existing) = collection_dimension(&info) {
            if existing != self.dimension as u64 {
                return Err(MemoryError::Configuration(format!(
                    "Collection {} has dimension {} but {} is configured; \
                     recreate the collection or fix MEMVAULT_EMBEDDING_DIM",
                    self.collection, existing, self.dimension
                )));
            }
        }

        debug!("Collection {} already exists", self.collection);
        Ok(())
    }

    /// Qdrant point ids must be UUIDs or integers; derive a stable UUID
    /// from the first 16 bytes of the hex content hash.
    pub fn point_id(memory_id: &str) -> Result<Uuid, MemoryError> {
        let bytes = hex::decode(memory_id)
            .map_err(|e| MemoryError::InvalidInput(format!("Invalid memory id: {}", e)))?;
        if bytes.len() < 16 {
            return Err(MemoryError::InvalidInput(format!(
                "Memory id too short for point id: {}",
                memory_id
            )));
        }
        let mut id = [0u8; 16];
        id.copy_from_slice(&bytes[..16]);
        Ok(Uuid::from_bytes(id))
    }
}

fn collection_dimension(
    info: &qdrant_client::qdrant::GetCollectionInfoResponse,
) -> Option<u64> {
    use qdrant_client::qdrant::vectors_config::Config;

    let params = info
        .result
        .as_ref()?
        .config
        .as_ref()?
        .params
        .as_ref()?
        .vectors_config
        .as_ref()?
        .config
        .as_ref()?;
    match params {
        Config::Params(p) => Some(p.size),
        Config::ParamsMap(_) => None,
    }
}

fn point_to_result(point: qdrant_client::qdrant::ScoredPoint) -> Option<SearchResult> {
    let payload = point.payload;
    let created_at = get_i64(&payload, "created_at").unwrap_or(0);
    let created_at_iso = chrono::DateTime::from_timestamp(created_at, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    let location: StorageLocation = get_string(&payload, "storage_location")
        .and_then(|s| s.parse().ok())
        .unwrap_or(StorageLocation::Inline);

    Some(SearchResult {
        memory: Memory {
            id: get_string(&payload, "memory_id")?,
            content: get_string(&payload, "content")?,
            tags: get_string_list(&payload, "tags"),
            memory_type: get_string(&payload, "memory_type").unwrap_or_default(),
            importance: get_f64(&payload, "importance").unwrap_or(0.5) as f32,
            metadata: Default::default(), // Not mirrored; relational row is canonical
            created_at,
            created_at_iso,
            embedding: vec![], // Not returned in search results
            storage_location: location,
        },
        relevance_score: point.score.clamp(0.0, 1.0),
    })
}

#[async_trait]
impl VectorIndex for QdrantMirror {
    async fn upsert(&self, memory: &Memory) -> Result<(), MemoryError> {
        if memory.embedding.is_empty() {
            return Err(MemoryError::InvalidInput(
                "Cannot mirror a memory without an embedding".to_string(),
            ));
        }

        let point_id = Self::point_id(&memory.id)?;
        let tags: Vec<Value> = memory.tags.iter().map(|t| Value::from(t.clone())).collect();
        let payload: HashMap<String, Value> = [
            ("memory_id".to_string(), Value::from(memory.id.clone())),
            ("content".to_string(), Value::from(memory.content.clone())),
            ("tags".to_string(), Value::from(tags)),
            (
                "memory_type".to_string(),
                Value::from(memory.memory_type.clone()),
            ),
            (
                "importance".to_string(),
                Value::from(memory.importance as f64),
            ),
            ("created_at".to_string(), Value::from(memory.created_at)),
            (
                "storage_location".to_string(),
                Value::from(memory.storage_location.as_str()),
            ),
        ]
        .into_iter()
        .collect();

        let point = PointStruct::new(point_id.to_string(), memory.embedding.clone(), payload);

        // Upsert replaces any existing point for this id
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]))
            .await
            .map_err(|e| MemoryError::backend("qdrant", e))?;

        debug!("Mirrored memory {} to {}", memory.id, self.collection);
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, MemoryError> {
        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, embedding.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| MemoryError::backend("qdrant", e))?;

        let results: Vec<SearchResult> = search_result
            .result
            .into_iter()
            .filter_map(point_to_result)
            .collect();

        debug!("Mirror search returned {} points", results.len());
        Ok(results)
    }

    async fn delete(&self, id: &str) -> Result<(), MemoryError> {
        let point_id = Self::point_id(id)?;

        // Deleting a non-existent point is not an error
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection).points(vec![point_id.to_string()]),
            )
            .await
            .map_err(|e| MemoryError::backend("qdrant", e))?;

        debug!("Deleted mirror point for {}", id);
        Ok(())
    }

    async fn stats(&self) -> Result<MirrorStats, MemoryError> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| MemoryError::backend("qdrant", e))?;

        let points_count = info
            .result
            .as_ref()
            .and_then(|r| r.points_count)
            .unwrap_or(0);
        let vector_dims = collection_dimension(&info).unwrap_or(self.dimension as u64);

        Ok(MirrorStats {
            points_count,
            vector_dims,
        })
    }
}

// Helper functions to extract values from payload
fn get_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn get_f64(payload: &HashMap<String, Value>, key: &str) -> Option<f64> {
    payload.get(key).and_then(|v| v.as_double())
}

fn get_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
    payload.get(key).and_then(|v| v.as_integer())
}

fn get_string_list(payload: &HashMap<String, Value>, key: &str) -> Vec<String> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::ListValue(list)) => list
            .values
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_point_id_deterministic() {
        let memory = Memory::new("hello world".into(), vec![], "note".into(), 0.5, BTreeMap::new());
        let a = QdrantMirror::point_id(&memory.id).unwrap();
        let b = QdrantMirror::point_id(&memory.id).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_point_id_rejects_non_hex() {
        assert!(QdrantMirror::point_id("not-a-hash").is_err());
        assert!(QdrantMirror::point_id("abcd").is_err());
    }

    // Integration tests require a running Qdrant instance; ignored by
    // default. Set MEMVAULT_TEST_QDRANT_URL to run them.

    #[tokio::test]
    #[ignore]
    async fn test_mirror_round_trip() {
        let url = std::env::var("MEMVAULT_TEST_QDRANT_URL")
            .expect("MEMVAULT_TEST_QDRANT_URL not set");
        let mirror = QdrantMirror::new(&url, None, "memvault_test", 4)
            .await
            .unwrap();

        let memory = Memory::new(
            "mirror round trip".into(),
            vec!["test".into()],
            "note".into(),
            0.7,
            BTreeMap::new(),
        )
        .with_embedding(vec![0.1, 0.2, 0.3, 0.4]);

        mirror.upsert(&memory).await.unwrap();

        let results = mirror.search(&[0.1, 0.2, 0.3, 0.4], 10).await.unwrap();
        let hit = results
            .iter()
            .find(|r| r.memory.id == memory.id)
            .expect("mirrored point not found");
        assert_eq!(hit.memory.content, "mirror round trip");
        assert!(hit.relevance_score > 0.9);

        mirror.delete(&memory.id).await.unwrap();
        // Deleting again is still fine
        mirror.delete(&memory.id).await.unwrap();
    }
}

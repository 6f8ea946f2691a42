//! In-memory fake backends for orchestrator and tool-boundary tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{BlobStore, Embedder, MetadataStore, VectorIndex};
use crate::error::MemoryError;
use crate::orchestrator::{MemoryVault, StoreOutcome};
use crate::types::{
    BlobStats, InsertOutcome, Memory, MirrorStats, RelationalStats, SearchResult, StorageLocation,
};

#[derive(Default)]
pub(crate) struct FakeMetadata {
    pub rows: Mutex<HashMap<String, Memory>>,
    pub scores: Mutex<HashMap<String, f32>>,
    pub fail: AtomicBool,
}

impl FakeMetadata {
    fn check(&self) -> Result<(), MemoryError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(MemoryError::backend("postgres", "forced failure"))
        } else {
            Ok(())
        }
    }

    pub fn set_score(&self, id: &str, score: f32) {
        self.scores.lock().unwrap().insert(id.to_string(), score);
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl MetadataStore for FakeMetadata {
    async fn insert_if_absent(&self, memory: &Memory) -> Result<InsertOutcome, MemoryError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&memory.id) {
            Ok(InsertOutcome::Duplicate)
        } else {
            rows.insert(memory.id.clone(), memory.clone());
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn exists(&self, id: &str) -> Result<bool, MemoryError> {
        self.check()?;
        Ok(self.rows.lock().unwrap().contains_key(id))
    }

    async fn get(&self, id: &str) -> Result<Option<Memory>, MemoryError> {
        self.check()?;
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn search_by_vector(
        &self,
        _embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, MemoryError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        let scores = self.scores.lock().unwrap();
        let mut results: Vec<SearchResult> = rows
            .values()
            .map(|m| SearchResult {
                memory: m.clone(),
                relevance_score: scores.get(&m.id).copied().unwrap_or(0.9),
            })
            .collect();
        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap()
                .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
        });
        results.truncate(limit);
        Ok(results)
    }

    async fn search_by_tags(
        &self,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        let mut hits: Vec<Memory> = rows
            .values()
            .filter(|m| m.tags.iter().any(|t| tags.contains(t)))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        self.check()?;
        Ok(self.rows.lock().unwrap().remove(id).is_some())
    }

    async fn stats(&self) -> Result<RelationalStats, MemoryError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        Ok(RelationalStats {
            memory_count: rows.len() as i64,
            blob_count: rows
                .values()
                .filter(|m| m.storage_location == StorageLocation::Blob)
                .count() as i64,
            avg_vector_dims: 4.0,
            oldest: None,
            newest: None,
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeMirror {
    pub points: Mutex<HashMap<String, Memory>>,
    pub scores: Mutex<HashMap<String, f32>>,
    pub fail: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
}

impl FakeMirror {
    fn check(&self) -> Result<(), MemoryError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(MemoryError::backend("qdrant", "forced failure"))
        } else {
            Ok(())
        }
    }

    pub fn set_score(&self, id: &str, score: f32) {
        self.scores.lock().unwrap().insert(id.to_string(), score);
    }

    pub fn point_count(&self) -> usize {
        self.points.lock().unwrap().len()
    }
}

#[async_trait]
impl VectorIndex for FakeMirror {
    async fn upsert(&self, memory: &Memory) -> Result<(), MemoryError> {
        self.check()?;
        self.points
            .lock()
            .unwrap()
            .insert(memory.id.clone(), memory.clone());
        Ok(())
    }

    async fn search(
        &self,
        _embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, MemoryError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.check()?;
        let points = self.points.lock().unwrap();
        let scores = self.scores.lock().unwrap();
        let mut results: Vec<SearchResult> = points
            .values()
            .map(|m| SearchResult {
                memory: m.clone(),
                relevance_score: scores.get(&m.id).copied().unwrap_or(0.9),
            })
            .collect();
        results.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap());
        results.truncate(limit);
        Ok(results)
    }

    async fn delete(&self, id: &str) -> Result<(), MemoryError> {
        self.check()?;
        self.points.lock().unwrap().remove(id);
        Ok(())
    }

    async fn stats(&self) -> Result<MirrorStats, MemoryError> {
        self.check()?;
        Ok(MirrorStats {
            points_count: self.points.lock().unwrap().len() as u64,
            vector_dims: 4,
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeBlobs {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub fail: AtomicBool,
}

impl FakeBlobs {
    fn check(&self) -> Result<(), MemoryError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(MemoryError::backend("blob", "forced failure"))
        } else {
            Ok(())
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for FakeBlobs {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), MemoryError> {
        self.check()?;
        self.objects
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_insert_with(|| bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, MemoryError> {
        self.check()?;
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| MemoryError::NotFound(format!("blob {}", key)))
    }

    async fn delete(&self, key: &str) -> Result<(), MemoryError> {
        self.check()?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn stats(&self) -> Result<BlobStats, MemoryError> {
        self.check()?;
        Ok(BlobStats {
            bucket: "fake".to_string(),
            object_count: self.objects.lock().unwrap().len() as u64,
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeEmbedder {
    pub fail: AtomicBool,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn dimension(&self) -> usize {
        4
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MemoryError::EmbeddingFailed("forced failure".to_string()));
        }
        let len = text.len() as f32;
        Ok(vec![len, len / 2.0, 1.0, 0.0])
    }
}

pub(crate) struct Harness {
    pub metadata: Arc<FakeMetadata>,
    pub mirror: Arc<FakeMirror>,
    pub blobs: Arc<FakeBlobs>,
    pub embedder: Arc<FakeEmbedder>,
    pub vault: MemoryVault,
}

pub(crate) fn harness_with(blob_threshold: usize, query_timeout: Duration) -> Harness {
    let metadata = Arc::new(FakeMetadata::default());
    let mirror = Arc::new(FakeMirror::default());
    let blobs = Arc::new(FakeBlobs::default());
    let embedder = Arc::new(FakeEmbedder::default());
    let vault = MemoryVault::new(
        metadata.clone(),
        mirror.clone(),
        blobs.clone(),
        embedder.clone(),
        blob_threshold,
        query_timeout,
    );
    Harness {
        metadata,
        mirror,
        blobs,
        embedder,
        vault,
    }
}

pub(crate) fn harness() -> Harness {
    harness_with(1024, Duration::from_secs(1))
}

pub(crate) async fn store_simple(
    vault: &MemoryVault,
    content: &str,
    tags: &[&str],
) -> StoreOutcome {
    vault
        .store(
            content.to_string(),
            tags.iter().map(|t| t.to_string()).collect(),
            "note".to_string(),
            0.5,
            BTreeMap::new(),
        )
        .await
        .unwrap()
}

//! ============================================================================
//! Relational Store - Postgres + pgvector source of truth
//! ============================================================================
//! Persists memory rows with an inline embedding column. The relational row
//! is canonical; the ANN mirror and blob objects are derived from it.
//! ============================================================================

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::backend::MetadataStore;
use crate::error::MemoryError;
use crate::types::{InsertOutcome, Memory, RelationalStats, SearchResult, StorageLocation};

/// Relational metadata store backed by Postgres with pgvector
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Connect with a bounded pool and ensure the schema exists.
    ///
    /// The embedding column is created with the configured dimension; an
    /// existing table keeps its dimension, and inserts with a different one
    /// fail at the database rather than being silently reconciled.
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        embedding_dim: usize,
    ) -> Result<Self, MemoryError> {
        debug!("Connecting to Postgres (pool size {})", max_connections);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| MemoryError::backend("postgres", e))?;

        let store = Self { pool };
        store.ensure_schema(embedding_dim).await?;

        Ok(store)
    }

    async fn ensure_schema(&self, embedding_dim: usize) -> Result<(), MemoryError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::backend("postgres", e))?;

        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                tags TEXT[] NOT NULL DEFAULT '{{}}',
                memory_type TEXT NOT NULL,
                importance REAL NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}',
                created_at TIMESTAMPTZ NOT NULL,
                embedding vector({}) NOT NULL,
                storage_location TEXT NOT NULL
            )
            "#,
            embedding_dim
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::backend("postgres", e))?;

        info!("Postgres schema ready (embedding dim {})", embedding_dim);
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn classify(err: sqlx::Error) -> MemoryError {
    match err {
        // A statement the database itself rejected (constraint or type
        // violation, e.g. an embedding whose dimension does not match the
        // vector column) needs operator action and must never be retried.
        sqlx::Error::Database(db) => MemoryError::Configuration(format!(
            "postgres rejected the statement: {}",
            db.message()
        )),
        // Pool exhaustion and connectivity problems are retryable.
        other => MemoryError::backend("postgres", other),
    }
}

fn row_to_memory(row: &sqlx::postgres::PgRow) -> Result<Memory, MemoryError> {
    let metadata_val: serde_json::Value = row.try_get("metadata").map_err(classify)?;
    let metadata: BTreeMap<String, String> = serde_json::from_value(metadata_val)?;

    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at").map_err(classify)?;
    let location: String = row.try_get("storage_location").map_err(classify)?;

    Ok(Memory {
        id: row.try_get("id").map_err(classify)?,
        content: row.try_get("content").map_err(classify)?,
        tags: row.try_get("tags").map_err(classify)?,
        memory_type: row.try_get("memory_type").map_err(classify)?,
        importance: row.try_get::<f32, _>("importance").map_err(classify)?,
        metadata,
        created_at: created_at.timestamp(),
        created_at_iso: created_at.to_rfc3339(),
        embedding: vec![], // Not returned from queries
        storage_location: location
            .parse::<StorageLocation>()
            .map_err(MemoryError::Configuration)?,
    })
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn insert_if_absent(&self, memory: &Memory) -> Result<InsertOutcome, MemoryError> {
        let metadata = serde_json::to_value(&memory.metadata)?;
        let created_at = chrono::DateTime::from_timestamp(memory.created_at, 0)
            .unwrap_or_else(chrono::Utc::now);
        let embedding = Vector::from(memory.embedding.clone());

        // ON CONFLICT DO NOTHING makes concurrent same-hash inserts race
        // safely: the loser sees zero rows affected and reports Duplicate.
        let result = sqlx::query(
            r#"
            INSERT INTO memories
                (id, content, tags, memory_type, importance, metadata, created_at, embedding, storage_location)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&memory.id)
        .bind(&memory.content)
        .bind(&memory.tags)
        .bind(&memory.memory_type)
        .bind(memory.importance)
        .bind(metadata)
        .bind(created_at)
        .bind(embedding)
        .bind(memory.storage_location.as_str())
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            debug!("Duplicate insert for memory {}", memory.id);
            Ok(InsertOutcome::Duplicate)
        } else {
            debug!("Inserted memory {}", memory.id);
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn exists(&self, id: &str) -> Result<bool, MemoryError> {
        let row = sqlx::query("SELECT 1 AS one FROM memories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row.is_some())
    }

    async fn get(&self, id: &str) -> Result<Option<Memory>, MemoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, content, tags, memory_type, importance, metadata, created_at, storage_location
            FROM memories WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        row.as_ref().map(row_to_memory).transpose()
    }

    async fn search_by_vector(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, MemoryError> {
        let query_vector = Vector::from(embedding.to_vec());

        let rows = sqlx::query(
            r#"
            SELECT id, content, tags, memory_type, importance, metadata, created_at,
                   storage_location, 1 - (embedding <=> $1) AS score
            FROM memories
            ORDER BY embedding <=> $1, created_at DESC
            LIMIT $2
            "#,
        )
        .bind(query_vector)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let memory = row_to_memory(row)?;
            let score: f64 = row.try_get("score").map_err(classify)?;
            results.push(SearchResult {
                memory,
                relevance_score: score.clamp(0.0, 1.0) as f32,
            });
        }
        Ok(results)
    }

    async fn search_by_tags(
        &self,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        // Array overlap: ANY of the requested tags matches
        let rows = sqlx::query(
            r#"
            SELECT id, content, tags, memory_type, importance, metadata, created_at, storage_location
            FROM memories
            WHERE tags && $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(tags)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.iter().map(row_to_memory).collect()
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM memories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<RelationalStats, MemoryError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS memory_count,
                   COUNT(*) FILTER (WHERE storage_location = 'blob') AS blob_count,
                   COALESCE(AVG(vector_dims(embedding))::float8, 0) AS avg_vector_dims,
                   MIN(created_at) AS oldest,
                   MAX(created_at) AS newest
            FROM memories
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        let oldest: Option<chrono::DateTime<chrono::Utc>> =
            row.try_get("oldest").map_err(classify)?;
        let newest: Option<chrono::DateTime<chrono::Utc>> =
            row.try_get("newest").map_err(classify)?;

        Ok(RelationalStats {
            memory_count: row.try_get("memory_count").map_err(classify)?,
            blob_count: row.try_get("blob_count").map_err(classify)?,
            avg_vector_dims: row.try_get("avg_vector_dims").map_err(classify)?,
            oldest: oldest.map(|t| t.to_rfc3339()),
            newest: newest.map(|t| t.to_rfc3339()),
        })
    }
}

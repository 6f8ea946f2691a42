//! ============================================================================
//! Vault Configuration - Environment-driven settings
//! ============================================================================
//! All backend credentials and tuning knobs are collected here at bootstrap
//! and injected into the orchestrator at construction. No globals.
//! ============================================================================

use crate::error::MemoryError;

/// Default blob-offload threshold: content above this many bytes goes to
/// the blob store instead of the relational row (~50 KB).
pub const DEFAULT_BLOB_THRESHOLD: usize = 50 * 1024;

/// Default per-backend query timeout for retrieval fan-out
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;

/// Default embedding model (OpenAI compatible)
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Expected dimension for text-embedding-3-small
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Configuration for the memory vault and its backends
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Postgres connection string (source of truth)
    pub database_url: String,
    /// Bounded relational connection pool size
    pub max_db_connections: u32,

    /// Qdrant endpoint for the ANN mirror
    pub qdrant_url: String,
    /// Optional Qdrant API key (cloud deployments)
    pub qdrant_api_key: Option<String>,
    /// Qdrant collection name
    pub collection_name: String,

    /// S3-compatible endpoint for blob offload (e.g. R2)
    pub blob_endpoint: String,
    pub blob_bucket: String,
    pub blob_access_key: String,
    pub blob_secret_key: String,

    /// Embedding API settings (OpenAI-compatible)
    pub embedding_api_key: String,
    pub embedding_base_url: String,
    pub embedding_model: String,
    /// Fixed process-wide embedding dimension
    pub embedding_dim: usize,

    /// Content larger than this many bytes is offloaded to the blob store
    pub blob_threshold_bytes: usize,
    /// Per-backend timeout for retrieval fan-out
    pub query_timeout_ms: u64,
}

impl VaultConfig {
    /// Load configuration from environment variables.
    ///
    /// Mandatory: MEMVAULT_DATABASE_URL, MEMVAULT_QDRANT_URL,
    /// MEMVAULT_BLOB_ENDPOINT/BUCKET/ACCESS_KEY/SECRET_KEY,
    /// MEMVAULT_EMBEDDING_API_KEY. Everything else has defaults.
    pub fn from_env() -> Result<Self, MemoryError> {
        Ok(Self {
            database_url: require("MEMVAULT_DATABASE_URL")?,
            max_db_connections: parse_or("MEMVAULT_DB_POOL_SIZE", 5),
            qdrant_url: require("MEMVAULT_QDRANT_URL")?,
            qdrant_api_key: std::env::var("MEMVAULT_QDRANT_API_KEY").ok(),
            collection_name: std::env::var("MEMVAULT_COLLECTION")
                .unwrap_or_else(|_| "memvault_memories".to_string()),
            blob_endpoint: require("MEMVAULT_BLOB_ENDPOINT")?,
            blob_bucket: require("MEMVAULT_BLOB_BUCKET")?,
            blob_access_key: require("MEMVAULT_BLOB_ACCESS_KEY")?,
            blob_secret_key: require("MEMVAULT_BLOB_SECRET_KEY")?,
            embedding_api_key: require("MEMVAULT_EMBEDDING_API_KEY")?,
            embedding_base_url: std::env::var("MEMVAULT_EMBEDDING_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            embedding_model: std::env::var("MEMVAULT_EMBEDDING_MODEL")
                .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dim: parse_or("MEMVAULT_EMBEDDING_DIM", DEFAULT_EMBEDDING_DIM),
            blob_threshold_bytes: parse_or("MEMVAULT_BLOB_THRESHOLD", DEFAULT_BLOB_THRESHOLD),
            query_timeout_ms: parse_or("MEMVAULT_QUERY_TIMEOUT_MS", DEFAULT_QUERY_TIMEOUT_MS),
        })
    }
}

fn require(name: &str) -> Result<String, MemoryError> {
    std::env::var(name)
        .map_err(|_| MemoryError::Configuration(format!("{} is not set", name)))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_mandatory_var_is_configuration_error() {
        // Clear one mandatory var under a name no other test uses
        std::env::remove_var("MEMVAULT_DATABASE_URL");
        let err = VaultConfig::from_env().unwrap_err();
        assert!(matches!(err, MemoryError::Configuration(_)));
    }

    #[test]
    fn test_parse_or_falls_back() {
        std::env::remove_var("MEMVAULT_NOT_SET_EVER");
        assert_eq!(parse_or("MEMVAULT_NOT_SET_EVER", 42u64), 42);
    }
}

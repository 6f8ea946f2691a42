//! ============================================================================
//! Error Types - Classified failure taxonomy for the storage core
//! ============================================================================
//! Every raw backend error is classified into one of these variants before
//! it crosses the orchestrator boundary. Duplicate content is deliberately
//! not an error; see `types::InsertOutcome`.
//! ============================================================================

/// Error types for the memory vault
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Fatal misconfiguration, e.g. a pre-existing Qdrant collection with a
    /// different vector dimension. Requires operator action, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The embedding collaborator failed. Fatal for the current store call:
    /// no vector-less row is ever persisted.
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    /// A backend is unreachable, timed out, or its connection pool is
    /// exhausted. Retryable.
    #[error("Backend unavailable ({backend}): {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// Lookup or delete of an id/key that does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid caller input (empty content, out-of-range importance).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MemoryError {
    /// Whether the caller may retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MemoryError::BackendUnavailable { .. })
    }

    /// Shorthand for a backend failure with a displayable cause.
    pub fn backend(backend: &'static str, err: impl std::fmt::Display) -> Self {
        MemoryError::BackendUnavailable {
            backend,
            reason: err.to_string(),
        }
    }
}

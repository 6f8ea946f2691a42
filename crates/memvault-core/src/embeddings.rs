//! ============================================================================
//! Embedding Client - Vector embeddings for semantic memory search
//! ============================================================================
//! Generates text embeddings through an OpenAI-compatible API. The model is
//! a black box producing a fixed-dimension vector; the dimension is fixed
//! process-wide and validated on every response.
//! ============================================================================

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::Embedder;
use crate::error::MemoryError;

/// Embedding client for generating text vectors
pub struct EmbeddingClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct EmbeddingUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

impl EmbeddingClient {
    /// Create a new embedding client
    pub fn new(api_key: String, base_url: String, model: String, dimension: usize) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model,
            dimension,
        }
    }

    /// Generate embeddings for multiple texts
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(format!("unreadable response: {}", e)))?;

        if !status.is_success() {
            // Try to parse a structured API error first
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(MemoryError::EmbeddingFailed(format!(
                    "API error ({}): {}",
                    status, error.error.message
                )));
            }
            return Err(MemoryError::EmbeddingFailed(format!(
                "API error ({}): {}",
                status, body
            )));
        }

        let embedding_response: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| MemoryError::EmbeddingFailed(format!("unparseable response: {}", e)))?;

        if let Some(usage) = &embedding_response.usage {
            debug!(
                "Embedding tokens used: {} (model: {})",
                usage.total_tokens, embedding_response.model
            );
        }

        // Sort by index and validate dimensions
        let mut embeddings: Vec<(usize, Vec<f32>)> = embedding_response
            .data
            .into_iter()
            .map(|d| (d.index, d.embedding))
            .collect();
        embeddings.sort_by_key(|(idx, _)| *idx);

        let vectors: Vec<Vec<f32>> = embeddings.into_iter().map(|(_, e)| e).collect();
        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(MemoryError::EmbeddingFailed(format!(
                    "model returned {} dims, expected {}",
                    vector.len(),
                    self.dimension
                )));
            }
        }

        Ok(vectors)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let embeddings = self.embed_batch(vec![text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::EmbeddingFailed("no embedding returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = EmbeddingClient::new(
            "test-key".to_string(),
            "https://api.openai.com/v1".to_string(),
            "text-embedding-3-small".to_string(),
            1536,
        );
        assert_eq!(client.base_url(), "https://api.openai.com/v1");
        assert_eq!(client.model(), "text-embedding-3-small");
        assert_eq!(client.dimension(), 1536);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let client = EmbeddingClient::new(
            "test-key".to_string(),
            "https://api.openai.com/v1".to_string(),
            "text-embedding-3-small".to_string(),
            1536,
        );
        let result = client.embed_batch(vec![]).await;
        assert!(result.is_ok());
        assert!(result.unwrap().is_empty());
    }
}

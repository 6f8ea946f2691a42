//! ============================================================================
//! Tool Boundary - Structured JSON interface over the vault
//! ============================================================================
//! Maps tool-call requests onto orchestrator operations and serializes the
//! responses. Every failure is returned as structured data with an `error`
//! field; nothing here ever raises to the caller's transport.
//! ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::error;

use crate::orchestrator::MemoryVault;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;
const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.3;
const DEFAULT_IMPORTANCE: f32 = 0.5;

/// Tool-call handler over one explicit vault instance
pub struct ToolHandler {
    vault: Arc<MemoryVault>,
}

impl ToolHandler {
    pub fn new(vault: Arc<MemoryVault>) -> Self {
        Self { vault }
    }

    /// Route a tool call by name. Unknown tools yield a structured error.
    pub async fn dispatch(&self, name: &str, args: Value) -> Value {
        match name {
            "store_memory" => self.store_memory(args).await,
            "search_memories" => self.search_memories(args).await,
            "search_by_tag" => self.search_by_tag(args).await,
            "get_memory_stats" => self.get_memory_stats(args).await,
            "delete_memory" => self.delete_memory(args).await,
            _ => error_payload(format!("Unknown tool: {}", name)),
        }
    }

    /// Store content with tags and an importance score.
    pub async fn store_memory(&self, args: Value) -> Value {
        let Some(content) = args.get("content").and_then(Value::as_str) else {
            return error_payload("Missing required argument: content".to_string());
        };
        let tags = string_array(&args, "tags");
        let importance = args
            .get("importance")
            .and_then(Value::as_f64)
            .map(|v| v as f32)
            .unwrap_or(DEFAULT_IMPORTANCE)
            .clamp(0.0, 1.0);
        let metadata: BTreeMap<String, String> = args
            .get("metadata")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let memory_type = args
            .get("memory_type")
            .and_then(Value::as_str)
            .unwrap_or("note")
            .to_string();
        let content_length = content.len();

        match self
            .vault
            .store(content.to_string(), tags.clone(), memory_type, importance, metadata)
            .await
        {
            Ok(outcome) => json!({
                "success": true,
                "memory_id": outcome.id,
                "message": outcome.message,
                "content_length": content_length,
                "tags": tags,
                "importance": importance,
            }),
            Err(e) => {
                error!("store_memory failed: {}", e);
                error_payload(e.to_string())
            }
        }
    }

    /// Semantic similarity search.
    pub async fn search_memories(&self, args: Value) -> Value {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return error_payload("Missing required argument: query".to_string());
        };
        let limit = clamp_limit(&args);
        let threshold = args
            .get("similarity_threshold")
            .and_then(Value::as_f64)
            .map(|v| v as f32)
            .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD)
            .clamp(0.0, 1.0);

        match self.vault.retrieve(query, limit, threshold).await {
            Ok(results) => {
                let memories: Vec<Value> = results
                    .iter()
                    .map(|r| {
                        json!({
                            "id": r.memory.id,
                            "content": r.memory.content,
                            "tags": r.memory.tags,
                            "importance": r.memory.importance,
                            "created_at": r.memory.created_at_iso,
                            "similarity_score": r.relevance_score,
                        })
                    })
                    .collect();
                json!({
                    "success": true,
                    "query": query,
                    "results_found": memories.len(),
                    "similarity_threshold": threshold,
                    "memories": memories,
                })
            }
            Err(e) => {
                error!("search_memories failed: {}", e);
                error_payload(e.to_string())
            }
        }
    }

    /// Find memories by tag (ANY-of when several are given; no score field).
    pub async fn search_by_tag(&self, args: Value) -> Value {
        let requested_tag = args
            .get("tag")
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        let mut tags = string_array(&args, "tags");
        if let Some(tag) = &requested_tag {
            tags.push(tag.clone());
        }
        if tags.is_empty() {
            return error_payload("Missing required argument: tag".to_string());
        }
        let limit = clamp_limit(&args);

        match self.vault.search_by_tags(&tags, limit).await {
            Ok(memories) => {
                let memories: Vec<Value> = memories
                    .iter()
                    .map(|m| {
                        json!({
                            "id": m.id,
                            "content": m.content,
                            "tags": m.tags,
                            "importance": m.importance,
                            "created_at": m.created_at_iso,
                        })
                    })
                    .collect();
                // Echo the caller's request: the single tag verbatim when
                // one was given, the array otherwise.
                let mut response = json!({
                    "success": true,
                    "tags": tags,
                    "results_found": memories.len(),
                    "memories": memories,
                });
                if let Some(tag) = requested_tag {
                    response["tag"] = json!(tag);
                }
                response
            }
            Err(e) => {
                error!("search_by_tag failed: {}", e);
                error_payload(e.to_string())
            }
        }
    }

    /// Storage statistics and health information. Always succeeds; failing
    /// providers show up as error strings inside the stats payload.
    pub async fn get_memory_stats(&self, _args: Value) -> Value {
        let stats = self.vault.stats().await;
        match serde_json::to_value(&stats) {
            Ok(stats) => json!({
                "success": true,
                "stats": stats,
            }),
            Err(e) => error_payload(format!("Failed to serialize stats: {}", e)),
        }
    }

    /// Delete a specific memory by id.
    pub async fn delete_memory(&self, args: Value) -> Value {
        let Some(memory_id) = args.get("memory_id").and_then(Value::as_str) else {
            return error_payload("Missing required argument: memory_id".to_string());
        };

        match self.vault.delete(memory_id).await {
            Ok(true) => json!({
                "success": true,
                "memory_id": memory_id,
                "message": "Memory deleted successfully",
            }),
            Ok(false) => json!({
                "success": false,
                "memory_id": memory_id,
                "message": "Memory not found",
            }),
            Err(e) => {
                error!("delete_memory failed: {}", e);
                error_payload(e.to_string())
            }
        }
    }
}

fn error_payload(message: String) -> Value {
    json!({
        "success": false,
        "error": message,
    })
}

fn string_array(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn clamp_limit(args: &Value) -> usize {
    args.get("limit")
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;
    use std::sync::atomic::Ordering;

    fn handler() -> (crate::test_support::Harness, ToolHandler) {
        let h = harness();
        let vault = Arc::new(MemoryVault::new(
            h.metadata.clone(),
            h.mirror.clone(),
            h.blobs.clone(),
            h.embedder.clone(),
            1024,
            std::time::Duration::from_secs(1),
        ));
        (h, ToolHandler::new(vault))
    }

    #[tokio::test]
    async fn test_store_memory_response_shape() {
        let (_h, handler) = handler();

        let response = handler
            .store_memory(json!({
                "content": "hello world",
                "tags": ["greeting"],
                "importance": 0.8,
            }))
            .await;

        assert_eq!(response["success"], true);
        assert_eq!(response["content_length"], 11);
        assert_eq!(response["tags"], json!(["greeting"]));
        assert!(response["memory_id"].as_str().unwrap().len() == 64);
        assert!(response["message"].as_str().unwrap().contains("stored"));
    }

    #[tokio::test]
    async fn test_store_memory_missing_content() {
        let (_h, handler) = handler();
        let response = handler.store_memory(json!({"tags": []})).await;
        assert_eq!(response["success"], false);
        assert!(response["error"].as_str().unwrap().contains("content"));
    }

    #[tokio::test]
    async fn test_search_memories_end_to_end() {
        let (_h, handler) = handler();
        handler
            .store_memory(json!({"content": "hello world", "tags": ["greeting"]}))
            .await;

        let response = handler
            .search_memories(json!({"query": "hello", "limit": 1}))
            .await;

        assert_eq!(response["success"], true);
        assert_eq!(response["results_found"], 1);
        let memory = &response["memories"][0];
        assert_eq!(memory["content"], "hello world");
        assert!(memory["similarity_score"].as_f64().unwrap() > 0.0);
        // Tag results carry no score field, search results do
        assert!(memory.get("similarity_score").is_some());
    }

    #[tokio::test]
    async fn test_limit_clamped_into_range() {
        let (_h, handler) = handler();
        for i in 0..5 {
            handler
                .store_memory(json!({"content": format!("memory {}", i)}))
                .await;
        }

        let response = handler
            .search_memories(json!({"query": "memory", "limit": 0, "similarity_threshold": 0.0}))
            .await;
        assert_eq!(response["success"], true);
        // limit 0 clamps to 1
        assert_eq!(response["results_found"], 1);
    }

    #[tokio::test]
    async fn test_search_by_tag_has_no_score() {
        let (_h, handler) = handler();
        handler
            .store_memory(json!({"content": "tagged a", "tags": ["a"]}))
            .await;
        handler
            .store_memory(json!({"content": "tagged b", "tags": ["b"]}))
            .await;

        let response = handler.search_by_tag(json!({"tag": "a"})).await;
        assert_eq!(response["success"], true);
        assert_eq!(response["results_found"], 1);
        // The requested tag comes back verbatim
        assert_eq!(response["tag"], "a");
        let memory = &response["memories"][0];
        assert_eq!(memory["content"], "tagged a");
        assert!(memory.get("similarity_score").is_none());
    }

    #[tokio::test]
    async fn test_search_by_tag_array_echoes_array() {
        let (_h, handler) = handler();
        handler
            .store_memory(json!({"content": "tagged a", "tags": ["a"]}))
            .await;

        let response = handler.search_by_tag(json!({"tags": ["a", "b"]})).await;
        assert_eq!(response["success"], true);
        assert_eq!(response["tags"], json!(["a", "b"]));
        // No single tag was requested, so none is invented
        assert!(response.get("tag").is_none());
    }

    #[tokio::test]
    async fn test_stats_is_partial_under_failure() {
        let (h, handler) = handler();
        h.mirror.fail.store(true, Ordering::SeqCst);

        let response = handler.get_memory_stats(json!({})).await;
        assert_eq!(response["success"], true);
        assert!(response["stats"]["relational"].is_object());
        assert!(response["stats"].get("mirror").is_none());
        assert!(!response["stats"]["errors"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_memory_messages() {
        let (_h, handler) = handler();
        let stored = handler
            .store_memory(json!({"content": "short lived"}))
            .await;
        let id = stored["memory_id"].as_str().unwrap();

        let response = handler.delete_memory(json!({"memory_id": id})).await;
        assert_eq!(response["success"], true);
        assert_eq!(response["message"], "Memory deleted successfully");

        let response = handler.delete_memory(json!({"memory_id": id})).await;
        assert_eq!(response["success"], false);
        assert_eq!(response["message"], "Memory not found");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let (_h, handler) = handler();
        let response = handler.dispatch("drop_all_memories", json!({})).await;
        assert_eq!(response["success"], false);
        assert!(response["error"].as_str().unwrap().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_backend_error_is_structured_not_raised() {
        let (h, handler) = handler();
        h.metadata.fail.store(true, Ordering::SeqCst);

        let response = handler
            .dispatch("store_memory", json!({"content": "unreachable"}))
            .await;
        assert_eq!(response["success"], false);
        assert!(response["error"].as_str().unwrap().contains("postgres"));
    }
}

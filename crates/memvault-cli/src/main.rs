// ============================================================================
// memvault — CLI for the durable semantic memory vault
// ============================================================================
// Usage:
//   memvault store "content" --tags a,b --importance 0.8
//   memvault search "query" --limit 10 --threshold 0.3
//   memvault tag greeting --limit 10
//   memvault stats
//   memvault delete <memory-id>
// ============================================================================

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use memvault_core::{MemoryVault, ToolHandler, VaultConfig};

/// Durable, deduplicated, semantically searchable memory storage
#[derive(Parser)]
#[command(name = "memvault", version, about = "Store and search agent memories")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a memory with optional tags and importance
    Store {
        /// The content to store
        content: String,

        /// Comma-separated tags for categorizing the memory
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Importance score (0.0-1.0)
        #[arg(long, default_value = "0.5")]
        importance: f32,

        /// Free-form type label
        #[arg(long, default_value = "note")]
        memory_type: String,
    },

    /// Search memories by semantic similarity
    Search {
        /// Search query
        query: String,

        /// Maximum number of results (1-100)
        #[arg(long, default_value = "10")]
        limit: u64,

        /// Minimum similarity score (0.0-1.0)
        #[arg(long, default_value = "0.3")]
        threshold: f32,
    },

    /// Find memories by tag
    Tag {
        /// Tag to search for
        tag: String,

        /// Maximum number of results (1-100)
        #[arg(long, default_value = "10")]
        limit: u64,
    },

    /// Show storage statistics across all backends
    Stats,

    /// Delete a memory by id
    Delete {
        /// Content hash of the memory to delete
        memory_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("memvault_core=info".parse()?)
                .add_directive("memvault=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = VaultConfig::from_env()?;
    let vault = Arc::new(MemoryVault::connect(&config).await?);
    let handler = ToolHandler::new(vault);

    info!("Memory vault ready");

    let response = match cli.command {
        Commands::Store {
            content,
            tags,
            importance,
            memory_type,
        } => {
            handler
                .store_memory(json!({
                    "content": content,
                    "tags": tags,
                    "importance": importance,
                    "memory_type": memory_type,
                }))
                .await
        }
        Commands::Search {
            query,
            limit,
            threshold,
        } => {
            handler
                .search_memories(json!({
                    "query": query,
                    "limit": limit,
                    "similarity_threshold": threshold,
                }))
                .await
        }
        Commands::Tag { tag, limit } => {
            handler
                .search_by_tag(json!({"tag": tag, "limit": limit}))
                .await
        }
        Commands::Stats => handler.get_memory_stats(json!({})).await,
        Commands::Delete { memory_id } => {
            handler.delete_memory(json!({"memory_id": memory_id})).await
        }
    };

    println!("{}", serde_json::to_string_pretty(&response)?);

    // Tool responses carry failures as structured data; reflect them in the
    // exit code for shell callers.
    if response["success"] == false {
        std::process::exit(1);
    }
    Ok(())
}

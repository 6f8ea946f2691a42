//! ============================================================================
//! Blob Store - S3-compatible object storage for oversized payloads
//! ============================================================================
//! Content-addressed: objects are keyed by the memory's content hash, so a
//! key either holds exactly the expected bytes or nothing. The offload size
//! threshold is owned by the orchestrator, not this client.
//! ============================================================================

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use crate::backend::BlobStore;
use crate::error::MemoryError;
use crate::types::BlobStats;

/// Blob store backed by an S3-compatible endpoint (e.g. Cloudflare R2)
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    /// Build a client for the given endpoint and bucket.
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, MemoryError> {
        debug!("Connecting blob store at {} (bucket {})", endpoint, bucket);

        let credentials = Credentials::new(access_key, secret_key, None, None, "memvault");
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .region(Region::new("auto"))
            .credentials_provider(credentials)
            .load()
            .await;

        Ok(Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket: bucket.to_string(),
        })
    }

    async fn key_exists(&self, key: &str) -> Result<bool, MemoryError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(MemoryError::backend("blob", service_err))
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), MemoryError> {
        // Content-addressed keys: an existing object already holds these
        // exact bytes, so re-putting is a no-op.
        if self.key_exists(key).await? {
            debug!("Blob {} already present, skipping put", key);
            return Ok(());
        }

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| MemoryError::backend("blob", e.into_service_error()))?;

        debug!("Stored blob {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, MemoryError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    MemoryError::NotFound(format!("blob {}", key))
                } else {
                    MemoryError::backend("blob", service_err)
                }
            })?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| MemoryError::backend("blob", e))?
            .into_bytes()
            .to_vec();

        debug!("Fetched blob {} ({} bytes)", key, bytes.len());
        Ok(bytes)
    }

    async fn delete(&self, key: &str) -> Result<(), MemoryError> {
        // S3 delete is idempotent; deleting a missing key succeeds
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| MemoryError::backend("blob", e.into_service_error()))?;

        debug!("Deleted blob {}", key);
        Ok(())
    }

    async fn stats(&self) -> Result<BlobStats, MemoryError> {
        // One listing page is enough for stats reporting; the count is a
        // lower bound on very large buckets.
        let listing = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| MemoryError::backend("blob", e.into_service_error()))?;

        Ok(BlobStats {
            bucket: self.bucket.clone(),
            object_count: listing.key_count().unwrap_or(0) as u64,
        })
    }
}

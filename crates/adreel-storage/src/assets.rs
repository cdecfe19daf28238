//! Asset store: the pipeline's view of object storage.
//!
//! Generated videos live under a `{folder}/{id}` namespace. Uploading
//! returns the stable public identifiers the job record carries; download
//! access goes through presigned URLs with a bounded TTL.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::StorageClient;
use crate::error::{StorageError, StorageResult};

/// Namespace for a stored asset, typically `{user_id}/{job_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPath {
    pub folder: String,
    pub id: String,
}

impl AssetPath {
    pub fn new(folder: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            id: id.into(),
        }
    }

    /// Object key for the video itself.
    pub fn video_key(&self) -> String {
        format!("{}/{}/video.mp4", self.folder, self.id)
    }
}

/// Identifiers of a stored asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAsset {
    /// Object storage identifier (the video's object key)
    pub public_id: String,
    /// Stable HTTPS URL of the stored video
    pub secure_url: String,
    /// Thumbnail URL (rendered on delivery from the video object)
    pub thumbnail_url: String,
}

/// Durable storage for generated assets.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Upload video bytes, returning the stored identifiers.
    async fn upload(&self, bytes: Vec<u8>, path: &AssetPath) -> StorageResult<StoredAsset>;

    /// Mint a presigned download URL for a stored asset.
    async fn signed_url(&self, public_id: &str, ttl: Duration) -> StorageResult<String>;
}

/// `AssetStore` over Cloudflare R2.
#[derive(Clone)]
pub struct R2AssetStore {
    client: StorageClient,
}

impl R2AssetStore {
    pub fn new(client: StorageClient) -> Self {
        Self { client }
    }

    /// Thumbnail delivery URL for a video key, using Cloudflare media
    /// transformations to render a frame on request.
    fn thumbnail_url(&self, key: &str) -> String {
        let base = self.client.public_url(key);
        match base.split_once("://") {
            Some((scheme, rest)) => match rest.split_once('/') {
                Some((host, path)) => {
                    format!("{scheme}://{host}/cdn-cgi/media/mode=frame,time=1s/{path}")
                }
                None => base,
            },
            None => base,
        }
    }
}

#[async_trait]
impl AssetStore for R2AssetStore {
    async fn upload(&self, bytes: Vec<u8>, path: &AssetPath) -> StorageResult<StoredAsset> {
        if path.folder.is_empty() || path.id.is_empty() {
            return Err(StorageError::InvalidKey(
                "asset path folder and id must be non-empty".into(),
            ));
        }

        let key = path.video_key();
        let size = bytes.len();
        self.client.upload_bytes(bytes, &key, "video/mp4").await?;

        info!(key = %key, bytes = size, "Stored generated video");

        Ok(StoredAsset {
            public_id: key.clone(),
            secure_url: self.client.public_url(&key),
            thumbnail_url: self.thumbnail_url(&key),
        })
    }

    async fn signed_url(&self, public_id: &str, ttl: Duration) -> StorageResult<String> {
        self.client.presign_get(public_id, ttl).await
    }
}

//! Durable asset storage for generated videos.
//!
//! This crate provides:
//! - An S3-compatible client configured for Cloudflare R2
//! - The `AssetStore` trait the pipeline is written against: upload bytes
//!   into a `{folder}/{id}` namespace and mint presigned download URLs

pub mod assets;
pub mod client;
pub mod error;

pub use assets::{AssetPath, AssetStore, R2AssetStore, StoredAsset};
pub use client::{StorageClient, StorageConfig};
pub use error::{StorageError, StorageResult};

pub mod http;
pub mod memory;

use async_trait::async_trait;
use axum::body::Bytes;
use thiserror::Error;
use uuid::Uuid;

pub use http::HttpObjectStore;
pub use memory::MemoryObjectStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("Object store returned {0}")]
    Status(u16),

    #[error("Invalid signing key")]
    Signing,
}

/// File storage collaborator; objects are keyed by their file record id
#[async_trait]
pub trait AssetStorage: Send + Sync {
    async fn put(&self, id: Uuid, bytes: Bytes, mime_type: &str) -> Result<(), StorageError>;

    /// Time-limited URL a client can GET the object from
    fn download_url(&self, id: Uuid) -> Result<String, StorageError>;

    async fn fetch(&self, id: Uuid) -> Result<Bytes, StorageError>;
}

use std::collections::HashMap;

use async_trait::async_trait;
use axum::body::Bytes;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AssetStorage, StorageError};

/// Keeps objects in process. Download URLs point back at our own
/// download route, which reads the bytes through `fetch`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<Uuid, (Bytes, String)>>,
    refuse_writes: RwLock<bool>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail as if the bucket were unreachable
    pub async fn set_refuse_writes(&self, refuse: bool) {
        *self.refuse_writes.write().await = refuse;
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn mime_type(&self, id: Uuid) -> Option<String> {
        self.objects.read().await.get(&id).map(|(_, mime)| mime.clone())
    }
}

#[async_trait]
impl AssetStorage for MemoryObjectStore {
    async fn put(&self, id: Uuid, bytes: Bytes, mime_type: &str) -> Result<(), StorageError> {
        if *self.refuse_writes.read().await {
            return Err(StorageError::Status(503));
        }
        self.objects
            .write()
            .await
            .insert(id, (bytes, mime_type.to_string()));
        Ok(())
    }

    fn download_url(&self, id: Uuid) -> Result<String, StorageError> {
        Ok(format!("/api/assets/download/{}", id))
    }

    async fn fetch(&self, id: Uuid) -> Result<Bytes, StorageError> {
        self.objects
            .read()
            .await
            .get(&id)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }
}

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use reqwest::{header::CONTENT_TYPE, StatusCode};
use sha2::Sha256;
use uuid::Uuid;

use super::{AssetStorage, StorageError};
use crate::config::StorageConfig;

type HmacSha256 = Hmac<Sha256>;

/// Bucket-style object store addressed as `{base_url}/{bucket}/{id}`.
///
/// Requests carry `expires` and `signature` query parameters, where the
/// signature is HMAC-SHA256 over `"{METHOD}\n/{bucket}/{id}\n{expires}"`.
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    secret: Vec<u8>,
    url_expiry: Duration,
}

impl HttpObjectStore {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        secret: &str,
        config: &StorageConfig,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            secret: secret.as_bytes().to_vec(),
            url_expiry: Duration::days(config.url_expiry_days),
        }
    }

    fn object_path(&self, id: Uuid) -> String {
        format!("/{}/{}", self.bucket, id)
    }

    fn signature(&self, method: &str, path: &str, expires: i64) -> Result<String, StorageError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| StorageError::Signing)?;
        mac.update(format!("{}\n{}\n{}", method, path, expires).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_url(
        &self,
        method: &str,
        id: Uuid,
        lifetime: Duration,
    ) -> Result<String, StorageError> {
        let path = self.object_path(id);
        let expires = (Utc::now() + lifetime).timestamp();
        let signature = self.signature(method, &path, expires)?;
        Ok(format!(
            "{}{}?expires={}&signature={}",
            self.base_url, path, expires, signature
        ))
    }
}

#[async_trait]
impl AssetStorage for HttpObjectStore {
    async fn put(&self, id: Uuid, bytes: Bytes, mime_type: &str) -> Result<(), StorageError> {
        let url = self.signed_url("PUT", id, Duration::minutes(5))?;
        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    fn download_url(&self, id: Uuid) -> Result<String, StorageError> {
        self.signed_url("GET", id, self.url_expiry)
    }

    async fn fetch(&self, id: Uuid) -> Result<Bytes, StorageError> {
        let url = self.signed_url("GET", id, Duration::minutes(5))?;
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(id.to_string())),
            status if !status.is_success() => Err(StorageError::Status(status.as_u16())),
            _ => Ok(response.bytes().await?),
        }
    }
}

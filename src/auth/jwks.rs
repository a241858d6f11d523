use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::{AuthError, Identity, ProviderError, TokenVerifier};
use crate::config::AuthConfig;

/// Where signing keys come from
#[async_trait]
pub trait JwksSource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, ProviderError>;
}

/// Fetches the provider's published key set over HTTP
pub struct HttpJwksSource {
    client: reqwest::Client,
    url: String,
}

impl HttpJwksSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl JwksSource for HttpJwksSource {
    async fn fetch(&self) -> Result<JwkSet, ProviderError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<JwkSet>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[derive(Clone)]
struct Snapshot {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

/// Process-scoped cache of the provider's key set.
///
/// Readers share an immutable snapshot. When the snapshot is older than the TTL
/// one caller refills it while holding `refill`; everyone queued behind that
/// lock re-checks freshness first, so a burst of cold misses costs one fetch.
/// A failed refill falls back to the stale snapshot when there is one.
pub struct JwksCache {
    source: Arc<dyn JwksSource>,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
    refill: Mutex<()>,
}

impl JwksCache {
    pub fn new(source: Arc<dyn JwksSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            snapshot: RwLock::new(None),
            refill: Mutex::new(()),
        }
    }

    async fn fresh(&self) -> Option<Arc<JwkSet>> {
        let snapshot = self.snapshot.read().await;
        snapshot
            .as_ref()
            .filter(|s| s.fetched_at.elapsed() < self.ttl)
            .map(|s| s.keys.clone())
    }

    pub async fn get(&self) -> Result<Arc<JwkSet>, ProviderError> {
        if let Some(keys) = self.fresh().await {
            return Ok(keys);
        }

        let _guard = self.refill.lock().await;
        if let Some(keys) = self.fresh().await {
            return Ok(keys);
        }

        match self.source.fetch().await {
            Ok(set) => {
                let keys = Arc::new(set);
                tracing::info!("Refreshed JWKS ({} keys)", keys.keys.len());
                *self.snapshot.write().await = Some(Snapshot {
                    keys: keys.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(keys)
            }
            Err(e) => {
                let stale = self.snapshot.read().await.as_ref().map(|s| s.keys.clone());
                match stale {
                    Some(keys) => {
                        tracing::warn!("JWKS refresh failed, serving stale keys: {}", e);
                        Ok(keys)
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Drop the snapshot so the next `get` fetches
    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
    }
}

/// Verifies OIDC access tokens locally: RS256 signature by the key named in
/// the token's `kid`, audience equal to our client id.
pub struct JwksVerifier {
    cache: Arc<JwksCache>,
    audience: String,
    leeway_secs: u64,
}

impl JwksVerifier {
    pub fn new(cache: Arc<JwksCache>, config: &AuthConfig) -> Self {
        Self {
            cache,
            audience: config.oidc.client_id.clone(),
            leeway_secs: config.clock_skew_secs,
        }
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn decode(&self, token: &str) -> Result<Identity, AuthError> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::Malformed("token header has no kid".into()))?;

        let keys = self.cache.get().await?;
        let jwk = keys.find(&kid).ok_or(AuthError::UnknownKey(kid))?;
        let key = DecodingKey::from_jwk(jwk)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.audience]);
        validation.leeway = self.leeway_secs;

        let data = decode::<Map<String, Value>>(token, &key, &validation)?;
        Ok(Identity::from_claims(data.claims))
    }
}

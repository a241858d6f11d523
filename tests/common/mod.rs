#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map};

use community_api::auth::{
    AuthError, Identity, OidcProvider, ProviderError, TokenSet, TokenVerifier,
};
use community_api::config::AppConfig;
use community_api::database::MemoryStore;
use community_api::storage::MemoryObjectStore;
use community_api::{build_router, AppState};

pub const ADA_TOKEN: &str = "token-ada";
pub const GRACE_TOKEN: &str = "token-grace";
pub const ALLOWED_REDIRECT: &str = "http://localhost:5173/auth/callback";

/// Accepts a fixed set of opaque tokens and counts every lookup
#[derive(Default)]
pub struct StaticTokens {
    pub decodes: AtomicUsize,
}

#[async_trait]
impl TokenVerifier for StaticTokens {
    async fn decode(&self, token: &str) -> Result<Identity, AuthError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        let email = match token {
            ADA_TOKEN => "ada@example.com",
            GRACE_TOKEN => "grace@example.com",
            _ => return Err(AuthError::Inactive),
        };
        let mut claims = Map::new();
        claims.insert("sub".into(), json!(format!("sub-{}", email)));
        claims.insert("email".into(), json!(email));
        Ok(Identity::from_claims(claims))
    }
}

/// Token endpoint stand-in that counts every grant
pub struct FakeProvider {
    pub exchanges: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub refresh_expires_in: Option<u64>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::with_refresh_lifetime(Some(1800))
    }
}

impl FakeProvider {
    pub fn with_refresh_lifetime(refresh_expires_in: Option<u64>) -> Self {
        Self {
            exchanges: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            refresh_expires_in,
        }
    }

    fn tokens(&self, generation: usize) -> TokenSet {
        TokenSet {
            access_token: format!("access-{}", generation),
            expires_in: 300,
            refresh_token: Some(format!("refresh-{}", generation)),
            refresh_expires_in: self.refresh_expires_in,
            token_type: "Bearer".into(),
        }
    }
}

#[async_trait]
impl OidcProvider for FakeProvider {
    async fn exchange_code(
        &self,
        code: &str,
        _code_verifier: &str,
        _redirect_uri: &str,
    ) -> Result<TokenSet, ProviderError> {
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst);
        if code == "bad-code" {
            return Err(ProviderError::Status {
                status: 400,
                body: "invalid_grant".into(),
            });
        }
        Ok(self.tokens(n))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst);
        if !refresh_token.starts_with("refresh-") {
            return Err(ProviderError::Status {
                status: 400,
                body: "invalid_grant".into(),
            });
        }
        Ok(self.tokens(100 + n))
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.api.debug = false;
    config.auth.oidc.allowed_redirects = vec![ALLOWED_REDIRECT.to_string()];
    config.auth.oidc.base_domain = "example.com".to_string();
    config.security.cookie_secure = true;
    config
}

/// A running server on a free local port, backed by in-memory collaborators
pub struct TestApp {
    pub base_url: String,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryObjectStore>,
    pub oidc: Arc<FakeProvider>,
    pub verifier: Arc<StaticTokens>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub async fn spawn_app() -> Result<TestApp> {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: AppConfig) -> Result<TestApp> {
    spawn_app_with_provider(config, FakeProvider::default()).await
}

pub async fn spawn_app_with_provider(config: AppConfig, provider: FakeProvider) -> Result<TestApp> {
    let store = Arc::new(MemoryStore::new());
    store.seed_demo().await;
    let storage = Arc::new(MemoryObjectStore::new());
    let oidc = Arc::new(provider);
    let verifier = Arc::new(StaticTokens::default());

    let state = AppState::new(config, store.clone(), storage.clone(), verifier.clone())?
        .with_oidc(oidc.clone());
    let app = build_router(state)?;

    // Pick an unused port for isolation
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tokio::spawn(async move {
        let _ =
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await;
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(10))
        .build()?;

    Ok(TestApp {
        base_url: format!("http://{}", addr),
        store,
        storage,
        oidc,
        verifier,
        client,
    })
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

pub mod introspect;
pub mod jwks;
pub mod oidc;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{AuthConfig, AuthStrategy};

pub use introspect::IntrospectionVerifier;
pub use jwks::{HttpJwksSource, JwksCache, JwksSource, JwksVerifier};
pub use oidc::{HttpOidcProvider, OidcProvider, TokenSet};

/// Who the caller is, as far as the bearer credential could tell us
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub subject: Option<String>,
    pub email: Option<String>,
    pub claims: Map<String, Value>,
}

impl Identity {
    pub fn from_claims(claims: Map<String, Value>) -> Self {
        let text = |key: &str| claims.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            subject: text("sub"),
            email: text("email"),
            claims,
        }
    }
}

/// Per-request auth context. Created fresh for every request and never stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthContext {
    pub verified: bool,
    pub identity: Option<Identity>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn verified(identity: Identity) -> Self {
        Self {
            verified: true,
            identity: Some(identity),
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.identity.as_ref()?.email.as_deref()
    }
}

/// Failures reaching or understanding an identity provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Reasons a bearer credential is rejected. Never shown to clients.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token is not active")]
    Inactive,

    #[error("token expired or not yet valid")]
    OutsideValidity,

    #[error("token carries no email claim")]
    MissingEmail,

    #[error("no signing key with kid '{0}'")]
    UnknownKey(String),

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Strip an optional scheme label: `"Bearer abc"` and `"abc"` both give `"abc"`.
pub fn bearer_token(header: &str) -> Option<&str> {
    header.split_whitespace().last()
}

/// Turns a bearer credential into an identity.
///
/// Implementors only provide [`TokenVerifier::decode`]. [`TokenVerifier::verify`]
/// is what request handling calls, and it never fails: anything that goes wrong
/// leaves the caller anonymous.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn decode(&self, token: &str) -> Result<Identity, AuthError>;

    async fn verify(&self, authorization: Option<&str>) -> AuthContext {
        let Some(token) = authorization.and_then(bearer_token) else {
            return AuthContext::anonymous();
        };

        match self.decode(token).await {
            Ok(identity) => AuthContext::verified(identity),
            Err(e) => {
                tracing::debug!("Bearer credential rejected: {}", e);
                AuthContext::anonymous()
            }
        }
    }
}

pub(crate) fn provider_client(config: &AuthConfig) -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.provider_timeout_secs))
        .build()?)
}

/// Build the verifier for the configured strategy
pub fn build_verifier(config: &AuthConfig) -> Result<Arc<dyn TokenVerifier>, ProviderError> {
    let client = provider_client(config)?;
    let verifier: Arc<dyn TokenVerifier> = match config.strategy {
        AuthStrategy::Introspection => Arc::new(IntrospectionVerifier::new(client, config)?),
        AuthStrategy::Oidc => {
            let source = Arc::new(HttpJwksSource::new(client, config.oidc.certs_url()));
            let cache = Arc::new(JwksCache::new(
                source,
                Duration::from_secs(config.oidc.jwks_ttl_secs),
            ));
            Arc::new(JwksVerifier::new(cache, config))
        }
    };

    tracing::info!("Token verification strategy: {:?}", config.strategy);
    Ok(verifier)
}

/// Token-endpoint client for the authorization-code routes; only the OIDC
/// strategy has one
pub fn build_oidc_provider(
    config: &AuthConfig,
) -> Result<Option<Arc<dyn OidcProvider>>, ProviderError> {
    match config.strategy {
        AuthStrategy::Oidc => {
            let provider = HttpOidcProvider::new(provider_client(config)?, &config.oidc);
            Ok(Some(Arc::new(provider)))
        }
        AuthStrategy::Introspection => Ok(None),
    }
}

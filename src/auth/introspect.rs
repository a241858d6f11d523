use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};

use super::{AuthError, Identity, ProviderError, TokenVerifier};
use crate::config::AuthConfig;

/// Verifies opaque federated-identity tokens against an introspection endpoint
/// (RFC 7662 style). A token counts only when it is active, carries an email,
/// and its `exp`/`iat` fall inside the allowed clock skew.
pub struct IntrospectionVerifier {
    client: reqwest::Client,
    endpoint: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    clock_skew_secs: i64,
}

impl IntrospectionVerifier {
    pub fn new(client: reqwest::Client, config: &AuthConfig) -> Result<Self, ProviderError> {
        let endpoint = config
            .introspection_url
            .clone()
            .ok_or_else(|| ProviderError::Malformed("introspection url not configured".into()))?;

        Ok(Self {
            client,
            endpoint,
            client_id: config.introspection_client_id.clone(),
            client_secret: config.introspection_client_secret.clone(),
            clock_skew_secs: config.clock_skew_secs as i64,
        })
    }

    async fn introspect(&self, token: &str) -> Result<Map<String, Value>, ProviderError> {
        let mut request = self.client.post(&self.endpoint).form(&[("token", token)]);
        if let Some(client_id) = &self.client_id {
            request = request.basic_auth(client_id, self.client_secret.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        match response.json::<Value>().await? {
            Value::Object(claims) => Ok(claims),
            other => Err(ProviderError::Malformed(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    fn check_validity(&self, claims: &Map<String, Value>) -> Result<(), AuthError> {
        let now = Utc::now().timestamp();
        let skew = self.clock_skew_secs;

        if let Some(exp) = claims.get("exp").and_then(Value::as_i64) {
            if exp + skew < now {
                return Err(AuthError::OutsideValidity);
            }
        }
        if let Some(iat) = claims.get("iat").and_then(Value::as_i64) {
            if iat - skew > now {
                return Err(AuthError::OutsideValidity);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TokenVerifier for IntrospectionVerifier {
    async fn decode(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self.introspect(token).await?;

        if claims.get("active").and_then(Value::as_bool) != Some(true) {
            return Err(AuthError::Inactive);
        }
        self.check_validity(&claims)?;

        let identity = Identity::from_claims(claims);
        if identity.email.as_deref().map_or(true, str::is_empty) {
            return Err(AuthError::MissingEmail);
        }
        Ok(identity)
    }
}

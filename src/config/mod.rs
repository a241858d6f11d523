use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub bind_addr: String,
    /// Include handler failure detail in 500 responses
    pub debug: bool,
    /// Honour X-Forwarded-For / X-Real-IP when keying rate limits
    pub trust_forwarded_for: bool,
    pub enable_rate_limiting: bool,
    pub rate_limits: RateLimitConfig,
}

/// Per-route-group admission policies, written as `"<n>/<unit>;<n>/<unit>"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub page: String,
    pub auth: String,
    pub upload: String,
    pub download: String,
    pub items_secure: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthStrategy {
    /// Opaque federated-identity tokens checked against an introspection endpoint
    Introspection,
    /// OIDC access tokens verified locally against the provider's JWKS
    Oidc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub strategy: AuthStrategy,
    pub clock_skew_secs: u64,
    pub provider_timeout_secs: u64,
    pub introspection_url: Option<String>,
    pub introspection_client_id: Option<String>,
    pub introspection_client_secret: Option<String>,
    pub oidc: OidcConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    pub base_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub allowed_redirects: Vec<String>,
    /// Domain attribute of the refresh-token cookie
    pub base_domain: String,
    pub jwks_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Unset means the in-memory store is used
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Unset means the in-memory object store is used
    pub base_url: Option<String>,
    pub bucket: String,
    pub signing_secret: Option<String>,
    pub url_expiry_days: i64,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    /// Set the Secure attribute on the refresh-token cookie
    pub cookie_secure: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid rate limit policy for {group}: {policy}")]
    InvalidRateLimit { group: &'static str, policy: String },
}

impl OidcConfig {
    fn realm_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.realm)
    }

    pub fn certs_url(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.realm_url())
    }

    pub fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.realm_url())
    }

    pub fn is_allowed_redirect(&self, redirect_uri: &str) -> bool {
        self.allowed_redirects.iter().any(|allowed| allowed == redirect_uri)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key/value source (the process environment in production)
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse_into<T: std::str::FromStr>(value: Option<String>, target: &mut T) {
            if let Some(parsed) = value.and_then(|v| v.trim().parse().ok()) {
                *target = parsed;
            }
        }

        fn list(value: &str) -> Vec<String> {
            value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }

        // API overrides
        if let Some(v) = lookup("BIND_ADDR") {
            self.api.bind_addr = v;
        }
        parse_into(lookup("DEBUG"), &mut self.api.debug);
        parse_into(lookup("TRUST_FORWARDED_FOR"), &mut self.api.trust_forwarded_for);
        parse_into(lookup("API_ENABLE_RATE_LIMITING"), &mut self.api.enable_rate_limiting);
        if let Some(v) = lookup("RATE_LIMIT_PAGE") {
            self.api.rate_limits.page = v;
        }
        if let Some(v) = lookup("RATE_LIMIT_AUTH") {
            self.api.rate_limits.auth = v;
        }
        if let Some(v) = lookup("RATE_LIMIT_UPLOAD") {
            self.api.rate_limits.upload = v;
        }
        if let Some(v) = lookup("RATE_LIMIT_DOWNLOAD") {
            self.api.rate_limits.download = v;
        }
        if let Some(v) = lookup("RATE_LIMIT_ITEMS_SECURE") {
            self.api.rate_limits.items_secure = v;
        }

        // Auth overrides
        match lookup("AUTH_STRATEGY").as_deref().map(str::trim) {
            Some("oidc") | Some("keycloak") => self.auth.strategy = AuthStrategy::Oidc,
            Some("introspection") | Some("firebase") => {
                self.auth.strategy = AuthStrategy::Introspection
            }
            _ => {}
        }
        parse_into(lookup("AUTH_CLOCK_SKEW_SECS"), &mut self.auth.clock_skew_secs);
        parse_into(lookup("AUTH_PROVIDER_TIMEOUT_SECS"), &mut self.auth.provider_timeout_secs);
        if let Some(v) = lookup("AUTH_INTROSPECTION_URL") {
            self.auth.introspection_url = Some(v);
        }
        if let Some(v) = lookup("AUTH_INTROSPECTION_CLIENT_ID") {
            self.auth.introspection_client_id = Some(v);
        }
        if let Some(v) = lookup("AUTH_INTROSPECTION_CLIENT_SECRET") {
            self.auth.introspection_client_secret = Some(v);
        }
        if let Some(v) = lookup("KEYCLOAK_BASE_URL") {
            self.auth.oidc.base_url = v;
        }
        if let Some(v) = lookup("KEYCLOAK_REALM") {
            self.auth.oidc.realm = v;
        }
        if let Some(v) = lookup("KEYCLOAK_CLIENT_ID") {
            self.auth.oidc.client_id = v;
        }
        if let Some(v) = lookup("KEYCLOAK_CLIENT_SECRET") {
            self.auth.oidc.client_secret = Some(v);
        }
        if let Some(v) = lookup("KEYCLOAK_ALLOWED_REDIRECTS") {
            self.auth.oidc.allowed_redirects = list(&v);
        }
        if let Some(v) = lookup("AUTH_BASE_DOMAIN") {
            self.auth.oidc.base_domain = v;
        }
        parse_into(lookup("JWKS_CACHE_TTL_SECS"), &mut self.auth.oidc.jwks_ttl_secs);

        // Database overrides
        if let Some(v) = lookup("DATABASE_URL") {
            self.database.url = Some(v);
        }
        parse_into(lookup("DATABASE_MAX_CONNECTIONS"), &mut self.database.max_connections);
        parse_into(lookup("DATABASE_CONNECTION_TIMEOUT"), &mut self.database.connection_timeout);

        // Storage overrides
        if let Some(v) = lookup("STORAGE_BASE_URL") {
            self.storage.base_url = Some(v);
        }
        if let Some(v) = lookup("STORAGE_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = lookup("STORAGE_SIGNING_SECRET") {
            self.storage.signing_secret = Some(v);
        }
        parse_into(lookup("STORAGE_URL_EXPIRY_DAYS"), &mut self.storage.url_expiry_days);
        parse_into(lookup("STORAGE_MAX_UPLOAD_BYTES"), &mut self.storage.max_upload_bytes);

        // Security overrides
        parse_into(lookup("SECURITY_ENABLE_CORS"), &mut self.security.enable_cors);
        if let Some(v) = lookup("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = list(&v);
        }
        parse_into(lookup("SECURITY_COOKIE_SECURE"), &mut self.security.cookie_secure);

        self
    }

    /// Check that the selected auth strategy and collaborators have what they need
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.auth.strategy {
            AuthStrategy::Introspection => {
                if self.auth.introspection_url.is_none() {
                    return Err(ConfigError::Missing("AUTH_INTROSPECTION_URL"));
                }
            }
            AuthStrategy::Oidc => {
                if self.auth.oidc.base_url.is_empty() {
                    return Err(ConfigError::Missing("KEYCLOAK_BASE_URL"));
                }
                if self.auth.oidc.realm.is_empty() {
                    return Err(ConfigError::Missing("KEYCLOAK_REALM"));
                }
                if self.auth.oidc.client_id.is_empty() {
                    return Err(ConfigError::Missing("KEYCLOAK_CLIENT_ID"));
                }
            }
        }

        if self.storage.base_url.is_some() && self.storage.signing_secret.is_none() {
            return Err(ConfigError::Missing("STORAGE_SIGNING_SECRET"));
        }

        let limits = &self.api.rate_limits;
        for (group, policy) in [
            ("page", &limits.page),
            ("auth", &limits.auth),
            ("upload", &limits.upload),
            ("download", &limits.download),
            ("items_secure", &limits.items_secure),
        ] {
            if crate::middleware::rate_limit::RateLimitPolicy::parse(policy).is_err() {
                return Err(ConfigError::InvalidRateLimit {
                    group,
                    policy: policy.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    fn rate_limits() -> RateLimitConfig {
        RateLimitConfig {
            page: "300/minute;15/second".to_string(),
            auth: "120/minute;5/second".to_string(),
            upload: "15/minute;5/second".to_string(),
            download: "150/minute;150/second".to_string(),
            items_secure: "60/minute".to_string(),
        }
    }

    fn auth_defaults() -> AuthConfig {
        AuthConfig {
            strategy: AuthStrategy::Introspection,
            clock_skew_secs: 10,
            provider_timeout_secs: 10,
            introspection_url: None,
            introspection_client_id: None,
            introspection_client_secret: None,
            oidc: OidcConfig {
                base_url: String::new(),
                realm: String::new(),
                client_id: String::new(),
                client_secret: None,
                allowed_redirects: Vec::new(),
                base_domain: String::new(),
                jwks_ttl_secs: 3600,
            },
        }
    }

    fn storage_defaults() -> StorageConfig {
        StorageConfig {
            base_url: None,
            bucket: "assets".to_string(),
            signing_secret: None,
            url_expiry_days: 60,
            max_upload_bytes: 10 * 1024 * 1024, // 10MB
        }
    }

    pub fn development() -> Self {
        let mut auth = Self::auth_defaults();
        auth.oidc.allowed_redirects = vec!["http://localhost:5173/auth/callback".to_string()];
        auth.oidc.base_domain = "localhost".to_string();

        Self {
            environment: Environment::Development,
            api: ApiConfig {
                bind_addr: "127.0.0.1:5000".to_string(),
                debug: true,
                trust_forwarded_for: false,
                enable_rate_limiting: true,
                rate_limits: Self::rate_limits(),
            },
            auth,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            storage: Self::storage_defaults(),
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
                cookie_secure: false,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                bind_addr: "0.0.0.0:5000".to_string(),
                debug: false,
                trust_forwarded_for: true,
                enable_rate_limiting: true,
                rate_limits: Self::rate_limits(),
            },
            auth: Self::auth_defaults(),
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            storage: Self::storage_defaults(),
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                cookie_secure: true,
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                bind_addr: "0.0.0.0:5000".to_string(),
                debug: false,
                trust_forwarded_for: true,
                enable_rate_limiting: true,
                rate_limits: Self::rate_limits(),
            },
            auth: Self::auth_defaults(),
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            storage: Self::storage_defaults(),
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
                cookie_secure: true,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

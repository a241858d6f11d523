// Application state and router assembly

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, Uri},
    middleware,
    routing::{get, post, MethodRouter},
    Router,
};
use thiserror::Error;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::api::{Envelope, ResponseTriple};
use crate::auth::{OidcProvider, TokenVerifier};
use crate::config::{AppConfig, SecurityConfig};
use crate::database::Store;
use crate::handlers::{account, assets, health, items, oidc, page};
use crate::middleware::rate_limit::{
    enforce_rate_limit, RateLimitParseError, RateLimitPolicy, RateLimiter, RouteLimit,
};
use crate::middleware::resolve_identity;
use crate::page::{Dispatcher, Registry, RegistryError};
use crate::storage::AssetStorage;

/// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid rate limit policy for {group}: {source}")]
    RateLimit {
        group: &'static str,
        #[source]
        source: RateLimitParseError,
    },
}

/// Everything a handler can reach. Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub envelope: Envelope,
    pub dispatcher: Dispatcher,
    pub store: Arc<dyn Store>,
    pub storage: Arc<dyn AssetStorage>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub oidc: Option<Arc<dyn OidcProvider>>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// State over the built-in page registry
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        storage: Arc<dyn AssetStorage>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Result<Self, AppError> {
        let envelope = Envelope::new(config.api.debug);
        let registry = Arc::new(Registry::builtin()?);

        Ok(Self {
            config: Arc::new(config),
            envelope,
            dispatcher: Dispatcher::new(registry, store.clone(), envelope),
            store,
            storage,
            verifier,
            oidc: None,
            limiter: Arc::new(RateLimiter::new()),
        })
    }

    /// Mounts the authorization-code routes backed by `provider`
    pub fn with_oidc(mut self, provider: Arc<dyn OidcProvider>) -> Self {
        self.oidc = Some(provider);
        self
    }
}

struct RatePolicies {
    page: Arc<RateLimitPolicy>,
    auth: Arc<RateLimitPolicy>,
    upload: Arc<RateLimitPolicy>,
    download: Arc<RateLimitPolicy>,
    items_secure: Arc<RateLimitPolicy>,
}

impl RatePolicies {
    fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let parse = |group: &'static str, policy: &str| {
            RateLimitPolicy::parse(policy)
                .map(Arc::new)
                .map_err(|source| AppError::RateLimit { group, source })
        };

        let limits = &config.api.rate_limits;
        Ok(Self {
            page: parse("page", &limits.page)?,
            auth: parse("auth", &limits.auth)?,
            upload: parse("upload", &limits.upload)?,
            download: parse("download", &limits.download)?,
            items_secure: parse("items_secure", &limits.items_secure)?,
        })
    }
}

/// Wraps routes in per-route admission control, unless it is switched off,
/// and identity resolution behind it
struct Limits {
    state: AppState,
    policies: RatePolicies,
}

impl Limits {
    fn guard(
        &self,
        route: &'static str,
        policy: &Arc<RateLimitPolicy>,
        method_router: MethodRouter<AppState>,
    ) -> MethodRouter<AppState> {
        // route layers added later run first: admission, then identity
        let method_router = method_router.route_layer(middleware::from_fn_with_state(
            self.state.verifier.clone(),
            resolve_identity,
        ));
        if !self.state.config.api.enable_rate_limiting {
            return method_router;
        }

        let limit = RouteLimit {
            route,
            policy: policy.clone(),
            limiter: self.state.limiter.clone(),
            envelope: self.state.envelope,
            trust_forwarded_for: self.state.config.api.trust_forwarded_for,
        };
        method_router.route_layer(middleware::from_fn_with_state(limit, enforce_rate_limit))
    }
}

/// Full application router
pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let limits = Limits {
        policies: RatePolicies::from_config(&state.config)?,
        state: state.clone(),
    };

    let mut router = Router::new()
        .route("/health", get(health::health))
        .merge(page_routes(&limits))
        .merge(account_routes(&limits))
        .merge(asset_routes(&limits))
        .merge(item_routes(&limits));

    if state.oidc.is_some() {
        router = router.merge(oidc_routes(&limits));
    }

    tracing::info!(
        "Router ready (rate limiting {}, oidc routes {})",
        if state.config.api.enable_rate_limiting { "on" } else { "off" },
        if state.oidc.is_some() { "mounted" } else { "absent" },
    );

    let router = router
        .fallback(fallback)
        .layer(TraceLayer::new_for_http());

    let router = match cors_layer(&state.config.security) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    Ok(router.with_state(state))
}

fn page_routes(limits: &Limits) -> Router<AppState> {
    Router::new().route(
        "/api/page/:page/:component",
        limits.guard(
            "page",
            &limits.policies.page,
            get(page::page_read)
                .post(page::page_write)
                .put(page::page_write)
                .delete(page::page_write),
        ),
    )
}

fn account_routes(limits: &Limits) -> Router<AppState> {
    let policy = &limits.policies.auth;

    Router::new()
        .route("/api/auth/verify", limits.guard("auth_verify", policy, get(account::verify)))
        .route(
            "/api/auth/email/validate/:email",
            limits.guard("auth_email", policy, get(account::email_count)),
        )
        .route(
            "/api/auth/username/validate/:username",
            limits.guard("auth_username", policy, get(account::username_count)),
        )
        .route("/api/auth/signup", limits.guard("auth_signup", policy, post(account::signup)))
}

fn oidc_routes(limits: &Limits) -> Router<AppState> {
    let policy = &limits.policies.auth;

    Router::new()
        .route("/api/auth/callback", limits.guard("auth_callback", policy, post(oidc::callback)))
        .route("/api/auth/refresh", limits.guard("auth_refresh", policy, post(oidc::refresh)))
        .route("/api/auth/logout", limits.guard("auth_logout", policy, post(oidc::logout)))
        .route("/api/auth/me", limits.guard("auth_me", policy, get(oidc::me)))
}

fn asset_routes(limits: &Limits) -> Router<AppState> {
    let download = &limits.policies.download;
    let upload_limit = limits.state.config.storage.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route(
            "/api/assets/",
            limits.guard("assets_list", &limits.policies.auth, get(assets::list)),
        )
        .route(
            "/api/assets/upload/:name",
            limits
                .guard("assets_upload", &limits.policies.upload, post(assets::upload))
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/assets/download/:id",
            limits.guard("assets_download", download, get(assets::download)),
        )
        .route(
            "/api/assets/:id/:filename",
            limits.guard("assets_inline", download, get(assets::inline)),
        )
        .route("/api/assets/:id", limits.guard("assets_redirect", download, get(assets::redirect)))
}

fn item_routes(limits: &Limits) -> Router<AppState> {
    Router::new()
        .route("/api/items/", get(items::list))
        .route(
            "/api/items/secure",
            limits.guard("items_secure", &limits.policies.items_secure, get(items::secure_list)),
        )
}

async fn fallback(State(state): State<AppState>, uri: Uri) -> ResponseTriple {
    tracing::warn!("No route for {}", uri.path());
    state.envelope.not_found(uri.path())
}

fn cors_layer(security: &SecurityConfig) -> Option<CorsLayer> {
    if !security.enable_cors {
        return None;
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    let origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
    )
}

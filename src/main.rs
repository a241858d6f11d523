use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use community_api::auth::{build_oidc_provider, build_verifier};
use community_api::config::AppConfig;
use community_api::database::{MemoryStore, PgStore, Store};
use community_api::middleware::rate_limit::purge_task;
use community_api::storage::{AssetStorage, HttpObjectStore, MemoryObjectStore};
use community_api::{build_router, AppState};

/// How often idle rate-limit keys are dropped, and how long a key may idle
const PURGE_EVERY: Duration = Duration::from_secs(60);
const PURGE_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Parser)]
#[command(name = "community-api")]
#[command(about = "Community site backend: page handlers, profiles, posts and assets")]
#[command(version)]
struct Args {
    /// Address to listen on; overrides BIND_ADDR
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on, keeping the configured host
    #[arg(long, env = "PORT")]
    port: Option<u16>,
}

fn bind_addr(configured: &str, args: &Args) -> anyhow::Result<SocketAddr> {
    let raw = args.bind.as_deref().unwrap_or(configured);
    let mut addr: SocketAddr = raw
        .parse()
        .with_context(|| format!("invalid bind address '{}'", raw))?;
    if let Some(port) = args.port {
        addr.set_port(port);
    }
    Ok(addr)
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    match &config.database.url {
        Some(url) => {
            let store = PgStore::connect(url, &config.database)
                .await
                .context("failed to connect to the database")?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL is not set; serving seeded in-memory demo data");
            let store = MemoryStore::new();
            store.seed_demo().await;
            Ok(Arc::new(store))
        }
    }
}

fn open_storage(config: &AppConfig) -> anyhow::Result<Arc<dyn AssetStorage>> {
    let storage = &config.storage;
    match (&storage.base_url, &storage.signing_secret) {
        (Some(base_url), Some(secret)) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("failed to build the object store client")?;
            Ok(Arc::new(HttpObjectStore::new(client, base_url, secret, storage)))
        }
        _ => {
            tracing::warn!("STORAGE_BASE_URL is not set; assets are kept in memory");
            Ok(Arc::new(MemoryObjectStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, AUTH_STRATEGY, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Initialize configuration (this loads the config singleton)
    let config = community_api::config::config().clone();
    config.validate().context("invalid configuration")?;
    tracing::info!("Starting community API in {:?} mode", config.environment);

    let addr = bind_addr(&config.api.bind_addr, &args)?;
    let store = open_store(&config).await?;
    let storage = open_storage(&config)?;
    let verifier = build_verifier(&config.auth).context("failed to set up token verification")?;
    let oidc = build_oidc_provider(&config.auth).context("failed to set up the OIDC client")?;

    let mut state = AppState::new(config, store, storage, verifier)?;
    if let Some(provider) = oidc {
        state = state.with_oidc(provider);
    }

    tokio::spawn(purge_task(state.limiter.clone(), PURGE_EVERY, PURGE_IDLE));

    let app = build_router(state)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;

    Ok(())
}

// handlers/health.rs - GET /health

use axum::extract::State;
use serde_json::json;

use crate::api::ResponseTriple;
use crate::app::AppState;

pub async fn health(State(state): State<AppState>) -> ResponseTriple {
    match state.store.ping().await {
        Ok(()) => state.envelope.ok(&json!({"status": "ok"})),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            state.envelope.server_error("Database unavailable")
        }
    }
}

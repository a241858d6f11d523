// handlers/items.rs - /api/items

use axum::{extract::State, Extension};

use super::{require_verified, respond};
use crate::api::ResponseTriple;
use crate::app::AppState;
use crate::auth::AuthContext;
use crate::error::ApiError;

const ITEM_LIMIT: i64 = 10;

async fn first_items(state: &AppState) -> ResponseTriple {
    let result = state
        .store
        .list_items(ITEM_LIMIT)
        .await
        .map(|items| state.envelope.ok(&items))
        .map_err(ApiError::from);
    respond(state, result)
}

/// GET /api/items/
pub async fn list(State(state): State<AppState>) -> ResponseTriple {
    first_items(&state).await
}

/// GET /api/items/secure - same listing for verified callers only
pub async fn secure_list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ResponseTriple {
    if let Err(denied) = require_verified(&state, &auth) {
        return denied;
    }
    first_items(&state).await
}

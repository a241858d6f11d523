// handlers/mod.rs - HTTP route handlers
//
// Thin bindings between axum extractors and the Dispatcher, Store and
// AssetStorage collaborators. Every handler answers through the Envelope.

pub mod account;
pub mod assets;
pub mod health;
pub mod items;
pub mod oidc;
pub mod page;

use serde::de::DeserializeOwned;

use crate::api::ResponseTriple;
use crate::app::AppState;
use crate::auth::AuthContext;
use crate::error::ApiError;

/// Parse a JSON request body, answering 400 through the envelope on failure
/// instead of axum's plain-text rejection
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("malformed JSON body: {}", e)))
}

/// Email of a verified caller, or the token-auth-failed envelope
pub(crate) fn require_verified<'a>(
    state: &AppState,
    auth: &'a AuthContext,
) -> Result<&'a str, ResponseTriple> {
    match auth.email() {
        Some(email) if auth.verified => Ok(email),
        _ => Err(state.envelope.token_auth_failed()),
    }
}

/// Render a handler result with the application's envelope (debug aware)
pub(crate) fn respond(
    state: &AppState,
    result: Result<ResponseTriple, ApiError>,
) -> ResponseTriple {
    result.unwrap_or_else(|err| state.envelope.from_error(&err))
}

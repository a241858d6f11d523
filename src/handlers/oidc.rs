// handlers/oidc.rs - authorization-code flow with a refresh-token cookie
//
// POST /api/auth/callback   exchange code, set cookie
// POST /api/auth/refresh    refresh grant, rotate cookie
// POST /api/auth/logout     clear cookie
// GET  /api/auth/me         echo the verified claims

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    Extension,
};
use serde::Deserialize;
use serde_json::json;

use super::{parse_json, require_verified, respond};
use crate::api::ResponseTriple;
use crate::app::AppState;
use crate::auth::{AuthContext, OidcProvider, TokenSet};
use crate::error::ApiError;

pub const REFRESH_COOKIE: &str = "refresh_token";
const COOKIE_PATH: &str = "/api/auth";

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub code: String,
    pub code_verifier: String,
    pub redirect_uri: String,
}

/// `Set-Cookie` value for the refresh token. `Some(0)` clears it and `None`
/// leaves a session cookie.
pub fn refresh_cookie(value: &str, max_age: Option<u64>, domain: &str, secure: bool) -> String {
    let mut cookie = format!("{}={}; HttpOnly", REFRESH_COOKIE, value);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie.push_str(&format!("; SameSite=Strict; Path={}; Domain={}", COOKIE_PATH, domain));
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    cookie
}

/// Value of the refresh-token cookie, if the request carries one
pub fn read_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == REFRESH_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn provider(state: &AppState) -> Result<&dyn OidcProvider, ApiError> {
    state
        .oidc
        .as_deref()
        .ok_or_else(|| ApiError::not_found("OIDC provider is not configured"))
}

fn with_cookie(triple: ResponseTriple, cookie: &str) -> Result<ResponseTriple, ApiError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|_| ApiError::internal_server_error("Invalid cookie value"))?;
    Ok(triple.with_header(header::SET_COOKIE, value))
}

/// Access token in the body, refresh token only in the cookie
fn token_response(state: &AppState, tokens: &TokenSet) -> Result<ResponseTriple, ApiError> {
    let triple = state.envelope.ok(&json!({
        "access_token": tokens.access_token,
        "expires_in": tokens.expires_in,
        "token_type": tokens.token_type,
    }));

    match &tokens.refresh_token {
        Some(refresh) => {
            let oidc = &state.config.auth.oidc;
            let cookie = refresh_cookie(
                refresh,
                // offline tokens report 0, meaning no fixed expiry
                tokens.refresh_expires_in.filter(|secs| *secs > 0),
                &oidc.base_domain,
                state.config.security.cookie_secure,
            );
            with_cookie(triple, &cookie)
        }
        None => Ok(triple),
    }
}

async fn exchange(state: &AppState, body: &[u8]) -> Result<ResponseTriple, ApiError> {
    let request: CallbackRequest = parse_json(body)?;

    if !state.config.auth.oidc.is_allowed_redirect(&request.redirect_uri) {
        tracing::warn!("Rejected callback with redirect_uri {}", request.redirect_uri);
        return Err(ApiError::bad_request("invalid redirect"));
    }

    let tokens = provider(state)?
        .exchange_code(&request.code, &request.code_verifier, &request.redirect_uri)
        .await?;
    token_response(state, &tokens)
}

pub async fn callback(State(state): State<AppState>, body: Bytes) -> ResponseTriple {
    let result = exchange(&state, &body).await;
    respond(&state, result)
}

async fn rotate(state: &AppState, headers: &HeaderMap) -> Result<ResponseTriple, ApiError> {
    let refresh_token = read_refresh_cookie(headers)
        .ok_or_else(|| ApiError::unauthorized("Missing refresh token"))?;
    let tokens = provider(state)?.refresh(&refresh_token).await?;
    token_response(state, &tokens)
}

pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> ResponseTriple {
    let result = rotate(&state, &headers).await;
    respond(&state, result)
}

pub async fn logout(State(state): State<AppState>) -> ResponseTriple {
    let cookie = refresh_cookie(
        "",
        Some(0),
        &state.config.auth.oidc.base_domain,
        state.config.security.cookie_secure,
    );
    let result = with_cookie(state.envelope.ok_msg("Logged out"), &cookie);
    respond(&state, result)
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ResponseTriple {
    if let Err(denied) = require_verified(&state, &auth) {
        return denied;
    }
    match &auth.identity {
        Some(identity) => state.envelope.ok(&identity.claims),
        None => state.envelope.token_auth_failed(),
    }
}

// handlers/account.rs - /api/auth account routes
//
// GET  /api/auth/verify                     caller's full account
// GET  /api/auth/email/validate/:email      how many accounts use an email
// GET  /api/auth/username/validate/:name    how many accounts use a username
// POST /api/auth/signup                     invite-only account creation

use axum::{
    body::Bytes,
    extract::{Path, State},
    Extension,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{parse_json, require_verified, respond};
use crate::api::ResponseTriple;
use crate::app::AppState;
use crate::auth::AuthContext;
use crate::database::NewAccount;
use crate::error::ApiError;

/// Trimmed and lower-cased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Only `[a-zA-Z0-9._-]` survive, lower-cased
pub fn strip_username(username: &str) -> String {
    username
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .to_lowercase()
}

pub async fn verify(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ResponseTriple {
    let email = match require_verified(&state, &auth) {
        Ok(email) => email,
        Err(denied) => return denied,
    };

    let result = match state.store.account(email).await {
        Ok(Some(account)) => Ok(state.envelope.ok(&account)),
        Ok(None) => Err(ApiError::not_found(format!("account {}", email))),
        Err(e) => Err(e.into()),
    };
    respond(&state, result)
}

pub async fn email_count(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ResponseTriple {
    let result = state
        .store
        .count_email(&normalize_email(&email))
        .await
        .map(|count| state.envelope.ok(&json!({"data": {"count": count}})))
        .map_err(ApiError::from);
    respond(&state, result)
}

pub async fn username_count(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ResponseTriple {
    let result = state
        .store
        .count_username(&strip_username(&username))
        .await
        .map(|count| state.envelope.ok(&json!({"data": {"count": count}})))
        .map_err(ApiError::from);
    respond(&state, result)
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub qualifications: Vec<String>,
    #[serde(default)]
    pub invite_key: String,
    pub avatar_id: Option<String>,
    pub banner_id: Option<String>,
}

fn image_id(raw: Option<&str>, what: &str) -> Result<Option<Uuid>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => Uuid::parse_str(id)
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("Invalid {} ID '{}'", what, id))),
        None => Ok(None),
    }
}

impl SignupRequest {
    /// Field checks that need no store access
    pub fn validate(&self) -> Result<NewAccount, ApiError> {
        let email = normalize_email(&self.email);
        if !email.contains('@') {
            return Err(ApiError::bad_request(format!("Invalid email address '{}'", email)));
        }

        let fullname = self.fullname.trim();
        if fullname.is_empty() {
            return Err(ApiError::bad_request("Full name is required"));
        }

        let username = strip_username(&self.username);
        if username.is_empty() {
            return Err(ApiError::bad_request("Username is required"));
        }

        Ok(NewAccount {
            email,
            username,
            fullname: fullname.to_string(),
            bio: self.description.clone(),
            qualifications: self
                .qualifications
                .iter()
                .map(|q| q.trim())
                .filter(|q| !q.is_empty())
                .map(str::to_string)
                .collect(),
            avatar_id: image_id(self.avatar_id.as_deref(), "avatar")?,
            banner_id: image_id(self.banner_id.as_deref(), "banner")?,
        })
    }
}

async fn create_account(state: &AppState, body: &[u8]) -> Result<ResponseTriple, ApiError> {
    let request: SignupRequest = parse_json(body)?;
    let account = request.validate()?;

    if state.store.count_email(&account.email).await? > 0 {
        return Err(ApiError::bad_request(format!(
            "User with email '{}' already exists",
            account.email
        )));
    }
    if !state.store.shared_password_exists(&request.invite_key).await? {
        tracing::warn!("Signup for {} with a wrong invite key", account.email);
        return Err(ApiError::bad_request("Shared password is incorrect"));
    }

    let user = state.store.create_account(&account).await?;
    tracing::info!("Account created for {} ({})", user.username, user.id);
    Ok(state.envelope.ok(&json!({"data": {"user": user}})))
}

pub async fn signup(State(state): State<AppState>, body: Bytes) -> ResponseTriple {
    let result = create_account(&state, &body).await;
    respond(&state, result)
}

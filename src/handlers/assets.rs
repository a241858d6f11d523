// handlers/assets.rs - /api/assets
//
// Uploads go to the object store under the id of a freshly created file
// record. Downloads are aggressively cached: a matching If-None-Match is
// answered with 304 before storage is touched.

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    Extension,
};
use chrono::{Duration, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{require_verified, respond};
use crate::api::ResponseTriple;
use crate::app::AppState;
use crate::auth::AuthContext;
use crate::error::ApiError;

const THIRTY_DAYS: i64 = 30 * 24 * 60 * 60;
const ONE_YEAR: i64 = 365 * 24 * 60 * 60;
const LAST_MODIFIED: &str = "Sun, 01 Jan 2023 00:00:00 GMT";
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

pub fn etag_of(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn guess_mime(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// True when the client already holds `etag`
fn client_has(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .any(|tag| tag.trim().trim_start_matches("W/").trim_matches('"') == etag)
        })
        .unwrap_or(false)
}

/// `Content-Disposition` value with `filename` as an escaped quoted-string
fn disposition(kind: &str, filename: &str) -> String {
    let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
    format!("{}; filename=\"{}\"", kind, escaped)
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|_| ApiError::internal_server_error("Invalid header value"))
}

fn not_modified(etag: &str) -> Result<ResponseTriple, ApiError> {
    Ok(ResponseTriple::new(Bytes::new(), StatusCode::NOT_MODIFIED, HeaderMap::new())
        .with_header(header::ETAG, header_value(&format!("\"{}\"", etag))?))
}

/// Long-lived public caching headers
fn cached(triple: ResponseTriple, max_age: i64, etag: &str) -> Result<ResponseTriple, ApiError> {
    let expires = (Utc::now() + Duration::seconds(max_age)).format(HTTP_DATE).to_string();
    let headers: [(HeaderName, String); 6] = [
        (header::CACHE_CONTROL, format!("public, max-age={}, immutable", max_age)),
        (header::ETAG, format!("\"{}\"", etag)),
        (header::EXPIRES, expires),
        (header::LAST_MODIFIED, LAST_MODIFIED.to_string()),
        (header::VARY, "Accept-Encoding".to_string()),
        (header::PRAGMA, "public".to_string()),
    ];

    headers
        .into_iter()
        .try_fold(triple, |triple, (name, value)| {
            Ok(triple.with_header(name, header_value(&value)?))
        })
}

fn asset_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found("Asset not found"))
}

/// GET /api/assets/ - files uploaded by the caller
pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ResponseTriple {
    let email = match require_verified(&state, &auth) {
        Ok(email) => email,
        Err(denied) => return denied,
    };

    let result = state
        .store
        .files_by_author(email)
        .await
        .map(|files| state.envelope.ok(&files))
        .map_err(ApiError::from);
    respond(&state, result)
}

async fn store_upload(
    state: &AppState,
    email: &str,
    name: &str,
    mut multipart: Multipart,
) -> Result<ResponseTriple, ApiError> {
    let max = state.config.storage.max_upload_bytes;

    let mut bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() == Some("file") {
            bytes = Some(field.bytes().await.map_err(|e| ApiError::bad_request(e.body_text()))?);
            break;
        }
    }

    let bytes = bytes.ok_or_else(|| ApiError::bad_request("No files provided"))?;
    if bytes.len() > max {
        return Err(ApiError::bad_request(format!("File exceeds the {} byte limit", max)));
    }

    let mime_type = guess_mime(name);
    let file = state.store.create_file(name, &mime_type, Some(email)).await?;
    if let Err(err) = state.storage.put(file.id, bytes, &mime_type).await {
        // a record without its object would be listed but never downloadable
        if let Err(cleanup) = state.store.delete_file(file.id).await {
            tracing::error!("Could not remove file record {}: {}", file.id, cleanup);
        }
        return Err(err.into());
    }

    tracing::info!("Stored asset {} ({}, {}) for {}", file.id, name, mime_type, email);
    Ok(state.envelope.ok(&json!({"id": file.id})))
}

/// POST /api/assets/upload/:name - multipart field `file`
pub async fn upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(auth): Extension<AuthContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ResponseTriple {
    let email = match require_verified(&state, &auth) {
        Ok(email) => email,
        Err(denied) => return denied,
    };

    let result = match multipart {
        Ok(multipart) => store_upload(&state, email, &name, multipart).await,
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
    };
    respond(&state, result)
}

async fn fetch_attachment(
    state: &AppState,
    raw_id: &str,
    headers: &HeaderMap,
) -> Result<ResponseTriple, ApiError> {
    // clients may revalidate with the id hash handed out by the redirect route
    let id_tag = etag_of(raw_id.as_bytes());
    if client_has(headers, &id_tag) {
        return not_modified(&id_tag);
    }

    let id = asset_id(raw_id)?;
    let content = state.storage.fetch(id).await?;
    let etag = etag_of(&content);
    if client_has(headers, &etag) {
        return not_modified(&etag);
    }

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    response_headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&disposition("attachment", &id.to_string()))?,
    );
    cached(ResponseTriple::new(content, StatusCode::OK, response_headers), THIRTY_DAYS, &etag)
}

/// GET /api/assets/download/:id - bytes as an attachment, cached 30 days
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ResponseTriple {
    let result = fetch_attachment(&state, &id, &headers).await;
    respond(&state, result)
}

async fn fetch_inline(
    state: &AppState,
    raw_id: &str,
    filename: &str,
    headers: &HeaderMap,
) -> Result<ResponseTriple, ApiError> {
    let etag = etag_of(format!("{}:{}", raw_id, filename).as_bytes());
    if client_has(headers, &etag) {
        return not_modified(&etag);
    }

    let id = asset_id(raw_id)?;
    let content = state.storage.fetch(id).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, header_value(&guess_mime(filename))?);
    response_headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&disposition("inline", filename))?,
    );
    cached(ResponseTriple::new(content, StatusCode::OK, response_headers), ONE_YEAR, &etag)
}

/// GET /api/assets/:id/:filename - inline with a MIME type guessed from the name
pub async fn inline(
    State(state): State<AppState>,
    Path((id, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> ResponseTriple {
    let result = fetch_inline(&state, &id, &filename, &headers).await;
    respond(&state, result)
}

async fn signed_redirect(
    state: &AppState,
    raw_id: &str,
    headers: &HeaderMap,
) -> Result<ResponseTriple, ApiError> {
    let etag = etag_of(raw_id.as_bytes());
    if client_has(headers, &etag) {
        return not_modified(&etag);
    }

    let id = asset_id(raw_id)?;
    let target = state.storage.download_url(id)?;
    let triple = ResponseTriple::new(Bytes::new(), StatusCode::FOUND, HeaderMap::new())
        .with_header(header::LOCATION, header_value(&target)?);
    cached(triple, ONE_YEAR, &etag)
}

/// GET /api/assets/:id - 302 to a signed storage URL
pub async fn redirect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ResponseTriple {
    let result = signed_redirect(&state, &id, &headers).await;
    respond(&state, result)
}

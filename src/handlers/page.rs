// handlers/page.rs - /api/page/:page/:component
//
// Reads take their payload from the query string, writes from the JSON body.
// A payload that cannot be read becomes an empty map; handlers validate their
// own fields.

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    Extension,
};
use serde_json::Value;

use crate::api::ResponseTriple;
use crate::app::AppState;
use crate::auth::AuthContext;
use crate::page::Payload;

fn query_payload(query: Option<&str>) -> Payload {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect()
        })
        .unwrap_or_default()
}

fn body_payload(body: &[u8]) -> Payload {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => Payload::new(),
    }
}

/// GET /api/page/:page/:component
pub async fn page_read(
    State(state): State<AppState>,
    Path((page, component)): Path<(String, String)>,
    Extension(auth): Extension<AuthContext>,
    RawQuery(query): RawQuery,
) -> ResponseTriple {
    let payload = query_payload(query.as_deref());
    state.dispatcher.run(&page, &component, payload, &auth).await
}

/// POST|PUT|DELETE /api/page/:page/:component
pub async fn page_write(
    State(state): State<AppState>,
    Path((page, component)): Path<(String, String)>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> ResponseTriple {
    let payload = body_payload(&body);
    state.dispatcher.run(&page, &component, payload, &auth).await
}

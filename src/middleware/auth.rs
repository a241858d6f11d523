use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::auth::{AuthContext, TokenVerifier};

/// Resolves the caller's identity for every request and stores the
/// [`AuthContext`] in the request extensions. Never rejects: an absent or bad
/// credential just leaves the caller anonymous.
pub async fn resolve_identity(
    State(verifier): State<Arc<dyn TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let context = verifier.verify(authorization.as_deref()).await;
    if context.verified {
        tracing::debug!("Request from verified caller {:?}", context.email());
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ApiError;

/// The `(body, status, headers)` triple every route ultimately produces
#[derive(Debug, Clone)]
pub struct ResponseTriple {
    pub body: Bytes,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseTriple {
    pub fn new(body: impl Into<Bytes>, status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            body: body.into(),
            status,
            headers,
        }
    }

    /// JSON body with `Content-Type: application/json`
    pub fn json(value: &Value, status: StatusCode) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self::new(value.to_string(), status, headers)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Parse the body back into JSON (non-JSON bodies yield `Value::Null`)
    pub fn json_body(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

impl IntoResponse for ResponseTriple {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Uniform response formatter. The only place that decides the outward JSON
/// shape and what each status code means.
#[derive(Debug, Clone, Copy, Default)]
pub struct Envelope {
    debug: bool,
}

impl Envelope {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    /// 200 with the data serialized as-is
    pub fn ok<T: Serialize>(&self, data: &T) -> ResponseTriple {
        match serde_json::to_value(data) {
            Ok(value) => ResponseTriple::json(&value, StatusCode::OK),
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                self.error_generic("Failed to format response")
            }
        }
    }

    /// 200 with a status message instead of data
    pub fn ok_msg(&self, msg: &str) -> ResponseTriple {
        ResponseTriple::json(&json!({"status": "OK", "msg": msg}), StatusCode::OK)
    }

    pub fn error_generic(&self, msg: &str) -> ResponseTriple {
        ResponseTriple::json(
            &json!({"status": "error", "msg": msg}),
            StatusCode::INTERNAL_SERVER_ERROR,
        )
    }

    pub fn invalid_request(&self, msg: &str) -> ResponseTriple {
        ResponseTriple::json(
            &json!({"status": "error", "msg": format!("Invalid Request: {}", msg)}),
            StatusCode::BAD_REQUEST,
        )
    }

    pub fn unauthorized(&self, msg: &str) -> ResponseTriple {
        ResponseTriple::json(
            &json!({"status": "Unauthorized", "msg": msg}),
            StatusCode::UNAUTHORIZED,
        )
    }

    pub fn token_auth_failed(&self) -> ResponseTriple {
        self.unauthorized("Incorrect Authorization (username or token)")
    }

    pub fn not_found(&self, what: &str) -> ResponseTriple {
        ResponseTriple::json(
            &json!({"status": "Not Found", "msg": format!("Resource not found: {}", what)}),
            StatusCode::NOT_FOUND,
        )
    }

    pub fn rate_limit_exceeded(&self) -> ResponseTriple {
        ResponseTriple::json(
            &json!({"status": "Rate Limit Exceeded", "msg": "Too many requests"}),
            StatusCode::TOO_MANY_REQUESTS,
        )
    }

    pub fn server_error(&self, msg: &str) -> ResponseTriple {
        ResponseTriple::json(
            &json!({"status": "error", "msg": msg}),
            StatusCode::SERVICE_UNAVAILABLE,
        )
    }

    /// 500 for failures nobody anticipated; detail is only shown in debug mode
    pub fn unhandled(&self, detail: &str) -> ResponseTriple {
        if self.debug {
            self.error_generic(detail)
        } else {
            self.error_generic("An unexpected error occurred")
        }
    }

    pub fn from_error(&self, err: &ApiError) -> ResponseTriple {
        match err {
            ApiError::BadRequest(msg) => self.invalid_request(msg),
            ApiError::Unauthorized(msg) => self.unauthorized(msg),
            ApiError::NotFound(what) => self.not_found(what),
            ApiError::TooManyRequests(_) => self.rate_limit_exceeded(),
            ApiError::Validation(msg) => self.error_generic(msg),
            ApiError::InternalServerError(msg) => self.error_generic(msg),
            ApiError::ServiceUnavailable(msg) => self.server_error(msg),
        }
    }
}

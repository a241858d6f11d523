// Page-handler dispatch: `/api/page/:page/:component` resolves through the
// registry to a plain function declared by one of the page modules in `pages`.

pub mod dispatcher;
pub mod pages;
pub mod payload;
pub mod registry;

use std::fmt;

use axum::http::StatusCode;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::api::{Envelope, ResponseTriple};
use crate::auth::AuthContext;
use crate::database::Store;
use crate::error::ApiError;

pub use dispatcher::Dispatcher;
pub use registry::{Registry, RegistryError};

/// Query-string map for reads, JSON object body for writes
pub type Payload = Map<String, Value>;

/// What a handler hands back. A bare body gets the default JSON headers; a
/// full triple passes through untouched.
#[derive(Debug, Clone)]
pub enum HandlerOutput {
    Body(Value, StatusCode),
    Triple(ResponseTriple),
}

impl HandlerOutput {
    pub fn ok(body: Value) -> Self {
        HandlerOutput::Body(body, StatusCode::OK)
    }

    /// 200 with `data` serialized as the body
    pub fn json<T: Serialize>(data: &T) -> Result<Self, ApiError> {
        serde_json::to_value(data).map(Self::ok).map_err(|err| {
            tracing::error!("Failed to serialize handler output: {}", err);
            ApiError::internal_server_error("Failed to serialize response")
        })
    }

    pub fn into_triple(self) -> ResponseTriple {
        match self {
            HandlerOutput::Body(body, status) => ResponseTriple::json(&body, status),
            HandlerOutput::Triple(triple) => triple,
        }
    }
}

/// Everything a handler gets to see for one call
pub struct PageCall<'a> {
    pub payload: &'a Payload,
    pub auth: &'a AuthContext,
    pub store: &'a dyn Store,
    pub envelope: Envelope,
}

impl<'a> PageCall<'a> {
    /// Email of the verified caller
    pub fn caller_email(&self) -> Result<&'a str, ApiError> {
        if !self.auth.verified {
            return Err(ApiError::unauthorized("Unauthorized"));
        }
        self.auth
            .email()
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))
    }
}

pub type HandlerFuture<'a> = BoxFuture<'a, Result<HandlerOutput, ApiError>>;

pub type HandlerFn = for<'a> fn(PageCall<'a>) -> HandlerFuture<'a>;

/// Declared authentication requirement of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    /// The dispatcher answers 401 without calling the handler when the caller is not verified
    Authenticated,
}

#[derive(Clone, Copy)]
pub struct Component {
    pub name: &'static str,
    pub access: Access,
    pub handler: HandlerFn,
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

/// A named group of components, declared once per file under `pages`
#[derive(Debug)]
pub struct PageModule {
    pub name: &'static str,
    pub components: &'static [Component],
}

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, warn};

use super::{Access, PageCall, Payload, Registry};
use crate::api::{Envelope, ResponseTriple};
use crate::auth::AuthContext;
use crate::database::Store;

/// Per-request entry point for page handlers. Whatever the handler does,
/// including panicking, the caller gets a well-formed triple back.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    store: Arc<dyn Store>,
    envelope: Envelope,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked".to_string()
    }
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn Store>, envelope: Envelope) -> Self {
        Self {
            registry,
            store,
            envelope,
        }
    }

    pub async fn run(
        &self,
        page: &str,
        component: &str,
        payload: Payload,
        auth: &AuthContext,
    ) -> ResponseTriple {
        let Some(entry) = self.registry.resolve(page, component) else {
            warn!("No page handler for {}/{}", page, component);
            return self.envelope.not_found(&format!("{}/{}", page, component));
        };

        if entry.access == Access::Authenticated && !auth.verified {
            return self.envelope.unauthorized("Unauthorized");
        }

        let call = PageCall {
            payload: &payload,
            auth,
            store: self.store.as_ref(),
            envelope: self.envelope,
        };

        match AssertUnwindSafe((entry.handler)(call)).catch_unwind().await {
            Ok(Ok(output)) => output.into_triple(),
            Ok(Err(err)) => {
                if err.status_code().is_server_error() {
                    error!("{}/{} failed [{}]: {}", page, component, err.error_code(), err);
                } else {
                    warn!("{}/{} rejected [{}]: {}", page, component, err.error_code(), err);
                }
                self.envelope.from_error(&err)
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!("{}/{} panicked: {}", page, component, detail);
                self.envelope.unhandled(&detail)
            }
        }
    }
}

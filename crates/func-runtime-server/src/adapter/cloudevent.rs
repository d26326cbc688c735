//! CloudEvent adapter.
//!
//! Decodes the event, runs the pipeline and hands the final error back to
//! the deliverer. Over HTTP that means `200` to acknowledge, `400` for an
//! event that could not be decoded and `500` to ask for redelivery.

use axum::body::Body;
use axum::http::Request;
use tracing::warn;

use func_runtime_common::InvocationError;
use func_runtime_core::{CloudEvent, FunctionEntry, PathVars, RuntimeManager};

use crate::cloudevent;
use crate::request::buffer_request;
use crate::response::FunctionResponse;
use crate::state::AppState;

/// Deliver one event to `entry`.
///
/// # Errors
///
/// Returns the invocation's final error, if any.
pub async fn deliver(
    manager: &RuntimeManager,
    entry: &FunctionEntry,
    vars: PathVars,
    event: CloudEvent,
) -> Result<(), InvocationError> {
    let mut ctx = manager.new_invocation(entry);
    ctx.set_vars(vars);
    ctx.set_cloud_event(event);
    manager.run_with_hooks(&mut ctx, entry.handler()).await;

    match ctx.take_error() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Decode an HTTP request as a CloudEvent and deliver it.
///
/// Variables matched from the route are available through
/// [`InvocationContext::vars`](func_runtime_core::InvocationContext::vars).
pub async fn invoke(
    state: &AppState,
    entry: &FunctionEntry,
    vars: PathVars,
    req: Request<Body>,
) -> FunctionResponse {
    let request = match buffer_request(req, state.body_limit()).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (parts, body) = request.into_parts();
    let event = match cloudevent::decode(&parts.headers, body) {
        Ok(event) => event,
        Err(e) => {
            warn!(function = entry.name(), error = %e, "Rejecting malformed CloudEvent");
            return FunctionResponse::error(400, &e.to_string());
        }
    };

    match deliver(state.manager(), entry, vars, event).await {
        Ok(()) => FunctionResponse::empty(200),
        Err(e) => FunctionResponse::error(500, &e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use func_runtime_common::{FunctionError, RuntimeContext};
    use func_runtime_core::{CloudEventFunction, InvocationContext, PluginPipeline};

    struct RequireSubject;

    #[async_trait]
    impl CloudEventFunction for RequireSubject {
        async fn call(&self, _ctx: &InvocationContext, event: &CloudEvent) -> Result<(), FunctionError> {
            event
                .subject
                .as_ref()
                .map(|_| ())
                .ok_or_else(|| FunctionError::failed("subject required"))
        }
    }

    #[tokio::test]
    async fn test_deliver_returns_error() {
        let manager = RuntimeManager::new(
            Arc::new(RuntimeContext::default()),
            Arc::new(PluginPipeline::default()),
        );
        let entry = FunctionEntry::builder("subject")
            .cloud_event(RequireSubject)
            .build()
            .unwrap();

        let ok = CloudEvent::new("1", "/s", "t").with_subject("x");
        assert!(deliver(&manager, &entry, PathVars::default(), ok).await.is_ok());

        let missing = CloudEvent::new("2", "/s", "t");
        let err = deliver(&manager, &entry, PathVars::default(), missing).await.unwrap_err();
        assert!(matches!(err, InvocationError::Handler(_)));
    }
}

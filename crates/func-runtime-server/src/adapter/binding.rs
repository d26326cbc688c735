//! Async binding adapter.
//!
//! Messages reach the bound function two ways:
//!
//! - pushed by the sidecar as `POST /{component}` requests ([`invoke`])
//! - pulled from an in-process [`ChannelSource`] ([`run_consumer`])
//!
//! Either way the result is only acknowledged, never returned to a caller.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use func_runtime_common::InvocationError;
use func_runtime_core::{BindingMessage, FunctionEntry, Out, RuntimeManager, StatusKind};
use func_runtime_host::ChannelSource;

use crate::adapter::http::crash_response;
use crate::cloudevent::{self, STRUCTURED_CONTENT_TYPE};
use crate::request::{buffer_request, content_type};
use crate::response::{FunctionResponse, FunctionStatus};
use crate::state::AppState;

/// Deliver one message to `entry`.
///
/// # Errors
///
/// Returns the invocation's final error, if any.
pub async fn deliver(
    manager: &RuntimeManager,
    entry: &FunctionEntry,
    message: BindingMessage,
) -> Result<Out, InvocationError> {
    let mut ctx = manager.new_invocation(entry);
    ctx.set_message(message);
    manager.run_with_hooks(&mut ctx, entry.handler()).await;

    match ctx.take_error() {
        Some(e) => Err(e),
        None => Ok(ctx.result().clone()),
    }
}

/// Handle a message pushed over HTTP for the input `input`.
///
/// Pub/sub deliveries arrive wrapped in a structured CloudEvent; the event's
/// data becomes the message body.
pub async fn invoke(
    state: &AppState,
    entry: &FunctionEntry,
    input: &str,
    req: Request<Body>,
) -> FunctionResponse {
    let request = match buffer_request(req, state.body_limit()).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (parts, body) = request.into_parts();
    let is_event = content_type(&parts.headers).is_some_and(|ct| ct.starts_with(STRUCTURED_CONTENT_TYPE));

    let message = if is_event {
        match cloudevent::decode(&parts.headers, body) {
            Ok(event) => {
                let mut message = BindingMessage::new(input, event.data_bytes())
                    .with_metadata("ce-id", event.id.clone())
                    .with_metadata("ce-type", event.event_type.clone());
                if let Some(topic) = event.extension("topic") {
                    message = message.with_metadata("topic", topic);
                }
                message
            }
            Err(e) => {
                warn!(input, error = %e, "Rejecting malformed pub/sub delivery");
                return FunctionResponse::error(400, &e.to_string());
            }
        }
    } else {
        BindingMessage::new(input, body)
    };

    match deliver(state.manager(), entry, message).await {
        Ok(out) if out.status_kind() == StatusKind::Success => {
            FunctionResponse::new(200, out.data().clone()).with_status_marker(FunctionStatus::Success)
        }
        Ok(_) => FunctionResponse::empty(500).with_status_marker(FunctionStatus::Error),
        Err(InvocationError::Crash(crash)) => crash_response(&crash.to_string()),
        Err(e) => FunctionResponse::error(500, &e.to_string()).with_status_marker(FunctionStatus::Error),
    }
}

/// Consume messages from `source` until it closes or `shutdown` fires.
///
/// Every message is handled on its own task. Once the loop ends, the
/// consumer waits for the tasks still running before it returns.
pub async fn run_consumer(
    manager: RuntimeManager,
    entry: Arc<FunctionEntry>,
    mut source: ChannelSource,
    shutdown: CancellationToken,
) {
    info!(function = entry.name(), "Starting message consumer");

    let tracker = TaskTracker::new();
    loop {
        let message = tokio::select! {
            () = shutdown.cancelled() => break,
            message = source.recv() => message,
        };

        let Some(message) = message else {
            debug!("Message source closed");
            break;
        };

        let manager = manager.clone();
        let entry = entry.clone();
        tracker.spawn(async move {
            let input = message.input.clone();
            match deliver(&manager, &entry, message).await {
                Ok(out) => debug!(input, code = out.code(), "Message acknowledged"),
                Err(e) => warn!(input, error = %e, "Message handling failed"),
            }
        });
    }

    tracker.close();
    if !tracker.is_empty() {
        info!(in_flight = tracker.len(), "Waiting for in-flight messages");
    }
    tracker.wait().await;

    info!(function = entry.name(), "Message consumer stopped");
}

//! Synchronous HTTP adapter.
//!
//! Serves HTTP functions and structured functions over a plain request.
//! The response is derived from the invocation's final result and error:
//!
//! | Final state                 | Status          | Marker    | Body            |
//! |-----------------------------|-----------------|-----------|-----------------|
//! | crash                       | 500             | `crash`   | panic message   |
//! | no status set               | 500             | `error`   | none            |
//! | error recorded              | result or 500   | `error`   | see below       |
//! | success                     | result          | `success` | result data     |
//!
//! A failing HTTP function keeps the body it wrote; a failing structured
//! function never exposes its data.

use axum::body::Body;
use axum::http::Request;

use func_runtime_common::InvocationError;
use func_runtime_core::{FunctionEntry, InvocationContext, PathVars, StatusKind, TriggerKind};

use crate::request::buffer_request;
use crate::response::{FunctionResponse, FunctionStatus};
use crate::state::AppState;

/// Run `entry` for one HTTP request.
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

    let manager = state.manager();
    let mut ctx = manager.new_invocation(entry);
    ctx.set_http_request(request, vars);
    manager.run_with_hooks(&mut ctx, entry.handler()).await;

    into_response(&ctx)
}

/// Map a finished invocation to its HTTP response.
pub fn into_response(ctx: &InvocationContext) -> FunctionResponse {
    if let Some(InvocationError::Crash(crash)) = ctx.error() {
        return crash_response(&crash.to_string());
    }

    let result = ctx.result();
    let failed = ctx.error().is_some();

    match result.status_kind() {
        StatusKind::Unset => FunctionResponse::empty(500).with_status_marker(FunctionStatus::Error),
        StatusKind::Success if !failed => {
            let mut response = FunctionResponse::new(result.code(), result.data().clone());
            response.headers.extend(result.headers().iter().cloned());
            response.with_status_marker(FunctionStatus::Success)
        }
        StatusKind::Success => FunctionResponse::empty(500).with_status_marker(FunctionStatus::Error),
        StatusKind::InternalError => {
            let mut response = FunctionResponse::empty(result.code());
            if ctx.trigger() == TriggerKind::Http {
                response.body = result.data().clone();
                response.headers.extend(result.headers().iter().cloned());
            }
            response.with_status_marker(FunctionStatus::Error)
        }
    }
}

/// The response for a panicked invocation.
pub fn crash_response(message: &str) -> FunctionResponse {
    FunctionResponse::text(500, format!("{message}\n")).with_status_marker(FunctionStatus::Crash)
}

//! Built-in request handlers.
//!
//! Health, readiness and the sidecar subscription listing. Function
//! invocations are handled by the [`adapter`](crate::adapter) modules.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use func_runtime_common::ComponentKind;

use crate::router::delivery_route;
use crate::state::AppState;

/// Health check handler.
///
/// Returns 200 OK if the server is running.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
///
/// Lists the bound functions and the serving mode.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "ready",
        "runtime": state.runtime_kind().to_string(),
        "functions": state.functions(),
    });

    (StatusCode::OK, Json(body))
}

/// One entry of the `/dapr/subscribe` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub pubsubname: String,
    pub topic: String,
    pub route: String,
}

/// Pub/sub inputs of the deployment as sidecar subscriptions.
pub fn subscriptions(state: &AppState) -> Vec<Subscription> {
    state
        .manager()
        .runtime()
        .inputs()
        .values()
        .filter(|input| input.kind() == ComponentKind::PubSub)
        .map(|input| Subscription {
            pubsubname: input.component_name.clone(),
            topic: input.topic().to_string(),
            route: delivery_route(input),
        })
        .collect()
}

/// `GET /dapr/subscribe`.
pub async fn list_subscriptions(State(state): State<AppState>) -> impl IntoResponse {
    Json(subscriptions(&state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use func_runtime_common::{ComponentSpec, RuntimeContext, RuntimeKind};
    use func_runtime_core::{PluginPipeline, RuntimeManager};

    #[test]
    fn test_subscriptions_only_pubsub() {
        let runtime = RuntimeContext::default()
            .with_runtime(RuntimeKind::AsyncServing)
            .with_input("cron", ComponentSpec::new("cron-input", "bindings.cron"))
            .with_input(
                "orders",
                ComponentSpec::new("msg", "pubsub.natsstreaming").with_uri("orders"),
            );
        let manager = RuntimeManager::new(Arc::new(runtime), Arc::new(PluginPipeline::default()));
        let state = AppState::new(manager, vec!["f".to_string()]);

        assert_eq!(
            subscriptions(&state),
            [Subscription {
                pubsubname: "msg".into(),
                topic: "orders".into(),
                route: "/msg/orders".into(),
            }]
        );
    }
}

//! HTTP router configuration.
//!
//! This module turns the bound function entries into an Axum router.
//! Path patterns use `{name}` and `{*rest}` segments and are translated to
//! Axum's `:name` / `*rest` syntax. Route clashes are reported as
//! [`DispatchError::RouteConflict`] instead of panicking inside Axum.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, Request, State};
use axum::http::Method;
use axum::routing::{MethodFilter, MethodRouter, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use func_runtime_common::{ComponentKind, ComponentSpec, DispatchError, FrameworkError};
use func_runtime_core::{FunctionEntry, PathVars, TriggerKind, path_variables};

use crate::adapter;
use crate::handler::{health_check, list_subscriptions, readiness_check};
use crate::response::FunctionResponse;
use crate::state::AppState;

/// Health check route.
pub const HEALTH_PATH: &str = "/healthz";
/// Readiness route.
pub const READY_PATH: &str = "/readyz";
/// Sidecar subscription listing, served in async mode.
pub const SUBSCRIBE_PATH: &str = "/dapr/subscribe";

const BUILTIN: &str = "<builtin>";

/// Translate a `{name}` pattern into Axum's route syntax.
pub fn to_axum_path(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(inner) => match inner.strip_prefix('*') {
                Some(rest) => format!("*{rest}"),
                None => format!(":{inner}"),
            },
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// The pattern with variables erased. Axum rejects two routes of the same
/// shape, and a catch-all in the place of a variable.
fn route_shape(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| if segment.starts_with('{') { "{}" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

/// Entries grouped by route, with conflicts rejected.
#[derive(Default)]
struct RoutePlan {
    /// Pattern -> entries served on it.
    routes: BTreeMap<String, Vec<Arc<FunctionEntry>>>,
    /// Shape -> (pattern, owner) of the first route with that shape.
    shapes: HashMap<String, (String, String)>,
    /// (pattern, method or `*`) -> owner.
    claims: HashMap<(String, String), String>,
}

impl RoutePlan {
    fn with_builtins(paths: &[&str]) -> Self {
        let mut plan = Self::default();
        for path in paths {
            plan.shapes
                .insert(route_shape(path), (path.to_string(), BUILTIN.to_string()));
        }
        plan
    }

    fn add(&mut self, pattern: &str, entry: Arc<FunctionEntry>) -> Result<(), FrameworkError> {
        path_variables(pattern)?;

        let shape = route_shape(pattern);
        if let Some((existing_pattern, owner)) = self.shapes.get(&shape) {
            if existing_pattern != pattern || owner == BUILTIN {
                return Err(conflict(pattern, "*", owner, entry.name()));
            }
        } else {
            self.shapes
                .insert(shape, (pattern.to_string(), entry.name().to_string()));
        }

        let claimed: Vec<String> = if entry.methods().is_empty() {
            vec!["*".to_string()]
        } else {
            entry.methods().iter().map(ToString::to_string).collect()
        };
        for method in claimed {
            let key = (pattern.to_string(), method);
            if let Some(owner) = self.claims.get(&key) {
                return Err(conflict(pattern, &key.1, owner, entry.name()));
            }
            self.claims.insert(key, entry.name().to_string());
        }

        self.routes.entry(pattern.to_string()).or_default().push(entry);
        Ok(())
    }
}

fn conflict(path: &str, method: &str, existing: &str, incoming: &str) -> FrameworkError {
    DispatchError::RouteConflict {
        path: path.to_string(),
        method: method.to_string(),
        existing: existing.to_string(),
        incoming: incoming.to_string(),
    }
    .into()
}

fn method_filter(entry: &FunctionEntry, method: &Method) -> Result<MethodFilter, FrameworkError> {
    MethodFilter::try_from(method.clone()).map_err(|_| {
        DispatchError::UnsupportedTrigger {
            name: entry.name().to_string(),
            trigger: format!("{} {method}", TriggerKind::Http),
            runtime: "HTTP".to_string(),
        }
        .into()
    })
}

async fn dispatch(
    state: &AppState,
    entry: &FunctionEntry,
    vars: Option<Path<HashMap<String, String>>>,
    req: Request,
) -> FunctionResponse {
    let vars = vars.map(|Path(vars)| PathVars::from(vars)).unwrap_or_default();
    match entry.trigger_kind() {
        TriggerKind::CloudEvent => adapter::cloudevent::invoke(state, entry, vars, req).await,
        TriggerKind::Http | TriggerKind::AsyncBinding => {
            adapter::http::invoke(state, entry, vars, req).await
        }
    }
}

fn method_router(entries: &[Arc<FunctionEntry>]) -> Result<MethodRouter<AppState>, FrameworkError> {
    let mut router: MethodRouter<AppState> = MethodRouter::new();

    for entry in entries {
        let handler = {
            let entry = entry.clone();
            move |State(state): State<AppState>,
                  vars: Option<Path<HashMap<String, String>>>,
                  req: Request| async move { dispatch(&state, &entry, vars, req).await }
        };

        if entry.methods().is_empty() {
            router = router.fallback(handler);
        } else {
            for method in entry.methods() {
                router = router.on(method_filter(entry, method)?, handler.clone());
            }
        }
    }

    Ok(router)
}

/// Build the router for HTTP serving.
///
/// Each entry is served on its own path, or on `default_pattern` when it
/// has none.
pub fn build_http_router(
    state: AppState,
    entries: &[Arc<FunctionEntry>],
    default_pattern: &str,
    request_timeout: Duration,
) -> Result<Router, FrameworkError> {
    let mut plan = RoutePlan::with_builtins(&[HEALTH_PATH, READY_PATH]);
    for entry in entries {
        plan.add(entry.path_or(default_pattern), entry.clone())?;
    }

    let mut router = Router::new();
    for (pattern, entries) in &plan.routes {
        let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
        info!(path = %pattern, functions = ?names, "Binding route");
        router = router.route(&to_axum_path(pattern), method_router(entries)?);
    }

    Ok(finish(router, state, request_timeout))
}

/// Where the sidecar delivers messages for `input`.
///
/// Bindings arrive on `/{component}`. Pub/sub deliveries arrive on
/// `/{component}/{topic}`, so one component can feed several topics.
pub fn delivery_route(input: &ComponentSpec) -> String {
    match input.kind() {
        ComponentKind::PubSub => format!("/{}/{}", input.component_name, input.topic()),
        ComponentKind::Binding | ComponentKind::Other => format!("/{}", input.component_name),
    }
}

/// Build the router for async serving.
///
/// The single bound entry receives sidecar deliveries on the
/// [`delivery_route`] of every declared input, or on `default_pattern` when
/// there are none. Inputs sharing a route are delivered under the first
/// input's name.
pub fn build_async_router(
    state: AppState,
    entry: Arc<FunctionEntry>,
    default_pattern: &str,
    request_timeout: Duration,
) -> Result<Router, FrameworkError> {
    let runtime = state.manager().runtime().clone();
    let mut plan = RoutePlan::with_builtins(&[HEALTH_PATH, READY_PATH, SUBSCRIBE_PATH]);

    let mut deliveries: BTreeMap<String, String> = BTreeMap::new();
    if runtime.has_inputs() {
        for (name, spec) in runtime.inputs() {
            let path = delivery_route(spec);
            if let Some(first) = deliveries.get(&path) {
                warn!(path = %path, input = %name, first = %first, "Input shares a delivery route");
                continue;
            }
            deliveries.insert(path, name.clone());
        }
    } else {
        deliveries.insert(default_pattern.to_string(), entry.name().to_string());
    }

    let mut router = Router::new().route(SUBSCRIBE_PATH, get(list_subscriptions));
    for (path, input) in deliveries {
        plan.add(&path, entry.clone())?;
        info!(path = %path, input = %input, function = entry.name(), "Binding input");

        let entry = entry.clone();
        let handler = move |State(state): State<AppState>, req: Request| async move {
            adapter::binding::invoke(&state, &entry, &input, req).await
        };
        router = router.route(&to_axum_path(&path), post(handler));
    }

    Ok(finish(router, state, request_timeout))
}

fn finish(router: Router<AppState>, state: AppState, request_timeout: Duration) -> Router {
    router
        .route(HEALTH_PATH, get(health_check))
        .route(READY_PATH, get(readiness_check))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

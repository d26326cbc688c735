//! Shared application state.
//!
//! This module provides [`AppState`], which holds shared resources
//! across all HTTP request handlers.

use std::sync::Arc;

use func_runtime_common::RuntimeKind;
use func_runtime_core::RuntimeManager;

/// Default request body limit (10 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Shared state across all request handlers.
///
/// This struct is cloned for each request, so it uses `Arc` for shared data.
#[derive(Clone)]
pub struct AppState {
    /// Invocation pipeline shared by every adapter.
    manager: RuntimeManager,

    /// Names of the functions bound to this server.
    functions: Arc<Vec<String>>,

    /// Maximum buffered request body.
    body_limit: usize,
}

impl AppState {
    /// Create new application state.
    pub fn new(manager: RuntimeManager, functions: Vec<String>) -> Self {
        Self {
            manager,
            functions: Arc::new(functions),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Set the request body limit.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn manager(&self) -> &RuntimeManager {
        &self.manager
    }

    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    pub fn runtime_kind(&self) -> RuntimeKind {
        self.manager.runtime().runtime()
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("functions", &self.functions)
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

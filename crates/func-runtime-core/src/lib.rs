//! Dispatch engine for func-runtime.
//!
//! This crate holds everything between a decoded trigger and a user handler:
//! - [`Registry`]: Named, immutable function entries
//! - [`InvocationContext`]: Per-invocation state and the [`Out`] result
//! - [`PluginPipeline`]: Ordered pre- and post-hooks
//! - [`RuntimeManager`]: Runs hooks and handler under the panic guard
//! - [`OutputTransport`]: Seam for sending to declared outputs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       Registry                          │
//! │  (Built before serving, read-only afterwards)           │
//! │  - FunctionEntry: name, path, methods, handler          │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                    RuntimeManager                       │
//! │  (Shared by all adapters)                               │
//! │  - RuntimeContext snapshot                              │
//! │  - PluginPipeline                                       │
//! │  - Output transport, shutdown token                     │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  InvocationContext                      │
//! │  (Per-trigger, never shared)                            │
//! │  - Request / event payload, path variables              │
//! │  - Result and error                                     │
//! │  - Cancellation token, plugin extensions                │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod event;
pub mod function;
pub mod guard;
pub mod manager;
pub mod plugin;
pub mod registry;
pub mod transport;

pub use context::{HttpRequest, InvocationContext, Out, PathVars, ResponseWriter, StatusKind};
pub use event::{BindingMessage, CloudEvent, EventPayload};
pub use function::{
    CloudEventFunction, FunctionBuilder, FunctionEntry, Handler, HttpFunction, OpenFunction,
    TriggerKind, path_variables,
};
pub use guard::{CatchPanic, catch_panic};
pub use manager::RuntimeManager;
pub use plugin::{Plugin, PluginCatalog, PluginPipeline};
pub use registry::Registry;
pub use transport::OutputTransport;

pub use tokio_util::sync::CancellationToken;

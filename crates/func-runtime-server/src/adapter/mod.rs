//! Trigger adapters.
//!
//! One adapter per transport. Each builds an invocation context from its
//! native trigger, runs the pipeline through the shared
//! [`RuntimeManager`](func_runtime_core::RuntimeManager) and translates the
//! outcome into the transport's own reply.
//!
//! - [`http`]: Synchronous HTTP requests
//! - [`cloudevent`]: CloudEvents delivered over HTTP
//! - [`binding`]: Messages from async bindings and pub/sub

pub mod binding;
pub mod cloudevent;
pub mod http;

//! Common types, errors, and configuration for func-runtime.
//!
//! This crate provides shared functionality used across the func-runtime workspace:
//! - Error types using `thiserror` for every startup and per-invocation failure
//! - The [`RuntimeContext`] configuration snapshot and its sources
//! - TOML configuration file structures

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{
    ComponentKind, ComponentSpec, FUNC_CONTEXT_ENV, FUNCTION_TARGET_ENV, RuntimeContext,
    RuntimeKind,
};
pub use config_file::{ConfigFile, ServerConfigFile, TransportConfig};
pub use error::{
    ConfigError, CrashError, DispatchError, FrameworkError, FunctionError, HookError, HookStage,
    InvocationError, RegistrationError, TransportError,
};

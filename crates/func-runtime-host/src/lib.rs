//! Collaborators provided to functions by func-runtime.
//!
//! # Plugins
//!
//! - [`plugins`]: Built-in plugins registered ahead of custom ones
//!
//! # Transports
//!
//! - [`transport`]: Output transports behind [`InvocationContext::send`]
//!
//! [`InvocationContext::send`]: func_runtime_core::InvocationContext::send

pub mod plugins;
pub mod transport;

pub use plugins::{EXAMPLE_PLUGIN, ExamplePlugin, InvocationSeq, LOGGING_PLUGIN, LoggingPlugin, builtin_plugins};
pub use transport::{ChannelSource, ChannelTransport, DaprTransport, channel_broker};

//! Trigger adapters and serving for func-runtime.
//!
//! This crate connects registered functions to the outside world. It handles:
//!
//! - HTTP request routing, with `{name}` path variables and method filters
//! - CloudEvents over HTTP (binary and structured mode)
//! - Async binding delivery, pushed by a sidecar or pulled from a channel
//! - Health, readiness and subscription endpoints
//! - Target selection through `FUNCTION_TARGET`
//!
//! # Quick Start
//!
//! ```ignore
//! use func_runtime_common::RuntimeContext;
//! use func_runtime_core::FunctionEntry;
//! use func_runtime_server::Framework;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut framework = Framework::new(RuntimeContext::default());
//!     framework.register(FunctionEntry::builder("hello").path("/hello").http(Hello).build()?)?;
//!
//!     framework.start().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod cloudevent;
pub mod framework;
pub mod handler;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod state;

pub use framework::Framework;
pub use response::{FUNCTION_STATUS_HEADER, FunctionResponse, FunctionStatus};
pub use server::{FunctionServer, ServerConfig, TestHandle};
pub use state::AppState;

//! Output transport abstraction.
//!
//! The transport is the only two-way channel available to async binding
//! functions. Implementations live in the host crate; the core only forwards
//! [`InvocationContext::send`](crate::InvocationContext::send) calls to it.

use async_trait::async_trait;
use bytes::Bytes;

use func_runtime_common::{ComponentSpec, TransportError};

/// A shared handle that delivers payloads to declared outputs.
///
/// Shared by every concurrent invocation; implementations must be safe to
/// call concurrently.
#[async_trait]
pub trait OutputTransport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Deliver `data` to the output `output`, described by `component`.
    async fn send(
        &self,
        output: &str,
        component: &ComponentSpec,
        data: Bytes,
    ) -> Result<Bytes, TransportError>;
}

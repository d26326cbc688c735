//! HTTP server implementation.
//!
//! This module provides [`FunctionServer`], which serves a router built by
//! the [`Framework`](crate::Framework) and, in async mode, drives the
//! in-process message consumer next to it.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use func_runtime_common::{ConfigError, FrameworkError, ServerConfigFile};
use func_runtime_core::{FunctionEntry, RuntimeManager};
use func_runtime_host::ChannelSource;

use crate::adapter::binding::run_consumer;
use crate::state::DEFAULT_BODY_LIMIT;

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server.
    pub bind_addr: SocketAddr,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Enable graceful shutdown on SIGTERM/SIGINT.
    pub graceful_shutdown: bool,
    /// Maximum buffered request body.
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            request_timeout_secs: 30,
            graceful_shutdown: true,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Build from the `[server]` section and the runtime context's port.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not an IP address.
    pub fn from_file(file: &ServerConfigFile, port: u16) -> Result<Self, ConfigError> {
        let host: IpAddr = file
            .host
            .parse()
            .map_err(|e| ConfigError::invalid_value("server.host", format!("{e}")))?;

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            request_timeout_secs: file.request_timeout_secs,
            graceful_shutdown: file.graceful_shutdown,
            body_limit: file.body_limit_bytes,
        })
    }

    /// Create a new server config with custom bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Create a new server config with custom timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Get the request timeout as Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// In-process consumer to run alongside the HTTP listener.
pub(crate) struct Consumer {
    pub(crate) manager: RuntimeManager,
    pub(crate) entry: Arc<FunctionEntry>,
    pub(crate) source: ChannelSource,
}

/// A bound, ready-to-serve runtime.
///
/// Created by [`Framework::build_server`](crate::Framework::build_server).
pub struct FunctionServer {
    app: Router,
    config: ServerConfig,
    shutdown: CancellationToken,
    consumer: Option<Consumer>,
}

impl FunctionServer {
    pub(crate) fn new(
        app: Router,
        config: ServerConfig,
        shutdown: CancellationToken,
        consumer: Option<Consumer>,
    ) -> Self {
        Self {
            app,
            config,
            shutdown,
            consumer,
        }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The router being served.
    pub fn router(&self) -> &Router {
        &self.app
    }

    /// Token cancelled when the server shuts down. Every invocation's
    /// cancellation token is a child of it.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    fn spawn_consumer(&mut self) -> Option<JoinHandle<()>> {
        self.consumer.take().map(|c| {
            tokio::spawn(run_consumer(
                c.manager,
                c.entry,
                c.source,
                self.shutdown.clone(),
            ))
        })
    }

    /// Run the server until shutdown.
    ///
    /// With graceful shutdown enabled this returns after SIGTERM/SIGINT,
    /// once in-flight requests have drained.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind to the address.
    pub async fn run(mut self) -> Result<(), FrameworkError> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| FrameworkError::server(format!("Failed to bind {}: {e}", self.config.bind_addr)))?;

        info!(addr = %self.config.bind_addr, "Starting HTTP server");

        let consumer = self.spawn_consumer();
        let shutdown = self.shutdown.clone();

        let result = if self.config.graceful_shutdown {
            axum::serve(listener, self.app)
                .with_graceful_shutdown(async move {
                    shutdown_signal().await;
                    shutdown.cancel();
                })
                .await
        } else {
            axum::serve(listener, self.app).await
        };

        self.shutdown.cancel();
        if let Some(consumer) = consumer {
            let _ = consumer.await;
        }

        result.map_err(|e| FrameworkError::server(format!("Server error: {e}")))?;

        info!("Server shutdown complete");
        Ok(())
    }

    /// Start the server and return a handle for testing.
    ///
    /// The server binds to an ephemeral port (127.0.0.1:0) and
    /// returns a handle that can be used to get the actual address
    /// and shut down the server.
    pub async fn start_test(mut self) -> Result<TestHandle, FrameworkError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| FrameworkError::server(format!("Failed to bind: {e}")))?;

        let addr = listener
            .local_addr()
            .map_err(|e| FrameworkError::server(format!("Failed to get addr: {e}")))?;

        let consumer = self.spawn_consumer();
        let shutdown = self.shutdown.clone();
        let signal = shutdown.clone();
        let app = self.app;

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        Ok(TestHandle {
            addr,
            shutdown,
            handle,
            consumer,
        })
    }
}

/// Handle for a test server instance.
///
/// Use this to interact with and shut down a test server.
pub struct TestHandle {
    /// The address the server is bound to.
    addr: SocketAddr,
    /// Cancels serving, the consumer and in-flight invocations.
    shutdown: CancellationToken,
    /// Server task handle.
    handle: JoinHandle<Result<(), std::io::Error>>,
    /// Consumer task handle, in async mode with a channel source.
    consumer: Option<JoinHandle<()>>,
}

impl TestHandle {
    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the server URL.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shutdown the server gracefully.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
        if let Some(consumer) = self.consumer {
            let _ = consumer.await;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

//! Process-level entry point.
//!
//! [`Framework`] owns the registry and plugin catalog for one process. Once
//! everything is registered, [`Framework::start`] selects the functions to
//! serve, resolves the plugin pipeline and serves them until shutdown.
//!
//! Selection follows `FUNCTION_TARGET`:
//!
//! - set: only the named function is bound; an unknown name fails startup
//! - unset: every registered function is bound, except that the async
//!   runtime accepts exactly one

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use func_runtime_common::{
    ConfigError, ConfigFile, DispatchError, FUNCTION_TARGET_ENV, FrameworkError,
    RegistrationError, RuntimeContext, RuntimeKind, ServerConfigFile, TransportConfig,
};
use func_runtime_core::{
    FunctionEntry, OutputTransport, Plugin, PluginCatalog, PluginPipeline, Registry,
    RuntimeManager, TriggerKind,
};
use func_runtime_host::{ChannelSource, DaprTransport, builtin_plugins};

use crate::router::{build_async_router, build_http_router};
use crate::server::{Consumer, FunctionServer, ServerConfig, TestHandle};
use crate::state::AppState;

/// Registry, plugin catalog and configuration of one runtime process.
pub struct Framework {
    runtime: RuntimeContext,
    registry: Registry,
    catalog: PluginCatalog,
    server: ServerConfigFile,
    transport_config: TransportConfig,
    transport: Option<Arc<dyn OutputTransport>>,
    channel: Option<ChannelSource>,
    shutdown: CancellationToken,
}

impl Framework {
    /// Create a framework for `runtime` with the built-in plugins available.
    pub fn new(runtime: RuntimeContext) -> Self {
        let mut catalog = PluginCatalog::new();
        for plugin in builtin_plugins() {
            catalog.register(plugin);
        }

        Self {
            runtime,
            registry: Registry::new(),
            catalog,
            server: ServerConfigFile::default(),
            transport_config: TransportConfig::default(),
            transport: None,
            channel: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a framework from a config file.
    ///
    /// `FUNC_CONTEXT` takes precedence over the file's `[function]` section.
    ///
    /// # Errors
    ///
    /// Returns an error if no runtime context is available or it is invalid.
    pub fn from_config(config: &ConfigFile) -> Result<Self, ConfigError> {
        let runtime = config.runtime_context(RuntimeContext::from_env()?)?;

        Ok(Self::new(runtime)
            .with_server_config(config.server.clone())
            .with_transport_config(config.transport.clone()))
    }

    /// Set the `[server]` configuration.
    pub fn with_server_config(mut self, server: ServerConfigFile) -> Self {
        self.server = server;
        self
    }

    /// Set the sidecar transport configuration.
    pub fn with_transport_config(mut self, transport: TransportConfig) -> Self {
        self.transport_config = transport;
        self
    }

    /// Use `transport` for output sends instead of the sidecar.
    pub fn with_transport(mut self, transport: Arc<dyn OutputTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Consume messages from `source` in the async runtime.
    pub fn with_channel_source(mut self, source: ChannelSource) -> Self {
        self.channel = Some(source);
        self
    }

    pub fn runtime(&self) -> &RuntimeContext {
        &self.runtime
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn plugins(&self) -> &PluginCatalog {
        &self.catalog
    }

    /// Register a function.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::DuplicateName`] if the name is taken.
    pub fn register(&mut self, entry: FunctionEntry) -> Result<(), RegistrationError> {
        self.registry.register(entry)
    }

    /// Add custom plugins to the catalog.
    ///
    /// A plugin whose name is already known is skipped.
    pub fn register_plugins(&mut self, plugins: impl IntoIterator<Item = Arc<dyn Plugin>>) {
        for plugin in plugins {
            let name = plugin.name().to_string();
            if !self.catalog.register(plugin) {
                warn!(plugin = %name, "Plugin already registered, keeping the existing one");
            }
        }
    }

    /// Select the entries to bind.
    ///
    /// `target` is the explicit function name, if any; an empty name counts
    /// as unset.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] if nothing can be served, the target is
    /// unknown, or the async runtime would bind anything other than a single
    /// async-binding function.
    pub fn resolve_targets(
        &self,
        target: Option<&str>,
    ) -> Result<Vec<Arc<FunctionEntry>>, DispatchError> {
        if self.registry.is_empty() {
            return Err(DispatchError::NoFunctions);
        }

        let entries = match target.filter(|name| !name.is_empty()) {
            Some(name) => {
                let entry = self
                    .registry
                    .lookup(name)
                    .ok_or_else(|| DispatchError::TargetNotFound {
                        name: name.to_string(),
                    })?;
                info!(function = name, "Serving target function");
                vec![entry]
            }
            None => {
                info!(functions = ?self.registry.list_names(), "No target set, serving all functions");
                self.registry.entries().to_vec()
            }
        };

        let runtime = self.runtime.runtime();
        if runtime == RuntimeKind::AsyncServing {
            if entries.len() > 1 {
                return Err(DispatchError::TooManyFunctions {
                    count: entries.len(),
                });
            }
            if let Some(entry) = entries
                .iter()
                .find(|e| e.trigger_kind() != TriggerKind::AsyncBinding)
            {
                return Err(DispatchError::UnsupportedTrigger {
                    name: entry.name().to_string(),
                    trigger: entry.trigger_kind().to_string(),
                    runtime: runtime.to_string(),
                });
            }
        }

        Ok(entries)
    }

    /// Bind the selected functions and build a server for them.
    ///
    /// # Errors
    ///
    /// Returns an error if target resolution, route binding or transport
    /// setup fails.
    pub fn build_server(self, target: Option<&str>) -> Result<FunctionServer, FrameworkError> {
        let entries = self.resolve_targets(target)?;
        let config = ServerConfig::from_file(&self.server, self.runtime.port())?;

        let Self {
            runtime,
            catalog,
            transport_config,
            transport,
            channel,
            shutdown,
            ..
        } = self;

        let pipeline = PluginPipeline::resolve(&catalog, runtime.pre_plugins(), runtime.post_plugins());

        let transport = match transport {
            Some(transport) => Some(transport),
            None if runtime.has_outputs() => {
                let dapr = DaprTransport::new(&transport_config)?;
                info!(sidecar = %dapr.base_url(), "Using sidecar output transport");
                Some(Arc::new(dapr) as Arc<dyn OutputTransport>)
            }
            None => None,
        };

        let runtime = Arc::new(runtime);
        let mut manager =
            RuntimeManager::new(runtime.clone(), Arc::new(pipeline)).with_shutdown(shutdown.clone());
        if let Some(transport) = transport {
            manager = manager.with_transport(transport);
        }

        let names = entries.iter().map(|e| e.name().to_string()).collect();
        let state = AppState::new(manager.clone(), names).with_body_limit(config.body_limit);
        let timeout = config.request_timeout();

        let (app, consumer) = match runtime.runtime() {
            RuntimeKind::HttpServing => {
                if channel.is_some() {
                    warn!("Channel source ignored by the HTTP runtime");
                }
                let app = build_http_router(state, &entries, runtime.http_pattern(), timeout)?;
                (app, None)
            }
            RuntimeKind::AsyncServing => {
                let entry = entries
                    .into_iter()
                    .next()
                    .ok_or(DispatchError::NoFunctions)?;
                let app = build_async_router(state, entry.clone(), runtime.http_pattern(), timeout)?;
                let consumer = channel.map(|source| Consumer {
                    manager,
                    entry,
                    source,
                });
                (app, consumer)
            }
        };

        info!(runtime = %runtime.runtime(), "Functions bound");
        Ok(FunctionServer::new(app, config, shutdown, consumer))
    }

    /// Serve until shutdown, selecting functions with `FUNCTION_TARGET`.
    ///
    /// # Errors
    ///
    /// Returns startup errors before anything is served, or a server error.
    pub async fn start(self) -> Result<(), FrameworkError> {
        let target = std::env::var(FUNCTION_TARGET_ENV).ok();
        self.run(target.as_deref()).await
    }

    /// Serve until shutdown with an explicit target.
    ///
    /// # Errors
    ///
    /// Returns startup errors before anything is served, or a server error.
    pub async fn run(self, target: Option<&str>) -> Result<(), FrameworkError> {
        self.build_server(target)?.run().await
    }

    /// Serve on an ephemeral port for tests.
    ///
    /// # Errors
    ///
    /// Returns startup errors, or an error if binding fails.
    pub async fn start_test(self, target: Option<&str>) -> Result<TestHandle, FrameworkError> {
        self.build_server(target)?.start_test().await
    }
}

impl std::fmt::Debug for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framework")
            .field("runtime", &self.runtime.runtime())
            .field("functions", &self.registry.list_names())
            .field("plugins", &self.catalog)
            .finish_non_exhaustive()
    }
}

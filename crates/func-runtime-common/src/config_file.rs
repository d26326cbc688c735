//! Configuration file structures for the func-runtime.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ServerConfigFile`]: HTTP server settings
//! - [`TransportConfig`]: Output transport (sidecar) settings
//!
//! The optional `[function]` section holds a [`RuntimeContext`]; when the
//! `FUNC_CONTEXT` environment variable is set it takes precedence.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, FUNC_CONTEXT_ENV, RuntimeContext};

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [server]
/// host = "0.0.0.0"
/// request_timeout_secs = 30
///
/// [transport]
/// sidecar_url = "http://127.0.0.1:3500"
/// timeout_ms = 5000
///
/// [function]
/// name = "hello"
/// runtime = "Knative"
/// port = "8080"
/// prePlugins = ["plugin-example"]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfigFile,

    /// Output transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Runtime context used when `FUNC_CONTEXT` is not set.
    #[serde(default)]
    pub function: Option<RuntimeContext>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::parse("config file", e.to_string()))?;
        if let Some(function) = &config.function {
            function.validate()?;
        }
        Ok(config)
    }

    /// Resolve the runtime context.
    ///
    /// `env_context` is the already-parsed `FUNC_CONTEXT` value, if any; it
    /// wins over the `[function]` section.
    pub fn runtime_context(
        &self,
        env_context: Option<RuntimeContext>,
    ) -> Result<RuntimeContext, ConfigError> {
        env_context
            .or_else(|| self.function.clone())
            .ok_or_else(|| ConfigError::MissingContext {
                variable: FUNC_CONTEXT_ENV.to_string(),
            })
    }
}

/// HTTP server configuration from config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfigFile {
    /// Host to bind; the port comes from the runtime context.
    #[serde(default = "defaults::host")]
    pub host: String,

    /// Request timeout in seconds.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Enable graceful shutdown.
    #[serde(default = "defaults::graceful_shutdown")]
    pub graceful_shutdown: bool,

    /// Maximum accepted request body size.
    #[serde(default = "defaults::body_limit_bytes")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfigFile {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            request_timeout_secs: defaults::request_timeout_secs(),
            graceful_shutdown: defaults::graceful_shutdown(),
            body_limit_bytes: defaults::body_limit_bytes(),
        }
    }
}

/// Output transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Base URL of the sidecar that owns bindings and pub/sub.
    #[serde(default = "defaults::sidecar_url")]
    pub sidecar_url: String,

    /// Per-send timeout in milliseconds.
    #[serde(default = "defaults::transport_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            sidecar_url: defaults::sidecar_url(),
            timeout_ms: defaults::transport_timeout_ms(),
        }
    }
}

impl TransportConfig {
    /// Get the send timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Default value functions for serde.
mod defaults {
    pub fn host() -> String {
        "0.0.0.0".to_string()
    }

    pub const fn request_timeout_secs() -> u64 {
        30
    }

    pub const fn graceful_shutdown() -> bool {
        true
    }

    pub const fn body_limit_bytes() -> usize {
        10 * 1024 * 1024
    }

    pub fn sidecar_url() -> String {
        "http://127.0.0.1:3500".to_string()
    }

    pub const fn transport_timeout_ms() -> u64 {
        5000
    }
}

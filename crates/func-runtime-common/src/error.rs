//! Error types for the func-runtime.
//!
//! This module defines a hierarchy of error types using `thiserror`.
//!
//! Startup-class errors stop the process before any trigger is served:
//! - [`RegistrationError`]: Function registration failures
//! - [`ConfigError`]: Missing or invalid runtime configuration
//! - [`DispatchError`]: Target resolution and binding failures
//!
//! Per-invocation errors are recorded on the invocation and reported through
//! the trigger's protocol:
//! - [`HookError`]: A plugin hook failed
//! - [`FunctionError`]: The user handler reported an error
//! - [`CrashError`]: The user handler panicked
//! - [`InvocationError`]: Any of the above, as stored on the invocation
//!
//! [`TransportError`] covers the output transport used by `send`.

use std::fmt;
use std::io;

use thiserror::Error;

/// Errors raised while registering a function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// A function with the same name is already registered.
    #[error("Function already registered: {name}")]
    DuplicateName {
        /// The conflicting function name.
        name: String,
    },

    /// The function has no handler of a recognized shape.
    #[error("Unrecognized function '{name}': {reason}")]
    UnrecognizedFunction {
        /// The function name.
        name: String,
        /// Why the handler was not recognized.
        reason: String,
    },

    /// The function name is empty or malformed.
    #[error("Invalid function name: '{name}'")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// The function path pattern is malformed.
    #[error("Invalid path pattern '{path}': {reason}")]
    InvalidPath {
        /// The rejected pattern.
        path: String,
        /// Description of the problem.
        reason: String,
    },
}

impl RegistrationError {
    /// Create a new `UnrecognizedFunction` error.
    pub fn unrecognized(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnrecognizedFunction {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidPath` error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Runtime configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No runtime context was supplied.
    #[error("Runtime context not found: set {variable} or provide a [function] section")]
    MissingContext {
        /// The environment variable that was consulted.
        variable: String,
    },

    /// The runtime context or config file could not be parsed.
    #[error("Failed to parse {source_name}: {message}")]
    Parse {
        /// Where the configuration came from.
        source_name: String,
        /// Parser error message.
        message: String,
    },

    /// A configuration value is out of range or malformed.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Description of the problem.
        reason: String,
    },

    /// Failed to read a configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ConfigError {
    /// Create a new `InvalidValue` error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `Parse` error.
    pub fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while selecting and binding functions at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The explicitly requested target is not registered.
    #[error("Function not found: {name}")]
    TargetNotFound {
        /// The requested target name.
        name: String,
    },

    /// The async runtime can bind only one function per process.
    #[error("Only one function is allowed in async runtime, found {count}")]
    TooManyFunctions {
        /// Number of functions that would have been bound.
        count: usize,
    },

    /// The function's trigger kind cannot be served by the configured runtime.
    #[error("Function '{name}' with trigger '{trigger}' cannot be served by the {runtime} runtime")]
    UnsupportedTrigger {
        /// The function name.
        name: String,
        /// The function's trigger kind.
        trigger: String,
        /// The configured runtime kind.
        runtime: String,
    },

    /// Two functions claim the same path and method.
    #[error("Route conflict on '{path}' ({method}): '{existing}' and '{incoming}'")]
    RouteConflict {
        /// The path pattern.
        path: String,
        /// The method, or `*` for any method.
        method: String,
        /// The function that claimed the route first.
        existing: String,
        /// The function that tried to claim it again.
        incoming: String,
    },

    /// Nothing is registered, so nothing can be served.
    #[error("No functions registered")]
    NoFunctions,
}

/// The stage a plugin hook ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    /// Before the handler.
    Pre,
    /// After the handler.
    Post,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookStage::Pre => write!(f, "pre"),
            HookStage::Post => write!(f, "post"),
        }
    }
}

/// A plugin hook failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Plugin '{plugin}' {stage}-hook failed: {message}")]
pub struct HookError {
    /// Name of the failing plugin.
    pub plugin: String,
    /// Stage the hook ran in.
    pub stage: HookStage,
    /// Description of the failure.
    pub message: String,
}

impl HookError {
    /// Create a new hook error.
    pub fn new(plugin: impl Into<String>, stage: HookStage, message: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            stage,
            message: message.into(),
        }
    }
}

/// Errors from the output transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The deployment declares no outputs, so no transport is bound.
    #[error("No output transport bound to this invocation")]
    NoOutputs,

    /// The named output is not declared by the deployment.
    #[error("Output not found: {name}")]
    UnknownOutput {
        /// The requested output name.
        name: String,
    },

    /// The request to the transport failed before a response arrived.
    #[error("Send to '{target}' failed: {reason}")]
    Request {
        /// The output name.
        target: String,
        /// Description of the failure.
        reason: String,
    },

    /// The transport answered with a non-success status.
    #[error("Send to '{target}' rejected with status {status}")]
    Status {
        /// The output name.
        target: String,
        /// The status returned by the transport.
        status: u16,
    },

    /// The transport has been shut down.
    #[error("Transport closed")]
    Closed,
}

/// An error reported by a user handler.
#[derive(Error, Debug)]
pub enum FunctionError {
    /// The handler failed with a message.
    #[error("{0}")]
    Failed(String),

    /// An output send failed inside the handler.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Any other error type raised by user code.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl FunctionError {
    /// Create a new `Failed` error.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A recovered handler panic.
#[derive(Error, Debug, Clone)]
#[error("Function panic: {message}")]
pub struct CrashError {
    /// The panic payload rendered as text.
    pub message: String,
    /// Source location of the panic, if known.
    pub location: Option<String>,
    /// Captured stack trace, for the operational log only.
    pub stack: Option<String>,
}

impl CrashError {
    /// Create a crash error without diagnostics.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            stack: None,
        }
    }
}

/// The error recorded on an invocation.
#[derive(Error, Debug)]
pub enum InvocationError {
    /// A plugin hook failed.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// The handler returned an error.
    #[error(transparent)]
    Handler(#[from] FunctionError),

    /// The handler panicked.
    #[error(transparent)]
    Crash(#[from] CrashError),
}

impl InvocationError {
    /// Returns `true` if this error is a recovered panic.
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::Crash(_))
    }

    /// Returns `true` if this error came from a plugin hook.
    pub fn is_hook(&self) -> bool {
        matches!(self, Self::Hook(_))
    }
}

/// Top-level errors surfaced by the framework before or while serving.
#[derive(Error, Debug)]
pub enum FrameworkError {
    /// Function registration failed.
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Runtime configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Target resolution or binding failed.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Serving failed.
    #[error("Server error: {reason}")]
    Server {
        /// Description of the failure.
        reason: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FrameworkError {
    /// Create a new `Server` error.
    pub fn server(reason: impl Into<String>) -> Self {
        Self::Server {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error happened before serving started.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::Registration(_) | Self::Config(_) | Self::Dispatch(_)
        )
    }
}

//! Dispatcher error types

use std::fmt;

use thiserror::Error;

/// Bounded resource that ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Ready queue of an instance
    ReadyQueue,
    /// Pending-work arena of an instance
    PendingSet,
    /// Module table of an instance
    ModuleTable,
    /// Dispatcher table of the registry
    DispatcherTable,
    /// OS thread for the worker
    WorkerThread,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::ReadyQueue => "ready queue",
            Resource::PendingSet => "pending set",
            Resource::ModuleTable => "module table",
            Resource::DispatcherTable => "dispatcher table",
            Resource::WorkerThread => "worker thread",
        };
        f.write_str(name)
    }
}

/// Coarse status class of a [`DispatcherError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadParameter,
    ResourceExhausted,
    NotSupported,
    Timeout,
    TooLate,
    Callback,
}

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Invalid, stale or deregistered handle, bad name, oversized payload
    #[error("bad parameter: {message}")]
    BadParameter { message: String },

    /// Queue, arena or thread could not be obtained
    #[error("{resource} exhausted: {message}")]
    ResourceExhausted { resource: Resource, message: String },

    /// Operation invalid in the current state
    #[error("not supported: {message}")]
    NotSupported { message: String },

    /// Bounded `post` wait expired
    #[error("timed out after {waited_ms}ms waiting for queue space")]
    Timeout { waited_ms: u64 },

    /// Cancel raced a work item that is already ready, executing or retired
    #[error("too late: {message}")]
    TooLate { message: String },

    /// Module callback reported a failure
    #[error("module '{module}' callback failed: {message}")]
    Callback { module: String, message: String },

    /// Contract error (config, payload)
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    pub fn bad_parameter(message: impl Into<String>) -> Self {
        Self::BadParameter {
            message: message.into(),
        }
    }

    pub fn exhausted(resource: Resource, message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            resource,
            message: message.into(),
        }
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    pub fn too_late(message: impl Into<String>) -> Self {
        Self::TooLate {
            message: message.into(),
        }
    }

    /// Create a module-side failure, for use inside callbacks
    pub fn callback(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Callback {
            module: module.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadParameter { .. } => ErrorKind::BadParameter,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::NotSupported { .. } => ErrorKind::NotSupported,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::TooLate { .. } => ErrorKind::TooLate,
            Self::Callback { .. } => ErrorKind::Callback,
            // Payload and config violations are caller input errors.
            Self::Contract(_) => ErrorKind::BadParameter,
        }
    }
}

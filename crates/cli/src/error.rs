//! Error types for CLI operations.

use dispatcher::DispatcherError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration names a dispatcher that does not exist
    #[error("Unknown dispatcher '{name}'")]
    UnknownDispatcher { name: String },

    /// Bringing up or using the dispatchers failed
    #[error("Dispatcher error during {stage}: {source}")]
    Dispatcher {
        stage: &'static str,
        #[source]
        source: DispatcherError,
    },

    /// Graceful shutdown error
    #[error("Error during shutdown: {message}")]
    Shutdown { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn unknown_dispatcher(name: impl Into<String>) -> Self {
        Self::UnknownDispatcher { name: name.into() }
    }

    pub fn dispatcher(stage: &'static str, source: DispatcherError) -> Self {
        Self::Dispatcher { stage, source }
    }

    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::Shutdown {
            message: message.into(),
        }
    }
}

//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::logging::LoggingError;
use ircbus_core::{DispatchError, ModuleError};

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating the configuration failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The log subscriber could not be set up.
    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    /// A module could not be loaded at startup.
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    /// A handler failed and the loop is configured to stop on handler errors.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// The consumer thread could not be spawned.
    #[error("Failed to spawn consumer thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The consumer thread panicked.
    #[error("Consumer thread panicked")]
    ConsumerPanicked,

    /// The blocking task driving the loop was cancelled or panicked.
    #[error("Consumer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

//! Configuration for the ircbus runtime.
//!
//! Layered loading (defaults, files, environment) and validation of the
//! logging, event-loop and connection settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, PROFILE_ENV, load_config, load_config_from_file};
pub use schema::{
    ConnectionConfig, EventLoopConfig, IrcbusConfig, LogFormat, LogLevel, LogOutput,
    LoggingConfig, SpanEventConfig,
};
pub use validation::validate_config;

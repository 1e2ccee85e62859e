//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ConnectionConfig, EventLoopConfig, IrcbusConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &IrcbusConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_event_loop_config(&config.event_loop)?;
    if let Some(ref connection) = config.connection {
        validate_connection_config(connection)?;
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.filters.keys().any(|target| target.is_empty()) {
        return Err(ConfigError::validation("Log filter targets cannot be empty"));
    }

    Ok(())
}

fn validate_event_loop_config(event_loop: &EventLoopConfig) -> ConfigResult<()> {
    if event_loop.fetch_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "Fetch timeout must be greater than 0",
        ));
    }

    if event_loop.thread_name.is_empty() {
        return Err(ConfigError::missing_field("event_loop.thread_name"));
    }

    // std::thread::Builder rejects names with interior NULs.
    if event_loop.thread_name.contains('\0') {
        return Err(ConfigError::validation(
            "Thread name cannot contain NUL bytes",
        ));
    }

    Ok(())
}

fn validate_connection_config(connection: &ConnectionConfig) -> ConfigResult<()> {
    if connection.host.is_empty() {
        return Err(ConfigError::missing_field("connection.host"));
    }

    if connection.host.contains(char::is_whitespace) {
        return Err(ConfigError::validation("Host cannot contain whitespace"));
    }

    if connection.port == 0 {
        return Err(ConfigError::InvalidPort(connection.port));
    }

    Ok(())
}

//! ircbus Runtime - configuration, logging and the consumer loop.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `IrcbusConfig`)
//! - Logging setup (`LoggingBuilder`, `SpanEvents`)
//! - The single consumer thread that drains the event queue (`EventLoop`)
//! - Runtime orchestration (`IrcbusRuntime`)
//!
//! ```rust,ignore
//! use ircbus_runtime::IrcbusRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Loads ircbus.toml, initializes logging, installs registered packages
//!     let runtime = IrcbusRuntime::builder().build()?;
//!
//!     // Dispatch until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod event_loop;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, EventLoopConfig, IrcbusConfig, LoggingConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use event_loop::{EventLoop, EventLoopHandle, LoopStats};
pub use logging::{LoggingBuilder, LoggingError, SpanEvents};
pub use runtime::{IrcbusRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, span, trace, warn};
}

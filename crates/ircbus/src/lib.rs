//! # ircbus
//!
//! The event-dispatch core of a modular chat-protocol toolkit.
//!
//! ## Overview
//!
//! Independent pieces of protocol logic (connection handling, message parsing,
//! command handling) cooperate through one [`Irc`](core::Irc) context. They
//! post events, attach handlers to event identifiers, and look up each other's
//! capabilities by interface type, without knowing who implements them.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  post   ┌─────────────┐  fetch  ┌───────────┐  emit  ┌──────────────┐
//! │ producers │────────▶│ event queue │────────▶│ EventLoop │───────▶│ handler      │
//! │ (modules) │         └─────────────┘         │ (1 thread)│        │ chains by id │
//! └───────────┘                                 └───────────┘        └──────────────┘
//! ```
//!
//! - **Core**: identifiers, events, signals, modules and the queue
//! - **Runtime**: configuration, logging and the consumer loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ircbus::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = IrcbusRuntime::builder().build()?;
//!
//!     runtime.irc().connect(ConnectionEvent::MessageReceived, |event: &Event| {
//!         if let Ok(ReceivedLine(line)) = event.data().get::<ReceivedLine>() {
//!             info!(%line, "received");
//!         }
//!     });
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use ircbus_core as core;
pub use ircbus_runtime as runtime;

pub use ircbus_core::{default_implementation, event_codes};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use ircbus::prelude::*;
/// ```
pub mod prelude {
    // Core dispatch types
    pub use ircbus_core::prelude::*;
    pub use ircbus_core::{PACKAGES, Package, linkme};

    // Runtime - main entry point
    pub use ircbus_runtime::{EventLoop, IrcbusConfig, IrcbusRuntime, LoopStats};

    // Logging macros
    pub use ircbus_runtime::prelude::*;
}

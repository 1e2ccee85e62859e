//! The connection capability.
//!
//! Transport modules implement [`Connection`] and report their progress by
//! posting events tagged with [`ConnectionEvent`] identifiers. Every state
//! change is followed by [`ConnectionEvent::ConnectionStatusChanged`] on the
//! same event, so one handler can observe all transitions.

use crate::error::ModuleResult;
use crate::modules::connection::ConnectionModule;

crate::event_codes! {
    /// Identifiers posted by connection modules.
    pub enum ConnectionEvent {
        /// A connection attempt started.
        Connecting,
        /// A connection attempt failed.
        ConnectingFailed,
        /// The connection is established.
        Connected,
        /// The connection is being closed.
        Disconnecting,
        /// The connection is closed.
        Disconnected,
        /// Follows every state change.
        ConnectionStatusChanged,
        /// A line arrived from the server.
        MessageReceived,
    }
}

/// A connection to one chat server.
pub trait Connection: Send + Sync {
    /// Starts connecting. An existing connection is closed first.
    fn connect(&self) -> ModuleResult<()>;

    /// Closes the connection, if any.
    fn disconnect(&self) -> ModuleResult<()>;

    /// Queues `data` for sending.
    fn send(&self, data: &str) -> ModuleResult<()>;

    /// The current state: one of `Connecting`, `Connected`, `Disconnecting`
    /// or `Disconnected`.
    fn state(&self) -> ConnectionEvent;
}

crate::default_implementation!(dyn Connection => ConnectionModule);

/// Attached to every state-change event posted by a connection module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// The state before the change.
    pub previous: ConnectionEvent,
    /// The state after the change.
    pub current: ConnectionEvent,
}

/// Attached to every [`ConnectionEvent::MessageReceived`] event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedLine(pub String);

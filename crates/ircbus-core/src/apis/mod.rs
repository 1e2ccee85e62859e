//! Capability interfaces.

pub mod connection;

pub use connection::{Connection, ConnectionEvent, ReceivedLine, StatusChange};

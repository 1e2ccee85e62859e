//! Default capability implementations.

pub mod connection;

pub use connection::ConnectionModule;

//! # ircbus Core
//!
//! The in-process event-dispatch core of the ircbus chat-protocol toolkit.
//!
//! Independently written pieces of protocol logic cooperate through one
//! [`Irc`] context without knowing about each other:
//!
//! - **Identifiers**: [`EventId`] pairs a capability group with a code and
//!   names both "what happened" and "which handler chain runs".
//! - **Events**: an [`Event`] carries a causal lineage, a re-routable queue of
//!   pending identifiers, and a [`ComponentMap`] of ambient data.
//! - **Signals**: handler chains keyed by identifier, ordered by [`Placement`]
//!   and detachable through a [`ConnectionHandle`].
//! - **Modules**: at most one loaded [`Module`] per capability [`Interface`],
//!   with default-implementation resolution.
//! - **Queue**: a cross-thread, two-ended handoff queue drained by a single
//!   consumer thread.
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────┐  post_*   ┌────────────┐  fetch_event  ┌──────────┐
//! │ producer │──────────▶│ EventQueue │──────────────▶│ consumer │
//! └──────────┘           └────────────┘               └────┬─────┘
//!       ▲                                                  │ emit
//!       │ spawn + post                                     ▼
//! ┌─────┴──────┐   push_front / push_back           ┌──────────────┐
//! │  handlers  │───────────────────────────────────▶│ Event queue  │
//! └────────────┘◀───────────────────────────────────│ of ids       │
//!                      dispatch(current_id)         └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use ircbus_core::{Event, Irc, event_codes};
//!
//! event_codes! {
//!     pub enum Chat {
//!         LineReceived,
//!         CommandReceived,
//!     }
//! }
//!
//! let irc = Irc::new();
//! irc.connect(Chat::LineReceived, |event: &Event| {
//!     event.push_back(Chat::CommandReceived);
//! });
//! irc.connect(Chat::CommandReceived, |event: &Event| {
//!     println!("dispatched as {}", event.current_id());
//! });
//!
//! let event = irc.make_event(Chat::LineReceived);
//! event.push_back(Chat::LineReceived);
//! event.emit()?;
//! ```

pub mod apis;
pub mod component_map;
pub mod context;
pub mod error;
pub mod event;
pub mod event_id;
pub mod module;
pub mod modules;
pub mod package;
mod queue;
pub mod signal;

pub use linkme;

pub use component_map::ComponentMap;
pub use context::Irc;
pub use error::{
    BoxError, ComponentError, ComponentResult, DispatchError, DispatchResult, ModuleError,
    ModuleResult,
};
pub use event::Event;
pub use event_id::{Code, EventCode, EventId};
pub use module::{Interface, Module};
pub use package::{PACKAGES, Package};
pub use signal::{ConnectionHandle, HandlerOutput, Placement, Position, SlotGroup};

/// Prelude for common imports.
pub mod prelude {
    pub use super::apis::{Connection, ConnectionEvent, ReceivedLine, StatusChange};
    pub use super::{
        ComponentMap, ConnectionHandle, DispatchResult, Event, EventId, Interface, Irc, Module,
        ModuleResult, Placement, default_implementation, event_codes,
    };
}

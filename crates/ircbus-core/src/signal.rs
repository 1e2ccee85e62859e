//! Handler chains keyed by [`EventId`].
//!
//! Every identifier owns one [`Signal`]: an ordered chain of handler slots.
//! A slot's position in the chain is fixed at connect time by its
//! [`Placement`]:
//!
//! - [`SlotGroup::Front`] slots run first, most recently connected first.
//! - [`SlotGroup::Numbered`] groups run next, in ascending key order. Within a
//!   group a slot is inserted at the group's front or back.
//! - [`SlotGroup::Back`] slots run last, in connection order.
//!
//! Dispatch walks a snapshot of the chain, so handlers may connect or
//! disconnect slots (including their own) while a dispatch is in progress.
//! Disconnected slots that have not been reached yet are skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::error::{BoxError, DispatchError, DispatchResult};
use crate::event::Event;
use crate::event_id::EventId;

// =============================================================================
// Handler Types
// =============================================================================

/// Type-erased handler stored in a slot.
pub(crate) type Handler = dyn Fn(&Event, &ConnectionHandle) -> Result<(), BoxError> + Send + Sync;

/// Return values accepted from handlers.
///
/// Implemented for `()` and for `Result<(), E>` where `E` converts into
/// [`BoxError`].
pub trait HandlerOutput {
    /// Converts the handler's return value into a dispatch outcome.
    fn into_result(self) -> Result<(), BoxError>;
}

impl HandlerOutput for () {
    fn into_result(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E: Into<BoxError>> HandlerOutput for Result<(), E> {
    fn into_result(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

// =============================================================================
// Placement
// =============================================================================

/// The group a slot belongs to. Groups run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotGroup {
    /// Implicit group ahead of every numbered group.
    Front,
    /// An explicit group; lower keys run first.
    Numbered(i32),
    /// Implicit group behind every numbered group.
    Back,
}

/// Where a slot is inserted within its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Position {
    /// Ahead of the group's existing slots.
    Front,
    /// Behind the group's existing slots.
    #[default]
    Back,
}

/// Chain position requested at connect time.
///
/// For the implicit groups the group decides the position: [`SlotGroup::Front`]
/// always inserts at the front, [`SlotGroup::Back`] always at the back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placement {
    /// The slot's group.
    pub group: SlotGroup,
    /// Position within a numbered group.
    pub position: Position,
}

impl Placement {
    /// The implicit front group.
    pub const fn front() -> Self {
        Self {
            group: SlotGroup::Front,
            position: Position::Front,
        }
    }

    /// The implicit back group. This is the default.
    pub const fn back() -> Self {
        Self {
            group: SlotGroup::Back,
            position: Position::Back,
        }
    }

    /// The back of numbered group `key`.
    pub const fn group(key: i32) -> Self {
        Self {
            group: SlotGroup::Numbered(key),
            position: Position::Back,
        }
    }

    /// Moves the slot to the front of its numbered group.
    pub const fn at_front(mut self) -> Self {
        self.position = Position::Front;
        self
    }

    /// Moves the slot to the back of its numbered group.
    pub const fn at_back(mut self) -> Self {
        self.position = Position::Back;
        self
    }

    fn effective_position(&self) -> Position {
        match self.group {
            SlotGroup::Front => Position::Front,
            SlotGroup::Back => Position::Back,
            SlotGroup::Numbered(_) => self.position,
        }
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::back()
    }
}

impl From<SlotGroup> for Placement {
    fn from(group: SlotGroup) -> Self {
        Self {
            group,
            position: Position::Back,
        }
    }
}

// =============================================================================
// Slots and Signals
// =============================================================================

pub(crate) struct Slot {
    group: SlotGroup,
    connected: AtomicBool,
    handler: Box<Handler>,
}

/// The ordered handler chain of one identifier.
#[derive(Default)]
pub(crate) struct Signal {
    slots: RwLock<Vec<Arc<Slot>>>,
}

impl Signal {
    fn connect(self: &Arc<Self>, placement: Placement, handler: Box<Handler>) -> ConnectionHandle {
        let slot = Arc::new(Slot {
            group: placement.group,
            connected: AtomicBool::new(true),
            handler,
        });

        let mut slots = self.slots.write();
        let index = match placement.effective_position() {
            Position::Front => slots.partition_point(|s| s.group < placement.group),
            Position::Back => slots.partition_point(|s| s.group <= placement.group),
        };
        slots.insert(index, slot.clone());
        drop(slots);

        ConnectionHandle::new(&slot, self)
    }

    fn disconnect(&self, slot: &Arc<Slot>) {
        self.slots.write().retain(|s| !Arc::ptr_eq(s, slot));
    }

    fn len(&self) -> usize {
        self.slots.read().len()
    }

    fn dispatch(self: &Arc<Self>, id: EventId, event: &Event) -> DispatchResult {
        let snapshot = self.slots.read().clone();
        for slot in &snapshot {
            if !slot.connected.load(Ordering::Acquire) {
                continue;
            }
            let handle = ConnectionHandle::new(slot, self);
            let _scope = ScopedHandle::enter(event, handle.clone());
            (slot.handler)(event, &handle).map_err(|source| DispatchError::Handler { id, source })?;
        }
        Ok(())
    }
}

// =============================================================================
// Connection Handle
// =============================================================================

/// Handle to one connected handler.
///
/// Cloning is cheap and every clone refers to the same slot. Handles do not
/// keep the handler alive; once the slot is gone every operation is a no-op.
#[derive(Clone)]
pub struct ConnectionHandle {
    slot: Weak<Slot>,
    signal: Weak<Signal>,
}

impl ConnectionHandle {
    fn new(slot: &Arc<Slot>, signal: &Arc<Signal>) -> Self {
        Self {
            slot: Arc::downgrade(slot),
            signal: Arc::downgrade(signal),
        }
    }

    /// Disconnects the handler.
    ///
    /// Returns `true` if this call disconnected it, `false` if it was already
    /// disconnected or the handle is stale.
    pub fn disconnect(&self) -> bool {
        let Some(slot) = self.slot.upgrade() else {
            return false;
        };
        if !slot.connected.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(signal) = self.signal.upgrade() {
            signal.disconnect(&slot);
        }
        true
    }

    /// Returns `true` while the handler is connected.
    pub fn is_connected(&self) -> bool {
        self.slot
            .upgrade()
            .is_some_and(|slot| slot.connected.load(Ordering::Acquire))
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.slot, &other.slot)
    }
}

impl Eq for ConnectionHandle {}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Makes the running handler's [`ConnectionHandle`] available through the
/// event's data for the duration of one call.
///
/// A nested dispatch of the same event installs its own handle; dropping the
/// inner scope puts the outer handle back.
struct ScopedHandle<'a> {
    event: &'a Event,
    previous: Option<ConnectionHandle>,
}

impl<'a> ScopedHandle<'a> {
    fn enter(event: &'a Event, handle: ConnectionHandle) -> Self {
        let previous = event.data().replace(handle);
        Self { event, previous }
    }
}

impl Drop for ScopedHandle<'_> {
    fn drop(&mut self) {
        let mut data = self.event.data();
        match self.previous.take() {
            Some(previous) => {
                data.emplace(previous);
            }
            None => {
                data.erase::<ConnectionHandle>();
            }
        }
    }
}

// =============================================================================
// Signal Table
// =============================================================================

/// Mapping from identifier to handler chain.
///
/// The map lock is only held to look up or create a chain. Each chain has its
/// own lock for connects and disconnects, and dispatch holds neither while
/// handlers run.
#[derive(Default)]
pub(crate) struct SignalTable {
    signals: Mutex<HashMap<EventId, Arc<Signal>>>,
}

impl SignalTable {
    fn signal(&self, id: EventId) -> Arc<Signal> {
        self.signals.lock().entry(id).or_default().clone()
    }

    pub(crate) fn connect(
        &self,
        id: EventId,
        placement: Placement,
        handler: Box<Handler>,
    ) -> ConnectionHandle {
        trace!(%id, ?placement, "Connecting handler");
        self.signal(id).connect(placement, handler)
    }

    pub(crate) fn dispatch(&self, event: &Event) -> DispatchResult {
        let id = event.current_id();
        self.signal(id).dispatch(id, event)
    }

    pub(crate) fn handler_count(&self, id: EventId) -> usize {
        self.signals.lock().get(&id).map_or(0, |signal| signal.len())
    }
}

//! Re-routable units of work.
//!
//! An [`Event`] carries a causal lineage (`origin`), the identifier it was
//! created as, the identifier it is currently being dispatched as, a queue of
//! identifiers still to dispatch, and a [`ComponentMap`] of ambient data.
//!
//! Handlers re-route an event by pushing identifiers onto its queue while it
//! is being emitted:
//!
//! ```rust,ignore
//! irc.connect(ChatEvent::MessageReceived, |event: &Event| {
//!     // Runs right after this handler chain finishes.
//!     event.push_front(ChatEvent::CommandReceived);
//! });
//!
//! let event = irc.make_event(ChatEvent::MessageReceived);
//! event.push_back(ChatEvent::MessageReceived);
//! event.post_back();
//! ```
//!
//! Events are shared (`Arc<Event>`) but are only ever mutated by the thread
//! currently emitting them. The interior locks exist to make that handoff
//! sound, not to support concurrent dispatch of one event.

mod id_queue;

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tracing::warn;

use crate::component_map::ComponentMap;
use crate::context::Irc;
use crate::error::{DispatchError, DispatchResult};
use crate::event_id::EventId;

use id_queue::IdQueue;

/// A dispatchable unit of work bound to one [`Irc`] context.
pub struct Event {
    this: Weak<Event>,
    irc: Weak<Irc>,
    origin: Option<Arc<Event>>,
    original_id: EventId,
    current_id: Mutex<EventId>,
    ids: Mutex<IdQueue>,
    data: Mutex<ComponentMap>,
}

impl Event {
    pub(crate) fn create(irc: Weak<Irc>, id: EventId, origin: Option<Arc<Event>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            irc,
            origin,
            original_id: id,
            current_id: Mutex::new(id),
            ids: Mutex::new(IdQueue::new()),
            data: Mutex::new(ComponentMap::new()),
        })
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// The event this one was spawned from, if any.
    pub fn origin(&self) -> Option<&Arc<Event>> {
        self.origin.as_ref()
    }

    /// The identifier this event was created as.
    pub fn original_id(&self) -> EventId {
        self.original_id
    }

    /// The identifier presently (or most recently) dispatched.
    pub fn current_id(&self) -> EventId {
        *self.current_id.lock()
    }

    /// The owning context, if it is still alive.
    pub fn irc(&self) -> Option<Arc<Irc>> {
        self.irc.upgrade()
    }

    pub(crate) fn belongs_to(&self, irc: &Irc) -> bool {
        std::ptr::eq(self.irc.as_ptr(), irc)
    }

    /// Ambient data attached to this event.
    ///
    /// The guard must be released before emitting or dispatching this event
    /// again, since dispatch itself writes to the map.
    pub fn data(&self) -> MutexGuard<'_, ComponentMap> {
        self.data.lock()
    }

    /// Creates a new event whose `origin` is this one.
    ///
    /// The new event starts with `new_id` as both its original and current
    /// identifier and an empty pending queue. This event is not modified.
    pub fn spawn(&self, new_id: impl Into<EventId>) -> Arc<Event> {
        Event::create(self.irc.clone(), new_id.into(), self.this.upgrade())
    }

    // =========================================================================
    // Posting
    // =========================================================================

    /// Posts this event to the front of the owning context's queue.
    pub fn post_front(&self) {
        self.post(|irc, event| irc.post_event_front(event));
    }

    /// Posts this event to the back of the owning context's queue.
    pub fn post_back(&self) {
        self.post(|irc, event| irc.post_event_back(event));
    }

    fn post(&self, post: impl FnOnce(&Irc, Arc<Event>)) {
        match (self.irc.upgrade(), self.this.upgrade()) {
            (Some(irc), Some(this)) => post(irc.as_ref(), this),
            _ => warn!(id = %self.original_id, "Dropping event posted to a context that is gone"),
        }
    }

    // =========================================================================
    // Pending Identifiers
    // =========================================================================

    /// Queues `id` to be dispatched before everything already pending.
    pub fn push_front(&self, id: impl Into<EventId>) {
        self.ids.lock().push_front(id.into());
    }

    /// Queues `id` to be dispatched after everything already pending.
    pub fn push_back(&self, id: impl Into<EventId>) {
        self.ids.lock().push_back(id.into());
    }

    /// Removes the first pending identifier without dispatching it.
    ///
    /// Popping an empty queue is a caller bug; release builds return `None`.
    pub fn pop_front(&self) -> Option<EventId> {
        let popped = self.ids.lock().pop_front();
        debug_assert!(popped.is_some(), "pop_front on an event with no pending identifiers");
        popped
    }

    /// Removes the last pending identifier without dispatching it.
    ///
    /// Popping an empty queue is a caller bug; release builds return `None`.
    pub fn pop_back(&self) -> Option<EventId> {
        let popped = self.ids.lock().pop_back();
        debug_assert!(popped.is_some(), "pop_back on an event with no pending identifiers");
        popped
    }

    /// Number of pending identifiers.
    pub fn size(&self) -> usize {
        self.ids.lock().len()
    }

    /// Returns `true` if no identifiers are pending.
    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }

    /// Snapshot of the pending identifiers in dispatch order.
    pub fn pending(&self) -> Vec<EventId> {
        self.ids.lock().iter().collect()
    }

    /// Returns `true` if `id` is pending.
    pub fn contains(&self, id: impl Into<EventId>) -> bool {
        self.ids.lock().contains(id.into())
    }

    /// Removes the first pending occurrence of `id`.
    pub fn remove(&self, id: impl Into<EventId>) -> bool {
        self.ids.lock().remove(id.into())
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Dispatches every pending identifier in order.
    ///
    /// Identifiers pushed by handlers while this runs are picked up by later
    /// iterations of the same call. A failing handler stops the loop; the
    /// identifiers still pending stay queued.
    pub fn emit(&self) -> DispatchResult {
        let irc = self.irc.upgrade().ok_or(DispatchError::ContextGone)?;
        loop {
            let Some(id) = self.ids.lock().take_next() else {
                return Ok(());
            };
            *self.current_id.lock() = id;
            irc.emit_event(self)?;
        }
    }

    /// Dispatches this event once as `id` without touching the pending queue.
    ///
    /// The previous current identifier is restored afterwards, including when
    /// a handler fails or panics.
    pub fn emit_as(&self, id: impl Into<EventId>) -> DispatchResult {
        let irc = self.irc.upgrade().ok_or(DispatchError::ContextGone)?;
        let previous = std::mem::replace(&mut *self.current_id.lock(), id.into());
        let _restore = RestoreCurrentId {
            event: self,
            previous,
        };
        irc.emit_event(self)
    }
}

struct RestoreCurrentId<'a> {
    event: &'a Event,
    previous: EventId,
}

impl Drop for RestoreCurrentId<'_> {
    fn drop(&mut self) {
        *self.event.current_id.lock() = self.previous;
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("original_id", &self.original_id)
            .field("current_id", &self.current_id())
            .field("pending", &self.size())
            .field("has_origin", &self.origin.is_some())
            .finish()
    }
}

impl Drop for Event {
    // Unlinks the lineage iteratively; a recursive drop of a long spawn chain
    // would overflow the stack.
    fn drop(&mut self) {
        let mut next = self.origin.take();
        while let Some(parent) = next {
            match Arc::into_inner(parent) {
                Some(mut parent) => next = parent.origin.take(),
                None => break,
            }
        }
    }
}

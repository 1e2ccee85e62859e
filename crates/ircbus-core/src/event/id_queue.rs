//! Dual-buffer queue of pending event identifiers.
//!
//! Logically this is one ordered double-ended sequence. Physically it is two
//! buffers:
//!
//! - `main`, whose first `skipped` entries have already been consumed, and
//! - `next`, holding identifiers pushed to the front, in reverse order (the
//!   last element is the next one to run).
//!
//! [`IdQueue::normalize`] merges `next` into the consumed prefix of `main`,
//! growing that prefix when it is too short. Pushing to either end, popping
//! from either end, and taking the next identifier are amortized O(1).

use crate::event_id::EventId;

#[derive(Debug, Default, Clone)]
pub(crate) struct IdQueue {
    main: Vec<EventId>,
    skipped: usize,
    next: Vec<EventId>,
}

impl IdQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of pending identifiers. Does not normalize.
    pub(crate) fn len(&self) -> usize {
        self.main.len() - self.skipped + self.next.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.main.len() == self.skipped && self.next.is_empty()
    }

    pub(crate) fn push_front(&mut self, id: EventId) {
        self.next.push(id);
    }

    pub(crate) fn push_back(&mut self, id: EventId) {
        // Reclaim the consumed prefix instead of reallocating.
        if self.main.len() == self.main.capacity() && self.skipped * 2 > self.main.len() {
            self.main.drain(..self.skipped);
            self.skipped = 0;
        }
        self.main.push(id);
    }

    pub(crate) fn pop_front(&mut self) -> Option<EventId> {
        if let Some(id) = self.next.pop() {
            return Some(id);
        }
        let id = self.main.get(self.skipped).copied()?;
        self.skipped += 1;
        Some(id)
    }

    pub(crate) fn pop_back(&mut self) -> Option<EventId> {
        if self.main.len() == self.skipped {
            self.normalize();
        }
        if self.main.len() == self.skipped {
            return None;
        }
        self.main.pop()
    }

    /// Normalizes, then consumes and returns the first pending identifier.
    pub(crate) fn take_next(&mut self) -> Option<EventId> {
        self.normalize();
        let id = self.main.get(self.skipped).copied()?;
        self.skipped += 1;
        Some(id)
    }

    /// Pending identifiers in dispatch order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = EventId> + '_ {
        self.next
            .iter()
            .rev()
            .chain(&self.main[self.skipped..])
            .copied()
    }

    pub(crate) fn contains(&self, id: EventId) -> bool {
        self.iter().any(|pending| pending == id)
    }

    /// Removes the first pending occurrence of `id`.
    pub(crate) fn remove(&mut self, id: EventId) -> bool {
        self.normalize();
        match self.main[self.skipped..].iter().position(|&pending| pending == id) {
            Some(offset) => {
                self.main.remove(self.skipped + offset);
                true
            }
            None => false,
        }
    }

    /// Moves every front-pushed identifier into the consumed prefix of `main`.
    pub(crate) fn normalize(&mut self) {
        let incoming = self.next.len();
        if incoming == 0 {
            return;
        }

        if self.skipped < incoming {
            // Leave headroom proportional to the live part so repeated
            // front pushes do not shift the tail every time.
            let live = self.main.len() - self.skipped;
            let grow = (incoming - self.skipped).max(live);
            self.main.splice(
                self.skipped..self.skipped,
                std::iter::repeat_n(EventId::none(), grow),
            );
            self.skipped += grow;
        }

        let start = self.skipped - incoming;
        for (slot, id) in self.main[start..self.skipped]
            .iter_mut()
            .zip(self.next.drain(..).rev())
        {
            *slot = id;
        }
        self.skipped = start;
    }
}

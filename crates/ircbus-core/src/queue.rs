//! Cross-thread handoff queue of ready events.
//!
//! Producers on any thread post events to the front or back; one consumer
//! thread fetches them. Front entries are handed out first, newest first.
//! Back entries follow in posting order.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::event::Event;

#[derive(Default)]
struct QueueState {
    front: Vec<Arc<Event>>,
    /// Consumed entries are `None` and sit before `back_skip`.
    back: Vec<Option<Arc<Event>>>,
    back_skip: usize,
    shutting_down: bool,
}

impl QueueState {
    fn has_ready(&self) -> bool {
        !self.front.is_empty() || self.back_skip < self.back.len()
    }

    fn pop(&mut self) -> Option<Arc<Event>> {
        if let Some(event) = self.front.pop() {
            return Some(event);
        }
        let event = self.back.get_mut(self.back_skip)?.take();
        self.back_skip += 1;
        event
    }

    fn len(&self) -> usize {
        self.front.len() + self.back.len() - self.back_skip
    }
}

/// Two-ended event queue guarded by one mutex and one condition variable.
#[derive(Default)]
pub(crate) struct EventQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl EventQueue {
    pub(crate) fn post_back(&self, event: Arc<Event>) {
        let mut state = self.state.lock();
        if state.shutting_down {
            trace!(id = %event.original_id(), "Dropping event posted during shutdown");
            return;
        }

        // Reclaim the consumed prefix once it dominates a full buffer.
        if state.back.len() / 2 < state.back_skip && state.back.len() == state.back.capacity() {
            let skip = state.back_skip;
            state.back.drain(..skip);
            state.back_skip = 0;
        }
        state.back.push(Some(event));
        drop(state);
        self.ready.notify_one();
    }

    pub(crate) fn post_front(&self, event: Arc<Event>) {
        let mut state = self.state.lock();
        if state.shutting_down {
            trace!(id = %event.original_id(), "Dropping event posted during shutdown");
            return;
        }
        state.front.push(event);
        drop(state);
        self.ready.notify_one();
    }

    /// Blocks until an event is ready, `timeout` elapses, or the queue shuts down.
    ///
    /// `None` as timeout waits indefinitely. Returns `None` on timeout and on
    /// shutdown.
    pub(crate) fn fetch(&self, timeout: Option<Duration>) -> Option<Arc<Event>> {
        let mut state = self.state.lock();
        let waiting = |state: &mut QueueState| !state.shutting_down && !state.has_ready();
        match timeout {
            Some(timeout) => {
                self.ready.wait_while_for(&mut state, waiting, timeout);
            }
            None => self.ready.wait_while(&mut state, waiting),
        }
        if state.shutting_down {
            return None;
        }
        state.pop()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().len()
    }

    /// Marks the queue as shutting down and wakes every waiting fetcher.
    ///
    /// Returns `false` if it was already shutting down.
    pub(crate) fn shutdown(&self) -> bool {
        let mut state = self.state.lock();
        if state.shutting_down {
            return false;
        }
        state.shutting_down = true;
        let front = std::mem::take(&mut state.front);
        let back = std::mem::take(&mut state.back);
        state.back_skip = 0;
        drop(state);
        self.ready.notify_all();

        // Dropped outside the lock; event data may post on drop.
        let abandoned = front.len() + back.into_iter().flatten().count();
        if abandoned > 0 {
            trace!(abandoned, "Discarded queued events on shutdown");
        }
        true
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::context::Irc;
    use crate::event_codes;
    use crate::event_id::EventId;

    event_codes! {
        enum Job {
            One,
            Two,
            Three,
            Four,
        }
    }

    fn ids(events: impl IntoIterator<Item = Arc<Event>>) -> Vec<EventId> {
        events.into_iter().map(|event| event.original_id()).collect()
    }

    #[test]
    fn test_front_lifo_before_back_fifo() {
        let irc = Irc::new();
        let queue = EventQueue::default();

        queue.post_back(irc.make_event(Job::One));
        queue.post_back(irc.make_event(Job::Two));
        queue.post_front(irc.make_event(Job::Three));
        queue.post_front(irc.make_event(Job::Four));
        assert_eq!(queue.len(), 4);

        let fetched = std::iter::from_fn(|| queue.fetch(Some(Duration::ZERO)));
        assert_eq!(
            ids(fetched),
            vec![
                EventId::from(Job::Four),
                EventId::from(Job::Three),
                EventId::from(Job::One),
                EventId::from(Job::Two),
            ]
        );
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_fetch_times_out_when_empty() {
        let queue = EventQueue::default();
        let started = Instant::now();

        assert!(queue.fetch(Some(Duration::from_millis(20))).is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_back_queue_compacts_instead_of_growing() {
        let irc = Irc::new();
        let queue = EventQueue::default();

        for _ in 0..10_000 {
            queue.post_back(irc.make_event(Job::One));
            queue.post_back(irc.make_event(Job::Two));
            assert!(queue.fetch(Some(Duration::ZERO)).is_some());
            assert!(queue.fetch(Some(Duration::ZERO)).is_some());
        }

        let state = queue.state.lock();
        assert!(state.back.capacity() <= 64, "capacity {}", state.back.capacity());
    }

    #[test]
    fn test_consumed_events_are_released() {
        let irc = Irc::new();
        let queue = EventQueue::default();
        let event = irc.make_event(Job::One);

        queue.post_back(event.clone());
        assert_eq!(Arc::strong_count(&event), 2);
        drop(queue.fetch(None));
        assert_eq!(Arc::strong_count(&event), 1);
    }

    #[test]
    fn test_post_wakes_blocked_fetcher() {
        let irc = Irc::new();
        let queue = Arc::new(EventQueue::default());

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.fetch(None).map(|event| event.original_id()))
        };
        thread::sleep(Duration::from_millis(20));
        queue.post_back(irc.make_event(Job::Two));

        assert_eq!(consumer.join().unwrap(), Some(EventId::from(Job::Two)));
    }

    #[test]
    fn test_shutdown_wakes_infinite_fetch() {
        let queue = Arc::new(EventQueue::default());

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.fetch(None).is_none())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));

        assert!(queue.shutdown());
        assert!(!queue.shutdown());
        for consumer in consumers {
            assert!(consumer.join().unwrap());
        }
        assert!(queue.is_shutting_down());
    }

    #[test]
    fn test_post_after_shutdown_is_dropped() {
        let irc = Irc::new();
        let queue = EventQueue::default();
        queue.shutdown();

        queue.post_back(irc.make_event(Job::One));
        queue.post_front(irc.make_event(Job::Two));

        assert_eq!(queue.len(), 0);
        assert!(queue.fetch(Some(Duration::ZERO)).is_none());
    }

    #[test]
    fn test_many_producers_one_consumer() {
        let irc = Irc::new();
        let queue = Arc::new(EventQueue::default());

        thread::scope(|scope| {
            for _ in 0..4 {
                let irc = irc.clone();
                let queue = queue.clone();
                scope.spawn(move || {
                    for _ in 0..250 {
                        queue.post_back(irc.make_event(Job::Three));
                    }
                });
            }

            let mut received = 0;
            while received < 1000 {
                if queue.fetch(Some(Duration::from_secs(5))).is_some() {
                    received += 1;
                } else {
                    panic!("consumer starved after {received} events");
                }
            }
        });

        assert_eq!(queue.len(), 0);
    }
}

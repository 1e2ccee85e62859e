//! The consumer side of the event queue.
//!
//! An [`EventLoop`] repeatedly fetches the next queued event from an
//! [`Irc`] context and emits it, so all handlers run on one thread. It stops
//! when the context shuts down or its [`CancellationToken`] is cancelled.
//!
//! ```rust,ignore
//! use ircbus_runtime::{EventLoop, config::EventLoopConfig};
//!
//! let handle = EventLoop::new(irc.clone(), EventLoopConfig::default()).spawn()?;
//! // producers post events from any thread...
//! let stats = handle.stop()?;
//! ```

use std::sync::Arc;
use std::thread::JoinHandle;

use ircbus_core::Irc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, span, warn};

use crate::config::EventLoopConfig;
use crate::error::{RuntimeError, RuntimeResult};

/// Counters reported when a loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Events taken off the queue.
    pub events_fetched: u64,
    /// Events whose pending identifiers were all dispatched.
    pub events_emitted: u64,
    /// Events whose emission stopped at a failing handler.
    pub handler_failures: u64,
}

/// Drains the event queue of one context.
pub struct EventLoop {
    irc: Arc<Irc>,
    config: EventLoopConfig,
    cancel: CancellationToken,
}

impl EventLoop {
    /// Creates a loop draining `irc` with the given settings. Nothing runs
    /// until [`run_blocking`](Self::run_blocking), [`spawn`](Self::spawn) or
    /// [`run`](Self::run) is called.
    pub fn new(irc: Arc<Irc>, config: EventLoopConfig) -> Self {
        Self {
            irc,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// A token that stops this loop when cancelled.
    ///
    /// The loop notices cancellation within one fetch timeout.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the loop on the calling thread until it is stopped.
    ///
    /// Returns [`RuntimeError::Dispatch`] on the first handler failure when
    /// `stop_on_handler_error` is set; otherwise failures are logged and
    /// counted.
    pub fn run_blocking(&self) -> RuntimeResult<LoopStats> {
        let timeout = self.config.fetch_timeout();
        let mut stats = LoopStats::default();

        info!(timeout_ms = self.config.fetch_timeout_ms, "Event loop started");

        while !self.cancel.is_cancelled() {
            let Some(event) = self.irc.fetch_event(Some(timeout)) else {
                if self.irc.is_shutting_down() {
                    debug!("Context is shutting down");
                    break;
                }
                continue;
            };
            stats.events_fetched += 1;

            let _span = span!(Level::DEBUG, "event", id = %event.original_id()).entered();
            match event.emit() {
                Ok(()) => stats.events_emitted += 1,
                Err(err) => {
                    stats.handler_failures += 1;
                    if self.config.stop_on_handler_error {
                        error!(error = %err, pending = event.size(), "Handler failed, stopping event loop");
                        return Err(err.into());
                    }
                    warn!(error = %err, pending = event.size(), "Handler failed");
                }
            }
        }

        info!(
            fetched = stats.events_fetched,
            emitted = stats.events_emitted,
            failures = stats.handler_failures,
            "Event loop stopped"
        );
        Ok(stats)
    }

    /// Runs the loop on a named thread of its own.
    pub fn spawn(self) -> RuntimeResult<EventLoopHandle> {
        let cancel = self.cancel.clone();
        let thread = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || self.run_blocking())
            .map_err(RuntimeError::Spawn)?;

        Ok(EventLoopHandle {
            cancel,
            thread: Some(thread),
        })
    }

    /// Runs the loop on the tokio blocking pool.
    ///
    /// Dropping the returned future cancels the loop.
    pub async fn run(self) -> RuntimeResult<LoopStats> {
        let guard = self.cancel.clone().drop_guard();
        let result = tokio::task::spawn_blocking(move || self.run_blocking()).await;
        guard.disarm();
        result?
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Handle to a loop started with [`EventLoop::spawn`].
///
/// Dropping the handle cancels the loop without waiting for it.
#[derive(Debug)]
pub struct EventLoopHandle {
    cancel: CancellationToken,
    thread: Option<JoinHandle<RuntimeResult<LoopStats>>>,
}

impl EventLoopHandle {
    /// A token that stops the loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the consumer thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|thread| thread.is_finished())
    }

    /// Cancels the loop and waits for it.
    pub fn stop(self) -> RuntimeResult<LoopStats> {
        self.cancel.cancel();
        self.join()
    }

    /// Waits for the loop to end on its own.
    pub fn join(mut self) -> RuntimeResult<LoopStats> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| RuntimeError::ConsumerPanicked)?,
            None => Ok(LoopStats::default()),
        }
    }
}

impl Drop for EventLoopHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use ircbus_core::{DispatchError, Event, event_codes};

    use super::*;

    event_codes! {
        enum Test {
            Ping,
            Fail,
        }
    }

    fn config() -> EventLoopConfig {
        EventLoopConfig {
            fetch_timeout_ms: 10,
            thread_name: "test-consumer".to_string(),
            stop_on_handler_error: false,
        }
    }

    fn counting(irc: &Arc<Irc>) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        irc.connect(Test::Ping, move |_: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        irc.connect(Test::Fail, |_: &Event| Err::<(), _>("refused"));
        count
    }

    fn post(irc: &Arc<Irc>, id: Test) {
        let event = irc.make_event(id);
        event.push_back(id);
        event.post_back();
    }

    fn wait_for(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_spawned_loop_dispatches_and_stops() {
        let irc = Irc::new();
        let count = counting(&irc);
        let handle = EventLoop::new(irc.clone(), config()).spawn().unwrap();

        for _ in 0..3 {
            post(&irc, Test::Ping);
        }
        wait_for(|| count.load(Ordering::SeqCst) == 3);

        let stats = handle.stop().unwrap();
        assert_eq!(
            stats,
            LoopStats {
                events_fetched: 3,
                events_emitted: 3,
                handler_failures: 0,
            }
        );
    }

    #[test]
    fn test_handler_failure_is_counted() {
        let irc = Irc::new();
        let count = counting(&irc);
        let handle = EventLoop::new(irc.clone(), config()).spawn().unwrap();

        post(&irc, Test::Fail);
        post(&irc, Test::Ping);
        wait_for(|| count.load(Ordering::SeqCst) == 1);

        let stats = handle.stop().unwrap();
        assert_eq!(stats.events_fetched, 2);
        assert_eq!(stats.handler_failures, 1);
    }

    #[test]
    fn test_stop_on_handler_error() {
        let irc = Irc::new();
        let count = counting(&irc);
        let handle = EventLoop::new(
            irc.clone(),
            EventLoopConfig {
                stop_on_handler_error: true,
                ..config()
            },
        )
        .spawn()
        .unwrap();

        post(&irc, Test::Fail);
        post(&irc, Test::Ping);

        let result = handle.join();
        assert!(matches!(
            result,
            Err(RuntimeError::Dispatch(DispatchError::Handler { .. }))
        ));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(irc.queued_events(), 1);
    }

    #[test]
    fn test_context_shutdown_ends_loop() {
        let irc = Irc::new();
        let handle = EventLoop::new(irc.clone(), config()).spawn().unwrap();

        irc.shutdown();

        let stats = handle.join().unwrap();
        assert_eq!(stats.events_fetched, 0);
    }

    #[test]
    fn test_consumer_thread_is_named() {
        let irc = Irc::new();
        let name = Arc::new(parking_lot::Mutex::new(None));
        {
            let name = name.clone();
            irc.connect(Test::Ping, move |_: &Event| {
                *name.lock() = std::thread::current().name().map(str::to_owned);
            });
        }
        let handle = EventLoop::new(irc.clone(), config()).spawn().unwrap();

        post(&irc, Test::Ping);
        wait_for(|| name.lock().is_some());
        handle.stop().unwrap();

        assert_eq!(name.lock().as_deref(), Some("test-consumer"));
    }

    #[test]
    fn test_dropping_handle_cancels() {
        let irc = Irc::new();
        let event_loop = EventLoop::new(irc.clone(), config());
        let token = event_loop.cancellation_token();
        let handle = event_loop.spawn().unwrap();

        drop(handle);
        assert!(token.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_run_until_cancelled() {
        let irc = Irc::new();
        let count = counting(&irc);
        let event_loop = EventLoop::new(irc.clone(), config());
        let token = event_loop.cancellation_token();
        let task = tokio::spawn(event_loop.run());

        post(&irc, Test::Ping);
        post(&irc, Test::Ping);
        while count.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        token.cancel();

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.events_emitted, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropping_async_run_cancels() {
        let irc = Irc::new();
        let event_loop = EventLoop::new(irc.clone(), config());
        let token = event_loop.cancellation_token();

        let result = tokio::time::timeout(Duration::from_millis(20), event_loop.run()).await;
        assert!(result.is_err());
        assert!(token.is_cancelled());
    }
}

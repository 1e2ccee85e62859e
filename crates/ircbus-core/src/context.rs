//! The [`Irc`] context.
//!
//! One context owns the signal table, the module registry and the ready-event
//! queue. Producers on any thread create events and post them; a single
//! consumer thread fetches and emits them:
//!
//! ```rust,ignore
//! let irc = Irc::with_packages([
//!     package::load_module::<dyn Connection>(("irc.libera.chat".into(), 6697)),
//! ])?;
//!
//! irc.connect(ConnectionEvent::Connected, |event: &Event| {
//!     tracing::info!(id = %event.current_id(), "connected");
//! });
//!
//! while let Some(event) = irc.fetch_event(Some(Duration::from_millis(250))) {
//!     event.emit()?;
//! }
//! ```
//!
//! Shutting the context down (explicitly, or by dropping the last `Arc<Irc>`)
//! unloads every module and wakes every blocked [`Irc::fetch_event`] caller.

use std::any::TypeId;
use std::sync::Arc;
use std::time::Duration;

use tracing::{Level, debug, info, span, warn};

use crate::error::{DispatchResult, ModuleError, ModuleResult};
use crate::event::Event;
use crate::event_id::EventId;
use crate::module::{Interface, Module, ModuleRegistry};
use crate::package::{PACKAGES, Package};
use crate::queue::EventQueue;
use crate::signal::{ConnectionHandle, Handler, HandlerOutput, Placement, SignalTable};

/// The coordination hub for one chat session.
#[derive(Default)]
pub struct Irc {
    signals: SignalTable,
    modules: ModuleRegistry,
    queue: EventQueue,
}

impl Irc {
    /// Creates an empty context.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a context and runs each package once against it, in order.
    ///
    /// The first failing package aborts construction; the partially set up
    /// context is shut down and the error returned.
    pub fn with_packages(packages: impl IntoIterator<Item = Package>) -> ModuleResult<Arc<Self>> {
        let irc = Self::new();
        for package in packages {
            if let Err(err) = package(&irc) {
                warn!(error = %err, "Package failed, shutting the context down");
                irc.shutdown();
                return Err(err);
            }
        }
        Ok(irc)
    }

    /// Creates a context and applies every package registered in [`PACKAGES`].
    pub fn with_registered_packages() -> ModuleResult<Arc<Self>> {
        debug!(count = PACKAGES.len(), "Applying registered packages");
        Self::with_packages(PACKAGES.iter().map(|&install| Box::new(install) as Package))
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Creates an event bound to this context with `id` as its original and
    /// current identifier. The pending queue starts empty.
    pub fn make_event(self: &Arc<Self>, id: impl Into<EventId>) -> Arc<Event> {
        Event::create(Arc::downgrade(self), id.into(), None)
    }

    /// Dispatches `event` once under its current identifier.
    pub fn emit_event(&self, event: &Event) -> DispatchResult {
        let span = span!(Level::TRACE, "dispatch", id = %event.current_id());
        let _enter = span.enter();
        self.signals.dispatch(event)
    }

    /// Appends `event` to the back of the ready queue.
    pub fn post_event_back(&self, event: Arc<Event>) {
        if self.accepts(&event) {
            self.queue.post_back(event);
        }
    }

    /// Pushes `event` to the front of the ready queue.
    pub fn post_event_front(&self, event: Arc<Event>) {
        if self.accepts(&event) {
            self.queue.post_front(event);
        }
    }

    fn accepts(&self, event: &Event) -> bool {
        let ours = event.belongs_to(self);
        debug_assert!(ours, "event posted to a foreign context");
        if !ours {
            warn!(id = %event.original_id(), "Rejected event posted to a foreign context");
        }
        ours
    }

    /// Waits for the next ready event.
    ///
    /// Front-posted events come first (newest first), then back-posted ones in
    /// posting order. Returns `None` when `timeout` elapses or the context is
    /// shutting down. `None` as timeout waits indefinitely.
    pub fn fetch_event(&self, timeout: Option<Duration>) -> Option<Arc<Event>> {
        self.queue.fetch(timeout)
    }

    /// Number of events waiting to be fetched.
    pub fn queued_events(&self) -> usize {
        self.queue.len()
    }

    // =========================================================================
    // Signals
    // =========================================================================

    /// Connects `handler` to `id` at the back of the chain.
    pub fn connect<F, R>(&self, id: impl Into<EventId>, handler: F) -> ConnectionHandle
    where
        F: Fn(&Event) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        self.connect_at(id, Placement::default(), handler)
    }

    /// Connects `handler` to `id` at `placement`.
    pub fn connect_at<F, R>(
        &self,
        id: impl Into<EventId>,
        placement: impl Into<Placement>,
        handler: F,
    ) -> ConnectionHandle
    where
        F: Fn(&Event) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        self.connect_extended(id, placement, move |event: &Event, _: &ConnectionHandle| {
            handler(event)
        })
    }

    /// Connects a handler that also receives its own [`ConnectionHandle`].
    pub fn connect_extended<F, R>(
        &self,
        id: impl Into<EventId>,
        placement: impl Into<Placement>,
        handler: F,
    ) -> ConnectionHandle
    where
        F: Fn(&Event, &ConnectionHandle) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        let handler: Box<Handler> =
            Box::new(move |event: &Event, handle: &ConnectionHandle| handler(event, handle).into_result());
        self.signals.connect(id.into(), placement.into(), handler)
    }

    /// Number of handlers connected to `id`.
    pub fn handler_count(&self, id: impl Into<EventId>) -> usize {
        self.signals.handler_count(id.into())
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Loads the default implementation of interface `I`, replacing any module
    /// already loaded under `I`.
    ///
    /// If construction fails, the previously loaded module stays in place.
    pub fn load_module<I>(
        self: &Arc<Self>,
        args: <I::Default as Module>::Args,
    ) -> ModuleResult<Arc<I>>
    where
        I: ?Sized + Interface,
    {
        let module = self.modules.load::<I::Default>(self, args)?;
        Ok(module.into_interface())
    }

    /// Loads `M` under its interface, replacing any module already loaded there.
    pub fn load_module_as<M: Module>(self: &Arc<Self>, args: M::Args) -> ModuleResult<Arc<M>> {
        self.modules.load::<M>(self, args)
    }

    /// Returns the module loaded under interface `I`.
    pub fn module<I: ?Sized + Interface>(&self) -> ModuleResult<Arc<I>> {
        self.try_module::<I>().ok_or_else(ModuleError::not_loaded::<I>)
    }

    /// Returns the module loaded under interface `I`, if any.
    pub fn try_module<I: ?Sized + Interface>(&self) -> Option<Arc<I>> {
        self.modules.get::<I>()
    }

    /// Returns the module loaded under `M`'s interface if it is an `M`.
    pub fn module_as<M: Module>(&self) -> Option<Arc<M>> {
        self.modules.get_as::<M>()
    }

    /// Returns `true` if a module is loaded under interface `I`.
    pub fn is_module_loaded<I: ?Sized + Interface>(&self) -> bool {
        self.modules.contains(TypeId::of::<I>())
    }

    /// Number of loaded modules.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Unloads the module under `M`'s interface, but only if it is an `M`.
    pub fn unload_module<M: Module>(&self) -> bool {
        self.modules.unload::<M>()
    }

    /// Unloads whatever module is loaded under the interface whose `TypeId` is `key`.
    pub fn unload_module_by_key(&self, key: TypeId) -> bool {
        self.modules.unload_key(key)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Unloads every module, then stops the queue and wakes all fetchers.
    ///
    /// Idempotent. Also runs when the context is dropped.
    pub fn shutdown(&self) {
        let unloaded = self.modules.unload_all();
        if self.queue.shutdown() {
            info!(unloaded, "IRC context shut down");
        }
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has run.
    pub fn is_shutting_down(&self) -> bool {
        self.queue.is_shutting_down()
    }
}

impl Drop for Irc {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Irc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Irc")
            .field("modules", &self.module_count())
            .field("queued_events", &self.queued_events())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    use parking_lot::Mutex;

    use super::*;
    use crate::error::BoxError;
    use crate::event_codes;
    use crate::package;

    event_codes! {
        enum Flow {
            Received,
            Parsed,
            Replied,
        }
    }

    #[test]
    fn test_consumer_loop_drains_posted_events() {
        let irc = Irc::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        {
            let seen = seen.clone();
            irc.connect(Flow::Received, move |event: &Event| {
                seen.lock().push(event.current_id());
                let reply = event.spawn(Flow::Replied);
                reply.push_back(Flow::Replied);
                reply.post_back();
            });
        }
        {
            let seen = seen.clone();
            irc.connect(Flow::Replied, move |event: &Event| {
                let origin = event.origin().map(|origin| origin.original_id());
                assert_eq!(origin, Some(EventId::from(Flow::Received)));
                seen.lock().push(event.current_id());
            });
        }

        let event = irc.make_event(Flow::Received);
        event.push_back(Flow::Received);
        event.post_back();

        while let Some(event) = irc.fetch_event(Some(Duration::ZERO)) {
            event.emit().unwrap();
        }

        assert_eq!(
            *seen.lock(),
            vec![EventId::from(Flow::Received), EventId::from(Flow::Replied)]
        );
    }

    #[test]
    fn test_front_posts_precede_back_posts() {
        let irc = Irc::new();
        irc.make_event(Flow::Received).post_back();
        irc.make_event(Flow::Parsed).post_front();

        let first = irc.fetch_event(Some(Duration::ZERO)).unwrap();
        let second = irc.fetch_event(Some(Duration::ZERO)).unwrap();

        assert_eq!(first.original_id(), Flow::Parsed);
        assert_eq!(second.original_id(), Flow::Received);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "foreign context")]
    fn test_posting_to_foreign_context_asserts() {
        let ours = Irc::new();
        let theirs = Irc::new();
        ours.post_event_back(theirs.make_event(Flow::Received));
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_posting_to_foreign_context_is_rejected() {
        let ours = Irc::new();
        let theirs = Irc::new();
        ours.post_event_back(theirs.make_event(Flow::Received));
        assert_eq!(ours.queued_events(), 0);
    }

    #[test]
    fn test_posting_after_context_drop_is_dropped() {
        let irc = Irc::new();
        let event = irc.make_event(Flow::Received);
        drop(irc);

        event.post_back();
        assert!(event.irc().is_none());
    }

    #[test]
    fn test_shutdown_wakes_blocked_fetch() {
        let irc = Irc::new();

        let consumer = {
            let irc = irc.clone();
            thread::spawn(move || {
                let started = Instant::now();
                let fetched = irc.fetch_event(None);
                (fetched.is_none(), started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(30));
        irc.shutdown();

        let (empty, waited) = consumer.join().unwrap();
        assert!(empty);
        assert!(waited < Duration::from_secs(5));
        assert!(irc.is_shutting_down());
        assert!(irc.fetch_event(None).is_none());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let irc = Irc::new();
        irc.shutdown();
        irc.shutdown();
        assert!(irc.is_shutting_down());
    }

    #[test]
    fn test_with_packages_runs_each_once_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let record = |name: &'static str| {
            let calls = calls.clone();
            package::package(move |_irc: &Arc<Irc>| {
                calls.lock().push(name);
                Ok(())
            })
        };

        let irc = Irc::with_packages([record("first"), record("second")]).unwrap();

        assert_eq!(*calls.lock(), vec!["first", "second"]);
        assert!(!irc.is_shutting_down());
    }

    #[test]
    fn test_with_packages_stops_at_first_failure() {
        let reached = Arc::new(AtomicUsize::new(0));
        let after = {
            let reached = reached.clone();
            package::package(move |_irc: &Arc<Irc>| {
                reached.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        let failing = package::package(|_irc: &Arc<Irc>| Err(ModuleError::not_loaded::<Irc>()));

        let result = Irc::with_packages([failing, after]);

        assert!(matches!(result, Err(ModuleError::NotLoaded { .. })));
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    struct Marker;

    impl Module for Marker {
        type Interface = Marker;
        type Args = ();

        fn create(_: &Arc<Irc>, (): ()) -> Result<Self, BoxError> {
            Ok(Marker)
        }

        fn into_interface(self: Arc<Self>) -> Arc<Marker> {
            self
        }
    }

    crate::default_implementation!(Marker => Marker);

    #[test]
    fn test_failed_package_shuts_down_retained_context() {
        let retained: Arc<Mutex<Option<Arc<Irc>>>> = Arc::new(Mutex::new(None));
        let install = package::load_module_as::<Marker>(());
        let keep_and_fail = {
            let retained = retained.clone();
            package::package(move |irc: &Arc<Irc>| {
                *retained.lock() = Some(irc.clone());
                Err(ModuleError::not_loaded::<Irc>())
            })
        };

        let result = Irc::with_packages([install, keep_and_fail]);
        assert!(result.is_err());

        let irc = retained.lock().take().unwrap();
        assert!(irc.is_shutting_down());
        assert_eq!(irc.module_count(), 0);
        assert!(irc.fetch_event(None).is_none());
    }

    #[test]
    fn test_debug_output() {
        let irc = Irc::new();
        irc.make_event(Flow::Parsed).post_back();
        let rendered = format!("{irc:?}");
        assert!(rendered.contains("queued_events: 1"));
    }
}

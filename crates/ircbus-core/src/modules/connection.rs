//! Default [`Connection`] implementation.
//!
//! [`ConnectionModule`] tracks connection state for one `host:port` and posts
//! a state-change event on every transition. Opening sockets and framing lines
//! belongs to a transport; the transport drives this module through
//! [`ConnectionModule::report`] and [`ConnectionModule::receive`].

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::apis::connection::{Connection, ConnectionEvent, ReceivedLine, StatusChange};
use crate::context::Irc;
use crate::error::{BoxError, ModuleError, ModuleResult};
use crate::module::Module;

/// State-tracking connection to `host:port`.
pub struct ConnectionModule {
    irc: Weak<Irc>,
    host: String,
    port: u16,
    state: Mutex<ConnectionEvent>,
}

impl ConnectionModule {
    /// The configured server host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The configured server port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Records progress reported by the transport.
    ///
    /// `ConnectingFailed` is posted and then followed by `Disconnected`.
    /// Identifiers that are not states are ignored.
    pub fn report(&self, progress: ConnectionEvent) -> ModuleResult<()> {
        let irc = self.context()?;
        match progress {
            ConnectionEvent::ConnectingFailed => {
                self.change_state(&irc, ConnectionEvent::ConnectingFailed);
                self.change_state(&irc, ConnectionEvent::Disconnected);
            }
            ConnectionEvent::Connecting
            | ConnectionEvent::Connected
            | ConnectionEvent::Disconnecting
            | ConnectionEvent::Disconnected => self.change_state(&irc, progress),
            ConnectionEvent::ConnectionStatusChanged | ConnectionEvent::MessageReceived => {
                debug!(?progress, "Ignoring non-state connection report");
            }
        }
        Ok(())
    }

    /// Posts a [`ConnectionEvent::MessageReceived`] event carrying `line`.
    pub fn receive(&self, line: impl Into<String>) -> ModuleResult<()> {
        let irc = self.context()?;
        let event = irc.make_event(ConnectionEvent::MessageReceived);
        event.data().emplace(ReceivedLine(line.into()));
        event.push_back(ConnectionEvent::MessageReceived);
        event.post_back();
        Ok(())
    }

    fn context(&self) -> ModuleResult<Arc<Irc>> {
        self.irc.upgrade().ok_or(ModuleError::ContextGone)
    }

    fn change_state(&self, irc: &Arc<Irc>, new_state: ConnectionEvent) {
        let previous = {
            let mut state = self.state.lock();
            if *state == new_state {
                return;
            }
            std::mem::replace(&mut *state, new_state)
        };
        debug!(host = %self.host, port = self.port, ?previous, current = ?new_state, "Connection state changed");

        let event = irc.make_event(new_state);
        event.data().emplace(StatusChange {
            previous,
            current: new_state,
        });
        event.push_back(new_state);
        event.push_back(ConnectionEvent::ConnectionStatusChanged);
        event.post_back();
    }

    fn shut_down(&self, irc: &Arc<Irc>) {
        if *self.state.lock() == ConnectionEvent::Disconnected {
            return;
        }
        self.change_state(irc, ConnectionEvent::Disconnecting);
        self.change_state(irc, ConnectionEvent::Disconnected);
    }
}

impl Connection for ConnectionModule {
    fn connect(&self) -> ModuleResult<()> {
        let irc = self.context()?;
        self.shut_down(&irc);
        self.change_state(&irc, ConnectionEvent::Connecting);
        Ok(())
    }

    fn disconnect(&self) -> ModuleResult<()> {
        let irc = self.context()?;
        self.shut_down(&irc);
        Ok(())
    }

    fn send(&self, data: &str) -> ModuleResult<()> {
        // No transport is attached to this module; sending has no wire effect.
        trace!(host = %self.host, bytes = data.len(), state = ?self.state(), "send");
        Ok(())
    }

    fn state(&self) -> ConnectionEvent {
        *self.state.lock()
    }
}

impl Module for ConnectionModule {
    type Interface = dyn Connection;
    type Args = (String, u16);

    fn create(irc: &Arc<Irc>, (host, port): (String, u16)) -> Result<Self, BoxError> {
        if host.is_empty() {
            return Err("connection host must not be empty".into());
        }
        Ok(Self {
            irc: Arc::downgrade(irc),
            host,
            port,
            state: Mutex::new(ConnectionEvent::Disconnected),
        })
    }

    fn into_interface(self: Arc<Self>) -> Arc<dyn Connection> {
        self
    }
}

impl Drop for ConnectionModule {
    fn drop(&mut self) {
        match self.irc.upgrade() {
            Some(irc) => self.shut_down(&irc),
            None => trace!(host = %self.host, "Connection dropped with its context"),
        }
    }
}

impl std::fmt::Debug for ConnectionModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionModule")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state())
            .finish()
    }
}

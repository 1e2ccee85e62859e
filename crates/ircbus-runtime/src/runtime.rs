//! Runtime orchestration.
//!
//! [`IrcbusRuntime`] turns an [`IrcbusConfig`] into a running context:
//! logging is initialized, registered packages are installed, the configured
//! connection is loaded, and an [`EventLoop`] drains the queue until shutdown.

use std::future::Future;
use std::sync::Arc;

use ircbus_core::Irc;
use ircbus_core::apis::Connection;
use tokio::signal;
use tracing::{debug, info, warn};

use crate::config::{ConfigLoader, ConfigResult, IrcbusConfig};
use crate::error::RuntimeResult;
use crate::event_loop::{EventLoop, EventLoopHandle, LoopStats};
use crate::logging::{self, LoggingError};

/// A configured context together with its consumer settings.
///
/// ```rust,ignore
/// use ircbus_runtime::IrcbusRuntime;
///
/// let runtime = IrcbusRuntime::builder().profile("production").build()?;
/// runtime.irc().connect(MyCodes::Hello, |event: &Event| { /* ... */ });
/// runtime.run().await?;
/// ```
pub struct IrcbusRuntime {
    config: IrcbusConfig,
    irc: Arc<Irc>,
}

impl IrcbusRuntime {
    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration.
    ///
    /// Initializes logging, installs every registered package, then loads
    /// the connection module when a `[connection]` section is present.
    pub fn from_config(config: IrcbusConfig) -> RuntimeResult<Self> {
        match logging::init_from_config(&config.logging) {
            Ok(()) => {}
            Err(LoggingError::AlreadyInstalled(_)) => {
                debug!("Keeping the subscriber that is already installed");
            }
            Err(err) => return Err(err.into()),
        }

        let irc = Irc::with_registered_packages()?;
        if let Some(ref server) = config.connection {
            let connection =
                irc.load_module::<dyn Connection>((server.host.clone(), server.port))?;
            if server.auto_connect {
                connection.connect()?;
            }
        }

        info!(
            modules = irc.module_count(),
            connection = config.connection.as_ref().map(|c| c.host.as_str()),
            "Runtime initialized"
        );

        Ok(Self { config, irc })
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &IrcbusConfig {
        &self.config
    }

    /// The context driven by this runtime.
    pub fn irc(&self) -> &Arc<Irc> {
        &self.irc
    }

    /// Creates an event loop for the context with the configured settings.
    pub fn event_loop(&self) -> EventLoop {
        EventLoop::new(self.irc.clone(), self.config.event_loop.clone())
    }

    /// Starts the event loop on its own thread.
    pub fn spawn_event_loop(&self) -> RuntimeResult<EventLoopHandle> {
        self.event_loop().spawn()
    }

    /// Runs the event loop until `shutdown` resolves, then shuts the
    /// context down.
    ///
    /// Returns early if the loop ends first, for example after a handler
    /// failure with `stop_on_handler_error` set.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<LoopStats>
    where
        F: Future<Output = ()>,
    {
        let event_loop = self.event_loop();
        let cancel = event_loop.cancellation_token();
        let mut consumer = tokio::spawn(event_loop.run());

        let result = tokio::select! {
            result = &mut consumer => result,
            () = shutdown => {
                cancel.cancel();
                consumer.await
            }
        };

        self.irc.shutdown();
        info!("Runtime stopped");

        result?
    }

    /// Runs the event loop until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<LoopStats> {
        info!("ircbus runtime is now running. Press Ctrl+C to stop.");
        self.run_until(wait_for_shutdown()).await
    }
}

impl std::fmt::Debug for IrcbusRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrcbusRuntime")
            .field("config", &self.config)
            .field("irc", &self.irc)
            .finish()
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(error) => warn!(%error, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(error) => warn!(%error, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating an `IrcbusRuntime` with custom configuration.
///
/// ```rust,ignore
/// let runtime = IrcbusRuntime::builder()
///     .config_file("config/ircbus.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: IrcbusConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration without building a runtime.
    pub fn load_config(self) -> ConfigResult<IrcbusConfig> {
        self.config_loader.load()
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> RuntimeResult<IrcbusRuntime> {
        let config = self.load_config()?;
        IrcbusRuntime::from_config(config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use ircbus_core::Event;
    use ircbus_core::apis::ConnectionEvent;
    use ircbus_core::modules::ConnectionModule;

    use super::*;
    use crate::config::ConnectionConfig;

    fn config_with_connection(auto_connect: bool) -> IrcbusConfig {
        let mut config = IrcbusConfig {
            connection: Some(ConnectionConfig {
                host: "irc.libera.chat".to_string(),
                port: 6697,
                auto_connect,
            }),
            ..Default::default()
        };
        config.event_loop.fetch_timeout_ms = 10;
        config
    }

    #[test]
    fn test_from_config_loads_connection() {
        let runtime = IrcbusRuntime::from_config(config_with_connection(false)).unwrap();

        let module = runtime.irc().module_as::<ConnectionModule>().unwrap();
        assert_eq!(module.host(), "irc.libera.chat");
        assert_eq!(module.port(), 6697);
        assert_eq!(runtime.irc().queued_events(), 0);
    }

    #[test]
    fn test_auto_connect_posts_connecting() {
        let runtime = IrcbusRuntime::from_config(config_with_connection(true)).unwrap();

        let connection = runtime.irc().module::<dyn Connection>().unwrap();
        assert_eq!(connection.state(), ConnectionEvent::Connecting);
        assert_eq!(runtime.irc().queued_events(), 1);
    }

    #[test]
    fn test_without_connection_section() {
        let runtime = IrcbusRuntime::from_config(IrcbusConfig::default()).unwrap();
        assert!(!runtime.irc().is_module_loaded::<dyn Connection>());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_until_drains_and_shuts_down() {
        let runtime = IrcbusRuntime::from_config(config_with_connection(true)).unwrap();
        let changes = Arc::new(AtomicUsize::new(0));
        {
            let changes = changes.clone();
            runtime
                .irc()
                .connect(ConnectionEvent::ConnectionStatusChanged, move |_: &Event| {
                    changes.fetch_add(1, Ordering::SeqCst);
                });
        }

        let observed = changes.clone();
        let stats = runtime
            .run_until(async move {
                while observed.load(Ordering::SeqCst) < 1 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
            .await
            .unwrap();

        assert_eq!(stats.events_emitted, 1);
        assert!(runtime.irc().is_shutting_down());
        assert_eq!(runtime.irc().module_count(), 0);
    }
}

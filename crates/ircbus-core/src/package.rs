//! Context initializers.
//!
//! A [`Package`] runs once against a freshly created [`Irc`] to load modules
//! and connect default handlers. Packages are passed explicitly to
//! [`Irc::with_packages`], or registered at link time in [`PACKAGES`] and
//! applied by [`Irc::with_registered_packages`]:
//!
//! ```rust,ignore
//! use ircbus_core::linkme::distributed_slice;
//! use ircbus_core::{Irc, ModuleResult, PACKAGES};
//!
//! #[distributed_slice(PACKAGES)]
//! #[linkme(crate = ircbus_core::linkme)]
//! fn install_logging(irc: &Arc<Irc>) -> ModuleResult<()> {
//!     irc.connect(ConnectionEvent::ConnectionStatusChanged, |event: &Event| {
//!         tracing::info!(state = %event.original_id(), "connection state changed");
//!     });
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use linkme::distributed_slice;

use crate::context::Irc;
use crate::error::ModuleResult;
use crate::module::{Interface, Module};

/// A one-shot context initializer.
pub type Package = Box<dyn FnOnce(&Arc<Irc>) -> ModuleResult<()> + Send>;

/// Initializers registered at link time.
#[distributed_slice]
pub static PACKAGES: [fn(&Arc<Irc>) -> ModuleResult<()>];

/// Wraps a closure as a [`Package`].
pub fn package<F>(install: F) -> Package
where
    F: FnOnce(&Arc<Irc>) -> ModuleResult<()> + Send + 'static,
{
    Box::new(install)
}

/// A package that loads the default implementation of interface `I`.
pub fn load_module<I>(args: <I::Default as Module>::Args) -> Package
where
    I: ?Sized + Interface,
    <I::Default as Module>::Args: Send + 'static,
{
    package(move |irc| irc.load_module::<I>(args).map(|_| ()))
}

/// A package that loads module `M` under its interface.
pub fn load_module_as<M>(args: M::Args) -> Package
where
    M: Module,
    M::Args: Send + 'static,
{
    package(move |irc| irc.load_module_as::<M>(args).map(|_| ()))
}

//! Pluggable capability modules.
//!
//! A capability is described by an *interface*, usually a trait object type
//! such as `dyn Connection`, that names exactly one default implementation.
//! A context holds at most one loaded module per interface.
//!
//! ```rust,ignore
//! pub trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! pub struct English { irc: Weak<Irc> }
//!
//! impl Greeter for English { /* ... */ }
//!
//! impl Module for English {
//!     type Interface = dyn Greeter;
//!     type Args = ();
//!
//!     fn create(irc: &Arc<Irc>, _: ()) -> Result<Self, BoxError> {
//!         Ok(Self { irc: Arc::downgrade(irc) })
//!     }
//!
//!     fn into_interface(self: Arc<Self>) -> Arc<dyn Greeter> {
//!         self
//!     }
//! }
//!
//! default_implementation!(dyn Greeter => English);
//!
//! // Resolves `dyn Greeter` to `English`.
//! let greeter = irc.load_module::<dyn Greeter>(())?;
//! ```
//!
//! Modules that need the context must keep a `Weak<Irc>`; a strong reference
//! would keep the context alive forever.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::context::Irc;
use crate::error::{BoxError, ModuleError, ModuleResult};

// =============================================================================
// Traits
// =============================================================================

/// A capability interface with a declared default implementation.
///
/// Implement it with [`default_implementation!`](crate::default_implementation).
/// The bound on `Default` is what rejects, at compile time, a default that
/// does not implement the interface.
pub trait Interface: Send + Sync + 'static {
    /// The module loaded when no implementation is named explicitly.
    type Default: Module<Interface = Self>;
}

/// A concrete module that can be loaded into an [`Irc`] context.
pub trait Module: Sized + Send + Sync + 'static {
    /// The interface this module is registered under.
    type Interface: ?Sized + Interface;

    /// Construction arguments.
    type Args;

    /// Builds the module. Failing leaves the registry unchanged.
    fn create(irc: &Arc<Irc>, args: Self::Args) -> Result<Self, BoxError>;

    /// Views the module through its interface.
    fn into_interface(self: Arc<Self>) -> Arc<Self::Interface>;
}

/// Declares the default implementation of an interface.
///
/// ```rust,ignore
/// default_implementation!(dyn Connection => ConnectionModule);
/// // A concrete module that is its own interface:
/// default_implementation!(Counter => Counter);
/// ```
#[macro_export]
macro_rules! default_implementation {
    ($interface:ty => $module:ty) => {
        impl $crate::Interface for $interface {
            type Default = $module;
        }
    };
}

// =============================================================================
// Registry
// =============================================================================

struct LoadedModule {
    /// `Arc<M::Interface>`, erased.
    interface: Box<dyn Any + Send + Sync>,
    instance: Arc<dyn Any + Send + Sync>,
    module_type: TypeId,
    module_name: &'static str,
}

/// Interface key to loaded module.
///
/// Constructors and destructors always run outside the lock, so modules may
/// load or look up other modules while being built or dropped.
#[derive(Default)]
pub(crate) struct ModuleRegistry {
    modules: RwLock<HashMap<TypeId, LoadedModule>>,
}

impl ModuleRegistry {
    pub(crate) fn load<M: Module>(&self, irc: &Arc<Irc>, args: M::Args) -> ModuleResult<Arc<M>> {
        let module_name = std::any::type_name::<M>();
        let instance = M::create(irc, args)
            .map(Arc::new)
            .map_err(|source| ModuleError::Construction {
                module: module_name,
                source,
            })?;

        let loaded = LoadedModule {
            interface: Box::new(instance.clone().into_interface()),
            instance: instance.clone(),
            module_type: TypeId::of::<M>(),
            module_name,
        };
        let previous = self
            .modules
            .write()
            .insert(TypeId::of::<M::Interface>(), loaded);

        match &previous {
            Some(old) => info!(
                interface = std::any::type_name::<M::Interface>(),
                module = module_name,
                replaced = old.module_name,
                "Module replaced"
            ),
            None => info!(
                interface = std::any::type_name::<M::Interface>(),
                module = module_name,
                "Module loaded"
            ),
        }
        drop(previous);

        Ok(instance)
    }

    pub(crate) fn get<I: ?Sized + Interface>(&self) -> Option<Arc<I>> {
        self.modules
            .read()
            .get(&TypeId::of::<I>())
            .and_then(|loaded| loaded.interface.downcast_ref::<Arc<I>>())
            .cloned()
    }

    pub(crate) fn get_as<M: Module>(&self) -> Option<Arc<M>> {
        let instance = self
            .modules
            .read()
            .get(&TypeId::of::<M::Interface>())
            .map(|loaded| loaded.instance.clone())?;
        instance.downcast::<M>().ok()
    }

    pub(crate) fn contains(&self, key: TypeId) -> bool {
        self.modules.read().contains_key(&key)
    }

    pub(crate) fn len(&self) -> usize {
        self.modules.read().len()
    }

    /// Unloads the module under `M`'s interface if it is an `M`.
    pub(crate) fn unload<M: Module>(&self) -> bool {
        let key = TypeId::of::<M::Interface>();
        let removed = {
            let mut modules = self.modules.write();
            match modules.get(&key) {
                Some(loaded) if loaded.module_type == TypeId::of::<M>() => modules.remove(&key),
                _ => None,
            }
        };
        Self::finish_unload(removed)
    }

    pub(crate) fn unload_key(&self, key: TypeId) -> bool {
        let removed = self.modules.write().remove(&key);
        Self::finish_unload(removed)
    }

    fn finish_unload(removed: Option<LoadedModule>) -> bool {
        match removed {
            Some(loaded) => {
                info!(module = loaded.module_name, "Module unloaded");
                true
            }
            None => false,
        }
    }

    /// Unloads everything, including modules loaded by destructors meanwhile.
    pub(crate) fn unload_all(&self) -> usize {
        let mut total = 0;
        loop {
            let drained = std::mem::take(&mut *self.modules.write());
            if drained.is_empty() {
                break;
            }
            total += drained.len();
            for loaded in drained.into_values() {
                debug!(module = loaded.module_name, "Unloading module");
                drop(loaded);
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English {
        drops: Arc<AtomicUsize>,
    }

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_owned()
        }
    }

    impl Drop for English {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Module for English {
        type Interface = dyn Greeter;
        type Args = Arc<AtomicUsize>;

        fn create(_: &Arc<Irc>, drops: Self::Args) -> Result<Self, BoxError> {
            Ok(Self { drops })
        }

        fn into_interface(self: Arc<Self>) -> Arc<dyn Greeter> {
            self
        }
    }

    crate::default_implementation!(dyn Greeter => English);

    #[derive(Debug)]
    struct Loud;

    impl Greeter for Loud {
        fn greet(&self) -> String {
            "HELLO".to_owned()
        }
    }

    impl Module for Loud {
        type Interface = dyn Greeter;
        type Args = bool;

        fn create(_: &Arc<Irc>, succeed: bool) -> Result<Self, BoxError> {
            if succeed {
                Ok(Self)
            } else {
                Err("microphone unplugged".into())
            }
        }

        fn into_interface(self: Arc<Self>) -> Arc<dyn Greeter> {
            self
        }
    }

    /// A module that is its own interface and depends on a greeter.
    struct Announcer {
        irc: Weak<Irc>,
        greeting: String,
    }

    impl Module for Announcer {
        type Interface = Announcer;
        type Args = ();

        fn create(irc: &Arc<Irc>, _: ()) -> Result<Self, BoxError> {
            let greeter = match irc.try_module::<dyn Greeter>() {
                Some(greeter) => greeter,
                None => irc.load_module::<dyn Greeter>(Arc::new(AtomicUsize::new(0)))?,
            };
            Ok(Self {
                irc: Arc::downgrade(irc),
                greeting: greeter.greet(),
            })
        }

        fn into_interface(self: Arc<Self>) -> Arc<Self> {
            self
        }
    }

    crate::default_implementation!(Announcer => Announcer);

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn test_default_implementation_is_resolved() {
        let irc = Irc::new();
        let greeter = irc.load_module::<dyn Greeter>(counter()).unwrap();

        assert_eq!(greeter.greet(), "hello");
        assert!(irc.module_as::<English>().is_some());
        assert!(irc.module_as::<Loud>().is_none());
        assert!(irc.is_module_loaded::<dyn Greeter>());
    }

    #[test]
    fn test_explicit_implementation_overrides_default() {
        let irc = Irc::new();
        let drops = counter();
        irc.load_module::<dyn Greeter>(drops.clone()).unwrap();

        irc.load_module_as::<Loud>(true).unwrap();

        assert_eq!(irc.module::<dyn Greeter>().unwrap().greet(), "HELLO");
        assert!(irc.module_as::<Loud>().is_some());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(irc.module_count(), 1);
    }

    #[test]
    fn test_failed_construction_keeps_previous_module() {
        let irc = Irc::new();
        let drops = counter();
        irc.load_module::<dyn Greeter>(drops.clone()).unwrap();

        let err = irc.load_module_as::<Loud>(false).unwrap_err();

        assert!(matches!(err, ModuleError::Construction { module, .. } if module.ends_with("Loud")));
        assert_eq!(irc.module::<dyn Greeter>().unwrap().greet(), "hello");
        assert_eq!(drops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lookup_of_missing_module() {
        let irc = Irc::new();

        assert!(irc.try_module::<dyn Greeter>().is_none());
        assert!(matches!(
            irc.module::<dyn Greeter>(),
            Err(ModuleError::NotLoaded { .. })
        ));
    }

    #[test]
    fn test_typed_unload_checks_dynamic_type() {
        let irc = Irc::new();
        let drops = counter();
        irc.load_module::<dyn Greeter>(drops.clone()).unwrap();

        assert!(!irc.unload_module::<Loud>());
        assert!(irc.is_module_loaded::<dyn Greeter>());

        assert!(irc.unload_module::<English>());
        assert!(!irc.unload_module::<English>());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unload_by_key() {
        let irc = Irc::new();
        irc.load_module_as::<Loud>(true).unwrap();

        assert!(irc.unload_module_by_key(TypeId::of::<dyn Greeter>()));
        assert!(!irc.unload_module_by_key(TypeId::of::<dyn Greeter>()));
        assert_eq!(irc.module_count(), 0);
    }

    #[test]
    fn test_module_can_load_its_dependencies() {
        let irc = Irc::new();
        let announcer = irc.load_module::<Announcer>(()).unwrap();

        assert_eq!(announcer.greeting, "hello");
        assert!(announcer.irc.upgrade().is_some());
        assert_eq!(irc.module_count(), 2);
    }

    #[test]
    fn test_held_handle_outlives_unload() {
        let irc = Irc::new();
        let drops = counter();
        let greeter = irc.load_module::<dyn Greeter>(drops.clone()).unwrap();

        irc.unload_module::<English>();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(greeter.greet(), "hello");

        drop(greeter);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_unloads_every_module() {
        let irc = Irc::new();
        let drops = counter();
        irc.load_module::<dyn Greeter>(drops.clone()).unwrap();
        irc.load_module::<Announcer>(()).unwrap();

        irc.shutdown();

        assert_eq!(irc.module_count(), 0);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}

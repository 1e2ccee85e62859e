//! Heterogeneous per-event storage.
//!
//! [`ComponentMap`] holds at most one value per type. Handlers use it to
//! attach ambient state to an [`Event`](crate::Event) for the event's
//! lifetime, for example the [`ConnectionHandle`](crate::ConnectionHandle) of the
//! handler currently running.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::error::{ComponentError, ComponentResult};

type Slot = Box<dyn Any + Send>;

/// Container keyed by type, holding zero or one value per type.
///
/// Lookups match the exact type only. Inserting a value of a type that is
/// already present replaces the old value. Constructors run before the map
/// is touched, so a failing constructor leaves the map exactly as it was.
#[derive(Default)]
pub struct ComponentMap {
    content: HashMap<TypeId, Slot>,
}

impl ComponentMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored `T`.
    pub fn get<T: Any>(&self) -> ComponentResult<&T> {
        self.content
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_ref::<T>())
            .ok_or_else(not_found::<T>)
    }

    /// Returns the stored `T` mutably.
    pub fn get_mut<T: Any>(&mut self) -> ComponentResult<&mut T> {
        self.content
            .get_mut(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_mut::<T>())
            .ok_or_else(not_found::<T>)
    }

    /// Returns `true` if a `T` is stored.
    pub fn contains<T: Any>(&self) -> bool {
        self.content.contains_key(&TypeId::of::<T>())
    }

    /// Stores `value`, replacing any previous `T`.
    pub fn emplace<T: Any + Send>(&mut self, value: T) -> &mut T {
        let slot = match self.content.entry(TypeId::of::<T>()) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(Box::new(value));
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(Box::new(value)),
        };
        downcast_slot(slot)
    }

    /// Constructs a `T` with `ctor` and stores it, replacing any previous `T`.
    ///
    /// If `ctor` fails the map is left untouched and the error is returned.
    pub fn try_emplace<T, E, F>(&mut self, ctor: F) -> Result<&mut T, E>
    where
        T: Any + Send,
        F: FnOnce() -> Result<T, E>,
    {
        let value = ctor()?;
        Ok(self.emplace(value))
    }

    /// Returns the stored `T`, constructing and storing one with `ctor` if absent.
    pub fn get_or_emplace<T, F>(&mut self, ctor: F) -> &mut T
    where
        T: Any + Send,
        F: FnOnce() -> T,
    {
        let slot = self
            .content
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(ctor()));
        downcast_slot(slot)
    }

    /// Returns the stored `T`, constructing one with `ctor` if absent.
    ///
    /// A failing `ctor` leaves the slot empty and returns its error.
    pub fn try_get_or_emplace<T, E, F>(&mut self, ctor: F) -> Result<&mut T, E>
    where
        T: Any + Send,
        F: FnOnce() -> Result<T, E>,
    {
        let slot = match self.content.entry(TypeId::of::<T>()) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => vacant.insert(Box::new(ctor()?)),
        };
        Ok(downcast_slot(slot))
    }

    /// Stores `value` and returns the `T` it replaced, if any.
    pub fn replace<T: Any + Send>(&mut self, value: T) -> Option<T> {
        let previous = self.take::<T>();
        self.emplace(value);
        previous
    }

    /// Removes and returns the stored `T`.
    pub fn take<T: Any>(&mut self) -> Option<T> {
        self.content
            .remove(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Removes the stored `T`. Returns whether anything was removed.
    pub fn erase<T: Any>(&mut self) -> bool {
        self.content.remove(&TypeId::of::<T>()).is_some()
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

fn not_found<T>() -> ComponentError {
    ComponentError::NotFound {
        type_name: std::any::type_name::<T>(),
    }
}

fn downcast_slot<T: Any>(slot: &mut Slot) -> &mut T {
    match slot.downcast_mut::<T>() {
        Some(value) => value,
        None => unreachable!("component stored under the TypeId of another type"),
    }
}

impl std::fmt::Debug for ComponentMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentMap")
            .field("len", &self.content.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Nick(String);

    #[derive(Debug, PartialEq)]
    struct Counter(u32);

    #[test]
    fn test_get_missing_is_not_found() {
        let map = ComponentMap::new();
        let err = map.get::<Nick>().unwrap_err();
        assert!(matches!(err, ComponentError::NotFound { type_name } if type_name.ends_with("Nick")));
    }

    #[test]
    fn test_emplace_replaces_previous_value() {
        let mut map = ComponentMap::new();
        map.emplace(Nick("alice".into()));
        map.emplace(Nick("bob".into()));

        assert_eq!(map.len(), 1);
        assert_eq!(map.get::<Nick>().unwrap(), &Nick("bob".into()));
    }

    #[test]
    fn test_failed_construction_keeps_previous_value() {
        let mut map = ComponentMap::new();
        map.emplace(Nick("alice".into()));

        let result = map.try_emplace::<Nick, _, _>(|| Err("nick in use"));

        assert_eq!(result.unwrap_err(), "nick in use");
        assert_eq!(map.get::<Nick>().unwrap(), &Nick("alice".into()));
    }

    #[test]
    fn test_failed_construction_into_empty_slot_leaves_it_empty() {
        let mut map = ComponentMap::new();
        let result = map.try_emplace::<Nick, _, _>(|| Err(()));

        assert!(result.is_err());
        assert!(!map.contains::<Nick>());
        assert!(map.is_empty());
    }

    #[test]
    fn test_panicking_constructor_leaves_map_untouched() {
        let mut map = ComponentMap::new();
        map.emplace(Counter(7));

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            map.try_emplace::<Counter, (), _>(|| panic!("constructor blew up"))
                .map(|_| ())
        }));

        assert!(outcome.is_err());
        assert_eq!(map.get::<Counter>().unwrap(), &Counter(7));
    }

    #[test]
    fn test_get_or_emplace_keeps_existing() {
        let mut map = ComponentMap::new();
        map.get_or_emplace(|| Counter(1)).0 += 1;
        map.get_or_emplace(|| Counter(100)).0 += 1;

        assert_eq!(map.get::<Counter>().unwrap(), &Counter(3));
    }

    #[test]
    fn test_try_get_or_emplace() {
        let mut map = ComponentMap::new();

        let result = map.try_get_or_emplace::<Counter, _, _>(|| Err("no counter"));
        assert_eq!(result.unwrap_err(), "no counter");
        assert!(map.is_empty());

        map.try_get_or_emplace::<Counter, (), _>(|| Ok(Counter(5)))
            .unwrap()
            .0 += 1;
        let existing = map.try_get_or_emplace::<Counter, &str, _>(|| Err("not called"));
        assert_eq!(existing.unwrap(), &mut Counter(6));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_lookup_is_exact_type() {
        let mut map = ComponentMap::new();
        map.emplace(Counter(1));

        assert!(map.get::<u32>().is_err());
        assert!(map.get::<Counter>().is_ok());
    }

    #[test]
    fn test_erase_and_take() {
        let mut map = ComponentMap::new();
        map.emplace(Nick("carol".into()));
        map.emplace(Counter(5));

        assert!(map.erase::<Nick>());
        assert!(!map.erase::<Nick>());
        assert_eq!(map.take::<Counter>(), Some(Counter(5)));
        assert_eq!(map.take::<Counter>(), None);
        assert!(map.is_empty());
    }

    #[test]
    fn test_replace_returns_previous() {
        let mut map = ComponentMap::new();
        assert_eq!(map.replace(Counter(1)), None);
        assert_eq!(map.replace(Counter(2)), Some(Counter(1)));
        assert_eq!(map.get::<Counter>().unwrap(), &Counter(2));
    }
}

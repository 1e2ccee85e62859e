//! Event identifiers.
//!
//! An [`EventId`] pairs a capability group (the type of the enum the code was
//! declared in) with an integer code. The same identifier names both "what
//! happened" and "which handler chain runs next".
//!
//! ```rust,ignore
//! use ircbus_core::{event_codes, EventId};
//!
//! event_codes! {
//!     pub enum ChatEvent {
//!         MessageReceived,
//!         Joined,
//!     }
//! }
//!
//! let id = EventId::from(ChatEvent::Joined);
//! assert!(id.is_group::<ChatEvent>());
//! ```

use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Integer width of an event code.
pub type Code = u32;

/// A type whose values are event codes of one capability group.
///
/// Implement it with [`event_codes!`](crate::event_codes), which also fixes
/// the enum representation to [`Code`].
pub trait EventCode: Copy + Send + Sync + 'static {
    /// Returns the integer code of this value.
    fn code(self) -> Code;
}

/// Declares a `#[repr(u32)]` enum of event codes and implements [`EventCode`] for it.
#[macro_export]
macro_rules! event_codes {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u32)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),*
        }

        impl $crate::EventCode for $name {
            #[inline]
            fn code(self) -> $crate::Code {
                self as $crate::Code
            }
        }
    };
}

/// Group of the "no identifier" value.
enum NoneGroup {}

/// A comparable, hashable event identifier.
///
/// Equality, ordering and hashing only look at the group and the code.
#[derive(Clone, Copy)]
pub struct EventId {
    group: TypeId,
    group_name: &'static str,
    code: Code,
}

impl EventId {
    /// Creates an identifier from a group type and a raw code.
    ///
    /// Prefer `EventId::from(MyCodes::Variant)`; this form is for groups whose
    /// codes are only known at runtime (numeric protocol replies and the like).
    pub fn of<G: ?Sized + 'static>(code: Code) -> Self {
        Self {
            group: TypeId::of::<G>(),
            group_name: std::any::type_name::<G>(),
            code,
        }
    }

    /// The "no identifier" value.
    pub fn none() -> Self {
        Self::of::<NoneGroup>(0)
    }

    /// Returns `true` if this is the "no identifier" value.
    pub fn is_none(&self) -> bool {
        *self == Self::none()
    }

    /// Returns the integer code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Returns the `TypeId` of the capability group.
    pub fn group(&self) -> TypeId {
        self.group
    }

    /// Returns the type name of the capability group.
    pub fn group_name(&self) -> &'static str {
        self.group_name
    }

    /// Returns `true` if this identifier belongs to group `G`.
    pub fn is_group<G: ?Sized + 'static>(&self) -> bool {
        self.group == TypeId::of::<G>()
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::none()
    }
}

impl<E: EventCode> From<E> for EventId {
    fn from(code: E) -> Self {
        Self::of::<E>(code.code())
    }
}

impl PartialEq for EventId {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group && self.code == other.code
    }
}

impl Eq for EventId {}

impl<E: EventCode> PartialEq<E> for EventId {
    fn eq(&self, other: &E) -> bool {
        *self == EventId::from(*other)
    }
}

impl Hash for EventId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.group.hash(state);
        self.code.hash(state);
    }
}

impl PartialOrd for EventId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.group
            .cmp(&other.group)
            .then(self.code.cmp(&other.code))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("<none>");
        }
        let short = self
            .group_name
            .rsplit("::")
            .next()
            .unwrap_or(self.group_name);
        write!(f, "{short}#{}", self.code)
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({self})")
    }
}

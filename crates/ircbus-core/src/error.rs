//! Unified error types for the ircbus core.
//!
//! Lookup misses ([`ComponentError`], [`ModuleError::NotLoaded`]) are always
//! recoverable and reported separately from construction and handler
//! failures. Programmer errors such as popping an empty queue are not errors
//! here: they are debug assertions with a bounded release-mode outcome.

use thiserror::Error;

use crate::event_id::EventId;

/// Boxed error type produced by handlers and module constructors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Component Errors
// =============================================================================

/// Errors returned by [`ComponentMap`](crate::ComponentMap) lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComponentError {
    /// No value of the requested type is stored.
    #[error("no component of type '{type_name}' stored")]
    NotFound {
        /// The requested type.
        type_name: &'static str,
    },
}

// =============================================================================
// Module Errors
// =============================================================================

/// Errors that can occur in module registry operations.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// No module is loaded under the requested interface.
    #[error("no module loaded for interface '{interface}'")]
    NotLoaded {
        /// The requested interface.
        interface: &'static str,
    },

    /// The module constructor failed; the registry is unchanged.
    #[error("failed to construct module '{module}': {source}")]
    Construction {
        /// The concrete module type.
        module: &'static str,
        /// The constructor's error.
        #[source]
        source: BoxError,
    },

    /// The owning context has already been dropped.
    #[error("the IRC context is gone")]
    ContextGone,
}

impl ModuleError {
    /// Creates a not-loaded error for interface `I`.
    pub fn not_loaded<I: ?Sized>() -> Self {
        Self::NotLoaded {
            interface: std::any::type_name::<I>(),
        }
    }
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Errors that abort a dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A connected handler failed; the rest of the chain was skipped.
    #[error("handler for {id} failed: {source}")]
    Handler {
        /// The identifier being dispatched when the handler failed.
        id: EventId,
        /// The handler's error.
        #[source]
        source: BoxError,
    },

    /// The owning context has already been dropped.
    #[error("the IRC context is gone")]
    ContextGone,
}

impl DispatchError {
    /// Returns the failing identifier, if the failure came from a handler.
    pub fn id(&self) -> Option<EventId> {
        match self {
            Self::Handler { id, .. } => Some(*id),
            Self::ContextGone => None,
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for component lookups.
pub type ComponentResult<T> = Result<T, ComponentError>;

/// Result type for module operations.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Result type for dispatch operations.
pub type DispatchResult<T = ()> = Result<T, DispatchError>;

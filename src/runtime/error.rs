//! Error types for the bridge
//!
//! Failures are split by where they originate: the invoked target
//! ([`CallError`]), the marshaling machinery ([`BridgeError`]), and the
//! scheduler thread's lifecycle ([`LifecycleError`]).

use std::any::Any;
use std::time::Duration;

use thiserror::Error;

/// Failure raised by an invoked callable.
///
/// Captured on the owner thread and replayed in the caller's context.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CallError {
    /// The callable reported an error
    #[error("{0}")]
    Raised(String),

    /// The callable panicked
    #[error("target panicked: {0}")]
    Panicked(String),

    /// Wrong number of positional arguments
    #[error("arity mismatch: expected {expected} arguments, found {found}")]
    Arity { expected: usize, found: usize },

    /// Argument of the wrong type
    #[error("type mismatch: expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },

    /// Keyword argument the callable does not accept
    #[error("unknown keyword argument: {0}")]
    UnknownKeyword(String),
}

impl CallError {
    /// Shorthand for [`CallError::Raised`].
    pub fn raised(message: impl Into<String>) -> Self {
        CallError::Raised(message.into())
    }
}

/// Failure of a cross-thread access.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The target itself failed
    #[error(transparent)]
    Target(#[from] CallError),

    /// The owner loop cannot accept or finish the call
    #[error("bridge unavailable: {0}")]
    Unavailable(&'static str),

    /// The owner thread did not finish the call in time
    #[error("call to `{target}` timed out after {after:?}")]
    Timeout { target: String, after: Duration },

    /// Name lookup found nothing
    #[error("`{type_name}` has no member `{name}`")]
    NoSuchMember { type_name: String, name: String },

    /// Item lookup found nothing
    #[error("`{type_name}` has no item {key}")]
    NoSuchItem { type_name: String, key: String },

    /// An object was used as a callable
    #[error("`{0}` is not callable")]
    NotCallable(String),

    /// A callable was used as an object
    #[error("`{0}` is a callable and has no members")]
    NotAnObject(String),
}

impl BridgeError {
    /// The captured target failure, if this is one.
    pub fn target(&self) -> Option<&CallError> {
        match self {
            BridgeError::Target(err) => Some(err),
            _ => None,
        }
    }

    #[inline]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BridgeError::Unavailable(_))
    }

    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}

/// Fatal failure of the scheduler thread.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The initialization hook failed
    #[error("scheduler initialization failed: {0:#}")]
    Init(anyhow::Error),

    /// The teardown hook failed
    #[error("scheduler teardown failed: {0:#}")]
    Teardown(anyhow::Error),

    /// The cooperative runtime could not be built
    #[error("failed to build the scheduler runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The scheduler thread could not be spawned
    #[error("failed to spawn the scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The scheduler thread panicked
    #[error("scheduler thread panicked: {0}")]
    Panicked(String),
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

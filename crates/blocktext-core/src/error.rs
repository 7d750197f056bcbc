//! Error types for block text synchronization.

use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

/// Errors that can occur while seeding, editing or replacing block content.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
#[non_exhaustive]
pub enum SyncError {
    /// A delta operation was malformed. Nothing from the delta was applied.
    #[error("invalid delta operation at index {index}: {reason}")]
    #[diagnostic(code(blocktext::delta::invalid_op))]
    InvalidDeltaOperation {
        /// Position of the offending operation in the delta.
        index: usize,
        /// What was wrong with it.
        reason: SmolStr,
    },

    /// A local edit referenced a position past the end of the content.
    #[error("edit out of bounds: offset {offset} exceeds length {len}")]
    #[diagnostic(code(blocktext::edit::out_of_bounds))]
    EditOutOfBounds {
        /// The first offending char offset.
        offset: usize,
        /// Content length (in chars) at the time the op was checked.
        len: usize,
    },

    /// The replicated text backend failed.
    #[error("replica error: {0}")]
    #[diagnostic(code(blocktext::replica))]
    Replica(String),

    /// The session was already closed.
    #[error("session closed")]
    #[diagnostic(code(blocktext::session::closed))]
    SessionClosed,

    /// A session was opened outside a tokio runtime; debounced writes need
    /// one (and a `LocalSet`) to schedule their timers.
    #[error("no tokio runtime: block sessions must run inside a LocalSet")]
    #[diagnostic(code(blocktext::session::no_runtime))]
    NoRuntime,
}

impl SyncError {
    pub(crate) fn invalid_op(index: usize, reason: impl Into<SmolStr>) -> Self {
        SyncError::InvalidDeltaOperation {
            index,
            reason: reason.into(),
        }
    }
}

/// Failure reported by the external document store for an outgoing update.
///
/// Never fatal: the propagator logs it and leaves local content alone.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[error("persistence write failed: {message}")]
#[diagnostic(code(blocktext::persistence::write))]
pub struct PersistenceError {
    message: SmolStr,
}

impl PersistenceError {
    /// Create a new persistence error.
    pub fn new(message: impl Into<SmolStr>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message reported by the store.
    pub fn message(&self) -> &str {
        &self.message
    }
}

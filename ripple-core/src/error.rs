//! Error types for the reactive runtime.
//!
//! Producer and callback failures are carried as [`BoxError`] so user code can
//! return whatever error type it likes. The runtime wraps them in
//! [`ReactiveError`] together with the expression of the computation that
//! failed, then either reports them through the installed error handler
//! (user-facing computations) or returns them to the caller (internal ones).

use thiserror::Error;

use crate::reactive::ComputationId;

/// Boxed error returned by producers and callbacks.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Errors raised by the reactive runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// The producer of a computation failed.
    #[error("getter for watcher \"{expression}\" failed: {source}")]
    Evaluation {
        expression: String,
        #[source]
        source: BoxError,
    },

    /// The callback of a computation failed.
    #[error("callback for watcher \"{expression}\" failed: {source}")]
    Callback {
        expression: String,
        #[source]
        source: BoxError,
    },

    /// A watch path could not be parsed into property accesses.
    #[error("invalid watch path \"{0}\": only simple dot-delimited paths are supported")]
    InvalidPath(String),

    /// A pulled computation has no value (torn down before its first evaluation).
    #[error("computation \"{expression}\" has no value")]
    Unavailable { expression: String },

    /// A job kept re-queuing itself during a single flush.
    #[error("possible infinite update loop in computation {id} (ran {count} times in one flush)")]
    CircularUpdate { id: ComputationId, count: usize },

    /// Runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl ReactiveError {
    /// The expression of the computation this error originated from, if any.
    pub fn expression(&self) -> Option<&str> {
        match self {
            Self::Evaluation { expression, .. }
            | Self::Callback { expression, .. }
            | Self::Unavailable { expression } => Some(expression),
            _ => None,
        }
    }
}

/// Context passed to the error handler alongside the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Name of the owner the failing computation belongs to.
    pub owner: Option<String>,
    /// Where the failure happened, e.g. `getter for watcher "a.b"`.
    pub info: String,
}

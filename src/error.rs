//! Error types for wide-event
//!
//! Two families live here:
//! - [`Error`]: recoverable failures at the sink boundary (serialization, I/O).
//! - [`UsageError`]: instrumentation bugs. These are never returned; they are
//!   raised through [`fatal`], which logs and panics.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable errors raised while shipping a finished record.
#[derive(Error, Debug)]
pub enum Error {
    /// Record could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// IO error while writing an event
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Sink lock was poisoned by a panicking writer
    #[error("Sink poisoned: {0}")]
    SinkPoisoned(String),
}

/// Instrumentation bugs. Each variant is fatal: it signals a mistake in the
/// calling code that must be fixed during development.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// Key is empty or contains a disallowed character
    #[error("invalid key {0:?}: keys must be non-empty and contain only alphanumerics, '_', '/' or '@'")]
    InvalidKey(String),

    /// Flat key/value argument list has an odd length
    #[error("odd number of key/value arguments ({0})")]
    OddArguments(usize),

    /// Flat key/value argument list has a non-string value in key position
    #[error("argument {0} must be a string key, got {1}")]
    NonStringKey(usize, &'static str),

    /// Key is bound to a nested group and cannot take a scalar
    #[error("key {0:?} is bound to a group and cannot be rebound to a value")]
    GroupRebind(String),

    /// Key is bound to a scalar and cannot become a group
    #[error("key {0:?} is bound to a value and cannot be rebound to a group")]
    ScalarRebind(String),

    /// A root record stored as a group value
    #[error("key {0:?}: a root record cannot be stored as a group")]
    RootAsGroup(String),

    /// Group already has a parent in some tree
    #[error("key {0:?}: group is already attached to a tree")]
    AlreadyAttached(String),

    /// Group is the target node or one of its ancestors
    #[error("key {0:?}: a group cannot be stored beneath itself")]
    Cycle(String),

    /// `add` between values with no shared merge rule
    #[error("cannot add {new} to {existing} under key {key:?}")]
    Unmergeable {
        /// Field name
        key: String,
        /// Kind of the stored value
        existing: &'static str,
        /// Kind of the incoming value
        new: &'static str,
    },

    /// Scope was never initialized with a root record
    #[error("scope has no {0} record; establish a root with Scope::new_record first")]
    UninitializedScope(&'static str),

    /// Mutation of a record after `finish`
    #[error("record used after finish")]
    Finished,
}

/// Abort on an instrumentation bug.
///
/// Logs the error through `tracing` so it reaches the configured subscriber,
/// then panics with the same message.
#[track_caller]
pub fn fatal(err: UsageError) -> ! {
    tracing::error!(error = %err, "wide-event usage error");
    panic!("wide-event: {err}");
}

//! Error types for the class registry and object model.

use thiserror::Error;

/// Failure reported by a class lifecycle callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct LifecycleError(pub String);

/// Errors reported by registry and object operations.
///
/// All variants are recoverable and carry the offending identifier;
/// out-of-memory is not represented here because allocation failure aborts
/// the process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObjectError {
    /// A class with this name (or leaf name) is already registered.
    #[error("class '{name}' is already registered")]
    DuplicateClass { name: String },

    /// No class with this name is registered.
    #[error("class '{name}' is not registered")]
    ClassNotFound { name: String },

    /// The descriptor is malformed or its ancestry chain references an
    /// unregistered base.
    #[error("invalid descriptor for class '{name}': {detail}")]
    InvalidDescriptor { name: String, detail: String },

    /// The class still has live instances and cannot be unregistered.
    #[error("class '{name}' still has {live} live instance(s)")]
    ClassInUse { name: String, live: usize },

    /// A lifecycle callback reported a failure.
    #[error("class '{class}' {op} callback failed: {source}")]
    Lifecycle {
        class: String,
        op: &'static str,
        source: LifecycleError,
    },
}

//! Parlance: an embeddable object runtime for a speech-processing engine.
//!
//! Parlance lets independently compiled plugins register new data types at
//! process start or on demand, allocates instances of those types with
//! automatic lifetime management, and dispatches behavior polymorphically
//! without static knowledge of concrete types, safely under concurrent
//! synthesis worker threads.
//!
//! The runtime is built from three subsystems plus a facade:
//!
//! - [`parlance_core`]: the generic resizable [`HashTable`] backing every
//!   keyed lookup, the concurrency guard, and version pairs.
//! - [`parlance_object`]: the class registry and the reference-counted
//!   object model with ancestry-based casting and dispatch.
//! - [`parlance_plugin`]: the loader that extends the registry from
//!   versioned shared libraries behind an ABI gate.
//! - This crate: the process lifecycle ([`init`] / [`Runtime::quit`]) and
//!   re-exports.
//!
//! # Example
//!
//! ```
//! use parlance::prelude::*;
//!
//! let runtime = parlance::init().unwrap();
//! runtime
//!     .registry()
//!     .register(ClassDescriptor::new("Utterance", 16))
//!     .unwrap();
//!
//! let utterance = runtime.allocate("Utterance").unwrap();
//! assert!(utterance.is_a("Utterance"));
//! assert_eq!(utterance.ref_count(), 1);
//!
//! runtime.quit();
//! ```

use thiserror::Error;

mod runtime;

pub use runtime::{Runtime, init};

pub use parlance_core::{HOST_ABI, HashTable, HashTableError, Version};
pub use parlance_object::{
    ClassDescriptor, ClassId, ClassRegistry, Lifecycle, LifecycleError, Object, ObjectError,
    ObjectSystem, ROOT_CLASS, WeakObject, builtin, leaf_of,
};
pub use parlance_plugin::{PluginError, PluginInfo, PluginManager, abi};

/// Convenience re-exports for embedding applications and plugin crates.
pub mod prelude {
    pub use crate::abi::{PLUGIN_CLASS, PLUGIN_ENTRY_SYMBOL};
    pub use crate::builtin::{
        FLOAT_CLASS, INT_CLASS, STRING_CLASS, float_value, int_value, new_float, new_int,
        new_string, string_value,
    };
    pub use crate::{
        ClassDescriptor, Error, HOST_ABI, Object, ObjectError, PluginError, ROOT_CLASS, Result,
        Runtime, Version, init,
    };
}

/// Top-level error wrapper unifying the subsystem error types.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    HashTable(#[from] HashTableError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Result alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

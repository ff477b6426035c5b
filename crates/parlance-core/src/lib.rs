//! Core containers and primitives for the parlance object runtime.
//!
//! This crate provides the pieces every other parlance crate builds on:
//!
//! - [`HashTable`]: the generic resizable hash table used as the storage
//!   engine for every keyed lookup in the runtime (most prominently the
//!   class registry).
//! - [`sync`]: the concurrency guard: mutex and read/write lock wrappers
//!   with RAII guards, plus a thread identity accessor.
//! - [`Version`]: `{major, minor}` version pairs and the host ABI
//!   compatibility rule applied to plugins.

pub mod hash_table;
pub mod sync;
pub mod version;

pub use hash_table::{HashTable, HashTableError};
pub use sync::{CriticalSection, ReadWriteLock, current_thread_id};
pub use version::{HOST_ABI, Version};

//! Concurrency guard primitives.
//!
//! Thin wrappers around the standard mutual-exclusion primitives with RAII
//! guards, plus a thread identity accessor. These serialize all class
//! registry mutation and plugin load/unload; per-object operations never
//! touch them.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::ThreadId;

/// Identity of the calling thread.
pub fn current_thread_id() -> ThreadId {
    std::thread::current().id()
}

/// A critical section serializing short mutation windows.
#[derive(Debug, Default)]
pub struct CriticalSection {
    mutex: Mutex<()>,
}

impl CriticalSection {
    /// Creates a new critical section.
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
        }
    }

    /// Enters the critical section (blocks until acquired).
    pub fn enter(&self) -> CriticalSectionGuard<'_> {
        let guard = self.mutex.lock().expect("critical section poisoned");
        CriticalSectionGuard { _guard: guard }
    }

    /// Tries to enter the critical section without blocking.
    pub fn try_enter(&self) -> Option<CriticalSectionGuard<'_>> {
        self.mutex
            .try_lock()
            .ok()
            .map(|guard| CriticalSectionGuard { _guard: guard })
    }
}

/// RAII guard for a critical section; the section is released on drop.
pub struct CriticalSectionGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// A read/write lock over shared data.
///
/// Reads vastly outnumber writes for registry-style data, so shared
/// acquisition is the common path.
#[derive(Debug, Default)]
pub struct ReadWriteLock<T> {
    lock: RwLock<T>,
}

impl<T> ReadWriteLock<T> {
    /// Creates a new read/write lock owning `value`.
    pub fn new(value: T) -> Self {
        Self {
            lock: RwLock::new(value),
        }
    }

    /// Acquires a shared (read) lock.
    pub fn read(&self) -> ReadGuard<'_, T> {
        ReadGuard {
            guard: self.lock.read().expect("read/write lock poisoned"),
        }
    }

    /// Acquires an exclusive (write) lock.
    pub fn write(&self) -> WriteGuard<'_, T> {
        WriteGuard {
            guard: self.lock.write().expect("read/write lock poisoned"),
        }
    }

    /// Tries to acquire a shared lock without blocking.
    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        self.lock.try_read().ok().map(|guard| ReadGuard { guard })
    }

    /// Tries to acquire an exclusive lock without blocking.
    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        self.lock.try_write().ok().map(|guard| WriteGuard { guard })
    }
}

/// RAII guard for shared access.
pub struct ReadGuard<'a, T> {
    guard: RwLockReadGuard<'a, T>,
}

impl<T> std::ops::Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

/// RAII guard for exclusive access.
pub struct WriteGuard<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
}

impl<T> std::ops::Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> std::ops::DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

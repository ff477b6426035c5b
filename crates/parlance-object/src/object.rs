//! Reference-counted runtime objects.
//!
//! An [`Object`] is an atomically reference-counted handle to an instance:
//! a class entry plus a fixed-size state buffer behind a mutex. Handles are
//! cheap to retain and may be retained on one thread and released on
//! another; the registry lock is never involved. The destroy chain runs
//! exactly once, derived-first, when the last handle drops.

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::class_id::{ClassId, leaf_of};
use crate::registry::ClassEntry;

struct ObjectInner {
    class: Arc<ClassEntry>,
    state: Mutex<Box<[u8]>>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poison) => poison.into_inner(),
        };
        for slot in self.class.destroy_chain.iter().rev().flatten() {
            if let Err(err) = slot(state) {
                tracing::warn!(
                    class = self.class.leaf(),
                    error = %err,
                    "destroy callback failed during teardown",
                );
            }
        }
        self.class
            .live
            .fetch_sub(1, std::sync::atomic::Ordering::AcqRel);
    }
}

/// A reference-counted instance of a registered class.
///
/// Cloning a handle retains the instance; dropping a handle releases it.
/// [`Object::retain`] and [`Object::release`] spell the same operations out
/// for callers porting reference-count discipline.
pub struct Object {
    inner: Arc<ObjectInner>,
}

impl Object {
    /// Wrap a freshly initialized state buffer. The live-instance count of
    /// `class` must already account for this instance.
    pub(crate) fn from_parts(class: Arc<ClassEntry>, state: Box<[u8]>) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                class,
                state: Mutex::new(state),
            }),
        }
    }

    /// The class entry this object was allocated from.
    pub fn class_entry(&self) -> &ClassEntry {
        &self.inner.class
    }

    /// Own (leaf) class name.
    pub fn type_name(&self) -> &str {
        self.inner.class.leaf()
    }

    /// Full ancestry name.
    pub fn inheritance(&self) -> &str {
        self.inner.class.name()
    }

    /// Current reference count.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Take an additional reference to this instance.
    pub fn retain(&self) -> Object {
        Object {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Give up this reference. The destroy chain runs when the last
    /// reference is released.
    pub fn release(self) {
        drop(self);
    }

    /// Caller-facing release.
    ///
    /// Dispatches the resolved dispose hook, then releases. A class whose
    /// resolved dispose slot is absent is not caller-releasable: the call
    /// is a no-op and the reference is intentionally kept alive (the
    /// owning registry or cache remains responsible for it). An absent
    /// handle is simply `Option::<Object>::None` at the caller; there is
    /// no freed-handle state to guard against.
    pub fn dispose(self) {
        match self.inner.class.dispatch.dispose.clone() {
            Some(hook) => {
                hook(&self.lock_state());
                drop(self);
            }
            None => std::mem::forget(self),
        }
    }

    /// Whether this object's class is, or derives from, `class_name`.
    ///
    /// Accepts a bare class name or a full ancestry string (only the leaf
    /// is matched). O(chain length) over precomputed ids; no lock, no
    /// allocation.
    pub fn is_a(&self, class_name: &str) -> bool {
        self.inner.class.is_a(ClassId::of(leaf_of(class_name)))
    }

    /// Type-checked downcast: the same object viewed as `class_name`, or
    /// `None` when the class is not in this object's ancestry.
    pub fn cast(&self, class_name: &str) -> Option<&Object> {
        self.is_a(class_name).then_some(self)
    }

    /// Compare with another object of the same class.
    ///
    /// Returns `None` when the classes differ or when neither the class
    /// nor any base defines a compare callback (the operation is
    /// unsupported, not an error).
    pub fn compare(&self, other: &Object) -> Option<Ordering> {
        if self.inner.class.id() != other.inner.class.id() {
            return None;
        }
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return Some(Ordering::Equal);
        }
        let slot = self.inner.class.dispatch.compare.clone()?;

        // Both state mutexes are needed; lock in address order.
        let (first, second);
        let flipped = Arc::as_ptr(&self.inner) as usize > Arc::as_ptr(&other.inner) as usize;
        if flipped {
            first = other.lock_state();
            second = self.lock_state();
            Some(slot(&second, &first))
        } else {
            first = self.lock_state();
            second = other.lock_state();
            Some(slot(&first, &second))
        }
    }

    /// Render this object through its resolved print callback, or `None`
    /// when the operation is unsupported.
    pub fn print(&self) -> Option<String> {
        let slot = self.inner.class.dispatch.print.clone()?;
        Some(slot(&self.lock_state()))
    }

    /// Read the instance state under its lock.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.lock_state())
    }

    /// Mutate the instance state under its lock.
    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut state = self.lock_state();
        f(&mut state)
    }

    /// Create a weak handle that does not keep the instance alive.
    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same instance.
    pub fn same_instance(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, Box<[u8]>> {
        self.inner.state.lock().expect("object state poisoned")
    }
}

impl Clone for Object {
    fn clone(&self) -> Self {
        self.retain()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.inheritance())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// A weak handle to an [`Object`]; upgradable while any strong handle
/// remains.
#[derive(Clone)]
pub struct WeakObject {
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    /// Attempt to recover a strong handle.
    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ClassDescriptor;
    use crate::registry::{ClassRegistry, ROOT_CLASS};
    use crate::system::ObjectSystem;

    fn system() -> ObjectSystem {
        ObjectSystem::new()
    }

    #[test]
    fn retain_release_counts() {
        let system = system();
        system
            .registry()
            .register(ClassDescriptor::new("Token", 4))
            .unwrap();

        let object = system.allocate("Token").unwrap();
        assert_eq!(object.ref_count(), 1);

        let extra = object.retain();
        assert_eq!(object.ref_count(), 2);
        extra.release();
        assert_eq!(object.ref_count(), 1);
    }

    #[test]
    fn cast_walks_ancestry() {
        let system = system();
        system
            .registry()
            .register(ClassDescriptor::new("Base", 8))
            .unwrap();
        system
            .registry()
            .register(ClassDescriptor::new("Base:Derived", 16))
            .unwrap();
        system
            .registry()
            .register(ClassDescriptor::new("Unrelated", 8))
            .unwrap();

        let object = system.allocate("Derived").unwrap();
        assert!(object.cast("Derived").is_some());
        assert!(object.cast("Base").is_some());
        assert!(object.cast("Base:Derived").is_some());
        assert!(object.cast(ROOT_CLASS).is_some());
        assert!(object.cast("Unrelated").is_none());
    }

    #[test]
    fn compare_requires_same_class() {
        let system = system();
        system
            .registry()
            .register(ClassDescriptor::new("Cmp", 1).with_compare(|a, b| a[0].cmp(&b[0])))
            .unwrap();
        system
            .registry()
            .register(ClassDescriptor::new("Plain", 1))
            .unwrap();

        let small = system.allocate("Cmp").unwrap();
        let large = system.allocate("Cmp").unwrap();
        small.with_data_mut(|d| d[0] = 1);
        large.with_data_mut(|d| d[0] = 9);

        assert_eq!(small.compare(&large), Some(Ordering::Less));
        assert_eq!(large.compare(&small), Some(Ordering::Greater));
        assert_eq!(small.compare(&small), Some(Ordering::Equal));

        let plain = system.allocate("Plain").unwrap();
        assert_eq!(small.compare(&plain), None);
        // Plain has no compare slot anywhere in its chain.
        let other = system.allocate("Plain").unwrap();
        assert_eq!(plain.compare(&other), None);
    }

    #[test]
    fn print_dispatches_or_reports_unsupported() {
        let system = system();
        system
            .registry()
            .register(
                ClassDescriptor::new("Printable", 1).with_print(|d| format!("value={}", d[0])),
            )
            .unwrap();
        system
            .registry()
            .register(ClassDescriptor::new("Silent", 1))
            .unwrap();

        let printable = system.allocate("Printable").unwrap();
        printable.with_data_mut(|d| d[0] = 3);
        assert_eq!(printable.print().as_deref(), Some("value=3"));

        let silent = system.allocate("Silent").unwrap();
        assert_eq!(silent.print(), None);
    }

    #[test]
    fn dispose_without_slot_keeps_instance_alive() {
        let registry = ClassRegistry::new();
        // A root without a dispose hook: nothing registered through it is
        // caller-releasable.
        registry
            .register(ClassDescriptor::new(ROOT_CLASS, 0))
            .unwrap();
        registry.register(ClassDescriptor::new("Pinned", 0)).unwrap();

        let system = ObjectSystem::with_registry(registry);
        let object = system.allocate("Pinned").unwrap();
        let watcher = object.downgrade();

        object.dispose();
        // The reference was intentionally kept; the instance survives.
        assert!(watcher.upgrade().is_some());
        assert_eq!(
            system.registry().lookup("Pinned").unwrap().live_instances(),
            1
        );
    }

    #[test]
    fn dispose_with_slot_releases() {
        let system = system();
        system
            .registry()
            .register(ClassDescriptor::new("Releasable", 0))
            .unwrap();

        let object = system.allocate("Releasable").unwrap();
        let watcher = object.downgrade();
        // Inherits the root class's dispose hook.
        object.dispose();
        assert!(watcher.upgrade().is_none());
    }

    #[test]
    fn weak_handles_do_not_retain() {
        let system = system();
        system
            .registry()
            .register(ClassDescriptor::new("Brief", 0))
            .unwrap();

        let object = system.allocate("Brief").unwrap();
        let weak = object.downgrade();
        assert_eq!(object.ref_count(), 1);
        drop(object);
        assert!(weak.upgrade().is_none());
    }
}

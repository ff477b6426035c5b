//! The object system: allocation and whole-object operations that need
//! the registry.

use std::sync::atomic::Ordering;

use crate::descriptor::ClassDescriptor;
use crate::error::ObjectError;
use crate::object::Object;
use crate::registry::{ClassRegistry, ROOT_CLASS};

/// Allocates and copies objects against a class registry.
///
/// One explicitly constructed instance per runtime, shared by handle with
/// every subsystem that needs it; never a process global.
pub struct ObjectSystem {
    registry: ClassRegistry,
}

impl ObjectSystem {
    /// Create an object system with a fresh registry holding the implicit
    /// [`ROOT_CLASS`].
    ///
    /// The root class has no instance state and a default dispose hook, so
    /// objects of every class registered on top of it are caller-releasable
    /// unless a class removes that by overriding dispose.
    pub fn new() -> Self {
        let registry = ClassRegistry::new();
        registry
            .register(root_descriptor())
            .expect("fresh registry cannot hold duplicates");
        Self { registry }
    }

    /// Wrap an existing registry. The caller is responsible for having
    /// registered a root class if derived registrations are expected.
    pub fn with_registry(registry: ClassRegistry) -> Self {
        Self { registry }
    }

    /// The backing class registry.
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// Allocate an instance of the named class.
    ///
    /// Looks the class up under the registry guard, zeroes a buffer of the
    /// declared size, sets the reference count to 1, and runs the init
    /// chain base-first so derived state always initializes after base
    /// state. Fails with [`ObjectError::ClassNotFound`] for unknown names;
    /// an init failure unwinds by running the destroy chain of the
    /// already-initialized prefix, derived-first.
    pub fn allocate(&self, class_name: &str) -> Result<Object, ObjectError> {
        let entry = self
            .registry
            .lookup(class_name)
            .ok_or_else(|| ObjectError::ClassNotFound {
                name: class_name.to_string(),
            })?;

        entry.live.fetch_add(1, Ordering::AcqRel);
        let mut state = vec![0u8; entry.instance_size()].into_boxed_slice();

        for (level, slot) in entry.init_chain.iter().enumerate() {
            let Some(init) = slot else { continue };
            if let Err(source) = init(&mut state) {
                for undo in entry.destroy_chain[..level].iter().rev().flatten() {
                    if let Err(err) = undo(&mut state) {
                        tracing::warn!(
                            class = entry.leaf(),
                            error = %err,
                            "destroy callback failed while unwinding a failed init",
                        );
                    }
                }
                entry.live.fetch_sub(1, Ordering::AcqRel);
                return Err(ObjectError::Lifecycle {
                    class: entry.leaf().to_string(),
                    op: "init",
                    source,
                });
            }
        }

        Ok(Object::from_parts(entry, state))
    }

    /// Deep-copy an object through its resolved copy callback.
    ///
    /// Allocates a fresh, initialized instance of the same class and asks
    /// the callback to transfer state. `Ok(None)` means the class supports
    /// no copy operation anywhere in its chain.
    pub fn copy(&self, object: &Object) -> Result<Option<Object>, ObjectError> {
        let Some(slot) = object.class_entry().dispatch.copy.clone() else {
            return Ok(None);
        };

        let fresh = self.allocate(object.inheritance())?;
        let outcome = object.with_data(|src| fresh.with_data_mut(|dst| slot(src, dst)));
        match outcome {
            Ok(()) => Ok(Some(fresh)),
            Err(source) => Err(ObjectError::Lifecycle {
                class: object.type_name().to_string(),
                op: "copy",
                source,
            }),
        }
    }
}

impl Default for ObjectSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor of the implicit root class.
fn root_descriptor() -> ClassDescriptor {
    // The default dispose hook: observing the release is all there is to
    // do; the reference itself drops in Object::dispose.
    ClassDescriptor::new(ROOT_CLASS, 0).with_dispose(|_| {})
}

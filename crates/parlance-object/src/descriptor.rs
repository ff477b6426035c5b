//! Class descriptors and lifecycle tables.
//!
//! A [`ClassDescriptor`] is what a registrant hands to the registry: the
//! ancestry name, the instance byte size, a revision pair, and a
//! [`Lifecycle`] table of six optional callbacks. An absent callback means
//! "inherit from the base class" (or "not supported" when no base defines
//! it either); resolution happens once, at registration time.
//!
//! Callbacks operate on the instance state (a fixed-size byte buffer
//! zeroed at allocation) and are shared (`Arc`) so derived classes can
//! inherit them without copying.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use parlance_core::Version;

use crate::error::LifecycleError;

/// Constructor callback: initializes this class's share of a zeroed
/// instance buffer. Runs base-first during allocation.
pub type InitFn = Arc<dyn Fn(&mut [u8]) -> Result<(), LifecycleError> + Send + Sync>;

/// Destructor callback: releases resources held in the instance buffer.
/// Runs derived-first when the last reference drops; runs exactly once.
pub type DestroyFn = Arc<dyn Fn(&mut [u8]) -> Result<(), LifecycleError> + Send + Sync>;

/// Dispose hook: observes a caller-facing release. A class whose resolved
/// dispose slot is absent is not caller-releasable.
pub type DisposeFn = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Ordering comparison between two instances of the same class.
pub type CompareFn = Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

/// Render an instance for diagnostics.
pub type PrintFn = Arc<dyn Fn(&[u8]) -> String + Send + Sync>;

/// State transfer from a source instance into a freshly initialized
/// destination instance of the same class.
pub type CopyFn = Arc<dyn Fn(&[u8], &mut [u8]) -> Result<(), LifecycleError> + Send + Sync>;

/// The six-slot lifecycle table of a class, in its fixed order:
/// init, destroy, dispose, compare, print, copy.
#[derive(Default, Clone)]
pub struct Lifecycle {
    pub init: Option<InitFn>,
    pub destroy: Option<DestroyFn>,
    pub dispose: Option<DisposeFn>,
    pub compare: Option<CompareFn>,
    pub print: Option<PrintFn>,
    pub copy: Option<CopyFn>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn slot<T>(option: &Option<T>) -> &'static str {
            if option.is_some() { "set" } else { "-" }
        }
        f.debug_struct("Lifecycle")
            .field("init", &slot(&self.init))
            .field("destroy", &slot(&self.destroy))
            .field("dispose", &slot(&self.dispose))
            .field("compare", &slot(&self.compare))
            .field("print", &slot(&self.print))
            .field("copy", &slot(&self.copy))
            .finish()
    }
}

/// Metadata and lifecycle table registered once per class name.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    /// Ancestry name: colon-separated base names, outermost base first,
    /// own name last (e.g. `"Base:Derived"`).
    pub name: String,
    /// Instance byte size; every instance is a zeroed buffer of this size.
    pub instance_size: usize,
    /// Class revision, declared by the registrant.
    pub revision: Version,
    /// Optional lifecycle callbacks.
    pub lifecycle: Lifecycle,
}

impl ClassDescriptor {
    /// Create a descriptor with an empty lifecycle table and revision 1.0.
    pub fn new(name: impl Into<String>, instance_size: usize) -> Self {
        Self {
            name: name.into(),
            instance_size,
            revision: Version::new(1, 0),
            lifecycle: Lifecycle::default(),
        }
    }

    // === Builder Methods ===

    /// Set the class revision.
    pub fn with_revision(mut self, revision: Version) -> Self {
        self.revision = revision;
        self
    }

    /// Set the init callback.
    pub fn with_init(
        mut self,
        f: impl Fn(&mut [u8]) -> Result<(), LifecycleError> + Send + Sync + 'static,
    ) -> Self {
        self.lifecycle.init = Some(Arc::new(f));
        self
    }

    /// Set the destroy callback.
    pub fn with_destroy(
        mut self,
        f: impl Fn(&mut [u8]) -> Result<(), LifecycleError> + Send + Sync + 'static,
    ) -> Self {
        self.lifecycle.destroy = Some(Arc::new(f));
        self
    }

    /// Set the dispose hook.
    pub fn with_dispose(mut self, f: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        self.lifecycle.dispose = Some(Arc::new(f));
        self
    }

    /// Set the compare callback.
    pub fn with_compare(
        mut self,
        f: impl Fn(&[u8], &[u8]) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.lifecycle.compare = Some(Arc::new(f));
        self
    }

    /// Set the print callback.
    pub fn with_print(mut self, f: impl Fn(&[u8]) -> String + Send + Sync + 'static) -> Self {
        self.lifecycle.print = Some(Arc::new(f));
        self
    }

    /// Set the copy callback.
    pub fn with_copy(
        mut self,
        f: impl Fn(&[u8], &mut [u8]) -> Result<(), LifecycleError> + Send + Sync + 'static,
    ) -> Self {
        self.lifecycle.copy = Some(Arc::new(f));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_defaults() {
        let descriptor = ClassDescriptor::new("Voice", 16);
        assert_eq!(descriptor.name, "Voice");
        assert_eq!(descriptor.instance_size, 16);
        assert_eq!(descriptor.revision, Version::new(1, 0));
        assert!(descriptor.lifecycle.init.is_none());
        assert!(descriptor.lifecycle.copy.is_none());
    }

    #[test]
    fn builder_sets_slots() {
        let descriptor = ClassDescriptor::new("Voice", 8)
            .with_revision(Version::new(2, 1))
            .with_init(|_| Ok(()))
            .with_compare(|_, _| Ordering::Equal)
            .with_print(|_| "voice".to_string());

        assert_eq!(descriptor.revision, Version::new(2, 1));
        assert!(descriptor.lifecycle.init.is_some());
        assert!(descriptor.lifecycle.compare.is_some());
        assert!(descriptor.lifecycle.print.is_some());
        assert!(descriptor.lifecycle.destroy.is_none());
    }

    #[test]
    fn lifecycle_debug_marks_set_slots() {
        let descriptor = ClassDescriptor::new("Voice", 8).with_init(|_| Ok(()));
        let rendered = format!("{:?}", descriptor.lifecycle);
        assert!(rendered.contains("init: \"set\""));
        assert!(rendered.contains("destroy: \"-\""));
    }
}

//! Process lifecycle: reference-counted runtime initialization.
//!
//! [`init`] constructs the object system, built-in classes, and plugin
//! manager on first call and hands out counted handles on nested calls;
//! only the outermost [`Runtime::quit`] (or final handle drop) tears the
//! state down: plugins unload in reverse load order, then the registry
//! drops. The runtime instance is an explicit handle passed by shared
//! reference, not a bare global reached from everywhere.

use std::path::Path;
use std::sync::{Arc, Mutex};

use parlance_object::{Object, ObjectSystem, builtin};
use parlance_plugin::PluginManager;

use crate::{Error, Result};

struct SharedState {
    count: usize,
    inner: Option<Arc<RuntimeInner>>,
}

static SHARED: Mutex<SharedState> = Mutex::new(SharedState {
    count: 0,
    inner: None,
});

struct RuntimeInner {
    // Declaration order is teardown order: plugins unload before the
    // object system they registered classes into.
    plugins: PluginManager,
    system: Arc<ObjectSystem>,
}

/// Initialize the runtime, or retain the already-initialized instance.
///
/// Safe to call multiple times: nested `init`/`quit` pairs are counted
/// and only the outermost quit tears down state. Every returned handle
/// must be balanced by one [`Runtime::quit`] (dropping the handle counts).
pub fn init() -> Result<Runtime> {
    let mut shared = SHARED.lock().expect("runtime state poisoned");
    if let Some(inner) = &shared.inner {
        let inner = Arc::clone(inner);
        shared.count += 1;
        return Ok(Runtime { inner });
    }

    let system = Arc::new(ObjectSystem::new());
    builtin::register_builtin_classes(&system).map_err(Error::Object)?;
    let plugins = PluginManager::new(Arc::clone(&system)).map_err(Error::Object)?;

    let inner = Arc::new(RuntimeInner { plugins, system });
    shared.inner = Some(Arc::clone(&inner));
    shared.count = 1;
    tracing::info!(abi = %parlance_core::HOST_ABI, "runtime initialized");
    Ok(Runtime { inner })
}

/// A counted handle to the process-wide runtime.
///
/// Obtained from [`init`]; another nested handle is another `init` call.
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// The object system.
    pub fn system(&self) -> &Arc<ObjectSystem> {
        &self.inner.system
    }

    /// The class registry.
    pub fn registry(&self) -> &parlance_object::ClassRegistry {
        self.inner.system.registry()
    }

    /// The plugin manager.
    pub fn plugins(&self) -> &PluginManager {
        &self.inner.plugins
    }

    /// Allocate an instance of a registered class.
    pub fn allocate(&self, class_name: &str) -> Result<Object> {
        self.inner.system.allocate(class_name).map_err(Error::Object)
    }

    /// Deep-copy an object; `Ok(None)` when its class supports no copy.
    pub fn copy(&self, object: &Object) -> Result<Option<Object>> {
        self.inner.system.copy(object).map_err(Error::Object)
    }

    /// Load a plugin by bare file name or path.
    pub fn load_plugin(&self, name_or_path: impl AsRef<Path>) -> Result<Object> {
        self.inner
            .plugins
            .load(name_or_path.as_ref())
            .map_err(Error::Plugin)
    }

    /// Release this handle. Teardown happens when the outermost handle
    /// quits; further nested quits are what the counting is for.
    pub fn quit(self) {
        drop(self);
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let mut shared = SHARED.lock().expect("runtime state poisoned");
        shared.count = shared.count.saturating_sub(1);
        if shared.count == 0 && shared.inner.take().is_some() {
            // The final RuntimeInner reference is `self.inner`; actual
            // teardown runs after this lock is released.
            tracing::info!("runtime shut down");
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("classes", &self.registry().len())
            .finish()
    }
}

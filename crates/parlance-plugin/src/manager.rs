//! The plugin manager.
//!
//! Loads versioned shared libraries, gates them on the host ABI version,
//! runs their registration routines against the class registry, and wraps
//! each loaded module in a reference-counted object of the built-in
//! `"Plugin"` class. Releasing a plugin's last reference runs its
//! teardown routine, releases its dependency plugins in reverse load
//! order, and closes the library.

use std::ffi::{CStr, c_char, c_void};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use libloading::Library;

use parlance_core::{CriticalSection, HOST_ABI, Version};
use parlance_object::{ClassDescriptor, Object, ObjectError, ObjectSystem, leaf_of};

use crate::abi::{
    CODE_FAILURE, CODE_INVALID_DESCRIPTOR, CODE_OK, CODE_VERSION_MISMATCH, HostVtable,
    PLUGIN_CLASS, PLUGIN_ENTRY_SYMBOL, PluginEntryFn, PluginRoutineFn, RawClassDescriptor,
    descriptor_from_raw, error_code,
};
use crate::error::PluginError;
use crate::path;

/// Metadata of a loaded plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub version: Version,
    pub built_against: Version,
    pub path: PathBuf,
}

/// Loads, caches, and unloads plugins against an object system.
pub struct PluginManager {
    host: Arc<PluginHost>,
}

impl PluginManager {
    /// Create a manager and register the `"Plugin"` class whose instances
    /// wrap loaded modules.
    pub fn new(system: Arc<ObjectSystem>) -> Result<Self, ObjectError> {
        let host = Arc::new(PluginHost {
            system: Arc::clone(&system),
            guard: CriticalSection::new(),
            cache: Mutex::new(Vec::new()),
            slots: Mutex::new(Vec::new()),
            resident: Mutex::new(Vec::new()),
            path_override: Mutex::new(None),
        });

        let on_destroy: Weak<PluginHost> = Arc::downgrade(&host);
        let on_print: Weak<PluginHost> = Arc::downgrade(&host);
        system.registry().register(
            ClassDescriptor::new(PLUGIN_CLASS, 8)
                .with_destroy(move |data| {
                    match on_destroy.upgrade() {
                        Some(host) => host.teardown_slot(slot_of(data)),
                        None => tracing::warn!("plugin released after its manager was dropped"),
                    }
                    Ok(())
                })
                .with_print(move |data| match on_print.upgrade() {
                    Some(host) => host.describe_slot(slot_of(data)),
                    None => format!("[{PLUGIN_CLASS}]"),
                }),
        )?;

        Ok(Self { host })
    }

    /// Load a plugin by bare file name (resolved against the search path)
    /// or by explicit path.
    ///
    /// Loading an already-loaded path returns a retained handle to the
    /// cached plugin instead of opening the library again.
    pub fn load(&self, name_or_path: impl AsRef<Path>) -> Result<Object, PluginError> {
        self.host.load_plugin(name_or_path.as_ref())
    }

    /// Whether a plugin resolved from this name or path is currently
    /// loaded.
    pub fn is_loaded(&self, name_or_path: impl AsRef<Path>) -> bool {
        let resolved = self.host.resolve(name_or_path.as_ref());
        let cache = self.host.cache.lock().expect("plugin cache poisoned");
        cache
            .iter()
            .any(|entry| entry.path == resolved && entry.object.upgrade().is_some())
    }

    /// Metadata of a loaded plugin object, or `None` for other objects.
    pub fn info(&self, plugin: &Object) -> Option<PluginInfo> {
        if !plugin.is_a(PLUGIN_CLASS) {
            return None;
        }
        let slot = plugin.with_data(|data| slot_of(data));
        let slots = self.host.slots.lock().expect("plugin slots poisoned");
        match slots.get(slot)?.as_ref()? {
            Slot::Loaded(loaded) => Some(PluginInfo {
                name: loaded.name.clone(),
                description: loaded.description.clone(),
                version: loaded.version,
                built_against: loaded.built_against,
                path: loaded.path.clone(),
            }),
            Slot::Loading => None,
        }
    }

    /// The effective plugin search path.
    pub fn search_path(&self) -> PathBuf {
        self.host.search_path()
    }

    /// Override (or with `None`, restore) the search path configuration.
    pub fn set_search_path(&self, override_path: Option<PathBuf>) {
        *self
            .host
            .path_override
            .lock()
            .expect("plugin path poisoned") = override_path;
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.host.cache.lock().expect("plugin cache poisoned");
        f.debug_struct("PluginManager")
            .field("loaded", &cache.len())
            .finish()
    }
}

/// Read the slot index out of a plugin object's state.
fn slot_of(data: &[u8]) -> usize {
    u64::from_ne_bytes(data[..8].try_into().expect("plugin state is 8 bytes")) as usize
}

struct CacheEntry {
    path: PathBuf,
    object: parlance_object::WeakObject,
}

enum Slot {
    /// Reserved by an in-flight load.
    Loading,
    Loaded(LoadedPlugin),
}

struct LoadedPlugin {
    path: PathBuf,
    name: String,
    description: String,
    version: Version,
    built_against: Version,
    at_exit: Option<PluginRoutineFn>,
    /// Classes registered through this plugin's vtable, in order.
    registered_classes: Vec<String>,
    /// Dependency plugins retained by this plugin, in load order.
    dependencies: Vec<Object>,
    library: Library,
}

struct PluginHost {
    system: Arc<ObjectSystem>,
    /// Serializes load bookkeeping; released before any plugin routine
    /// runs so registration code can load dependencies.
    guard: CriticalSection,
    /// Resolved path -> plugin object, weakly held, in load order.
    cache: Mutex<Vec<CacheEntry>>,
    slots: Mutex<Vec<Option<Slot>>>,
    /// Libraries whose classes could not be unregistered at teardown;
    /// kept mapped for the rest of the process.
    resident: Mutex<Vec<Library>>,
    path_override: Mutex<Option<PathBuf>>,
}

/// Per-invocation context behind [`HostVtable::ctx`].
struct HostCtx<'a> {
    host: &'a PluginHost,
    slot: usize,
}

impl PluginHost {
    fn search_path(&self) -> PathBuf {
        let override_path = self.path_override.lock().expect("plugin path poisoned");
        path::search_path(override_path.as_deref())
    }

    fn resolve(&self, name_or_path: &Path) -> PathBuf {
        path::resolve(name_or_path, &self.search_path())
    }

    fn load_plugin(&self, name_or_path: &Path) -> Result<Object, PluginError> {
        let resolved = self.resolve(name_or_path);

        let (object, slot) = {
            let _guard = self.guard.enter();
            {
                let mut cache = self.cache.lock().expect("plugin cache poisoned");
                if let Some(existing) = cache
                    .iter()
                    .filter(|entry| entry.path == resolved)
                    .find_map(|entry| entry.object.upgrade())
                {
                    return Ok(existing);
                }
                cache.retain(|entry| entry.object.upgrade().is_some());
            }

            let object = self.system.allocate(PLUGIN_CLASS)?;
            let slot = {
                let mut slots = self.slots.lock().expect("plugin slots poisoned");
                match slots.iter().position(Option::is_none) {
                    Some(free) => {
                        slots[free] = Some(Slot::Loading);
                        free
                    }
                    None => {
                        slots.push(Some(Slot::Loading));
                        slots.len() - 1
                    }
                }
            };
            object.with_data_mut(|data| data[..8].copy_from_slice(&(slot as u64).to_ne_bytes()));

            // Cache before loading so a dependency cycle resolves to the
            // in-flight plugin instead of recursing.
            self.cache
                .lock()
                .expect("plugin cache poisoned")
                .push(CacheEntry {
                    path: resolved.clone(),
                    object: object.downgrade(),
                });
            (object, slot)
        };

        match self.load_into(slot, &resolved) {
            Ok(()) => Ok(object),
            Err(error) => {
                let _guard = self.guard.enter();
                self.cache
                    .lock()
                    .expect("plugin cache poisoned")
                    .retain(|entry| entry.path != resolved);
                drop(object);
                Err(error)
            }
        }
    }

    fn load_into(&self, slot: usize, resolved: &Path) -> Result<(), PluginError> {
        // SAFETY: opening a foreign library and calling its entry routine
        // is inherently unsafe; the ABI contract is checked below before
        // any registration side effect.
        let library =
            unsafe { Library::new(resolved) }.map_err(|source| PluginError::LibraryOpen {
                path: resolved.to_path_buf(),
                source,
            })?;

        let entry: PluginEntryFn = unsafe {
            library.get::<PluginEntryFn>(PLUGIN_ENTRY_SYMBOL.as_bytes())
        }
        .map(|symbol| *symbol)
        .map_err(|source| PluginError::SymbolNotFound {
            symbol: PLUGIN_ENTRY_SYMBOL.to_string(),
            path: resolved.to_path_buf(),
            source,
        })?;

        let mut code = CODE_OK;
        // SAFETY: the entry routine is called exactly once per load with
        // the host's ABI version, per the boundary contract.
        let manifest = unsafe { entry(HOST_ABI, &mut code) };
        if code != CODE_OK || manifest.is_null() {
            return Err(PluginError::EntryFailed {
                path: resolved.to_path_buf(),
                code,
            });
        }
        // SAFETY: the manifest points into the plugin's static storage
        // and stays valid while the library is mapped.
        let manifest = unsafe { &*manifest };

        let name = read_cstr(manifest.name).ok_or_else(|| PluginError::BadManifest {
            path: resolved.to_path_buf(),
            detail: "plugin name is null or not UTF-8".to_string(),
        })?;
        let description = read_cstr(manifest.description).unwrap_or_default();
        let version = manifest.version;
        let built_against = manifest.built_against;
        let register = manifest.register;
        let at_exit = manifest.at_exit;

        if !HOST_ABI.accepts(built_against) {
            return Err(PluginError::VersionMismatch {
                plugin: name,
                built_against,
                host: HOST_ABI,
            });
        }

        {
            let mut slots = self.slots.lock().expect("plugin slots poisoned");
            slots[slot] = Some(Slot::Loaded(LoadedPlugin {
                path: resolved.to_path_buf(),
                name: name.clone(),
                description,
                version,
                built_against,
                at_exit,
                registered_classes: Vec::new(),
                dependencies: Vec::new(),
                library,
            }));
        }

        if let Some(register) = register {
            let code = self.call_routine(register, slot);
            if code != CODE_OK {
                // A failed load is not an unload: the teardown routine must
                // not run. Roll back whatever the routine registered.
                if let Some(Some(Slot::Loaded(plugin))) = self
                    .slots
                    .lock()
                    .expect("plugin slots poisoned")
                    .get_mut(slot)
                {
                    plugin.at_exit = None;
                }
                self.teardown_slot(slot);
                return Err(PluginError::RegistrationFailed { plugin: name, code });
            }
        }

        tracing::info!(
            plugin = %name,
            version = %version,
            path = %resolved.display(),
            "loaded plugin",
        );
        Ok(())
    }

    /// Invoke a plugin routine with a vtable scoped to this call.
    fn call_routine(&self, routine: PluginRoutineFn, slot: usize) -> i32 {
        let mut ctx = HostCtx { host: self, slot };
        let vtable = HostVtable {
            host_abi: HOST_ABI,
            ctx: &mut ctx as *mut HostCtx as *mut c_void,
            register_class: host_register_class,
            unregister_class: host_unregister_class,
            load_dependency: host_load_dependency,
        };
        let mut code = CODE_OK;
        // SAFETY: the vtable and its context outlive this synchronous
        // call, which is the only window the plugin may use them in.
        unsafe { routine(&vtable, &mut code) };
        code
    }

    /// Tear a plugin down: teardown routine, leftover class cleanup,
    /// dependency release in reverse order, then the library closes.
    fn teardown_slot(&self, slot: usize) {
        let taken = {
            let mut slots = self.slots.lock().expect("plugin slots poisoned");
            slots.get_mut(slot).and_then(Option::take)
        };
        let Some(Slot::Loaded(mut plugin)) = taken else {
            return;
        };

        if let Some(at_exit) = plugin.at_exit {
            let code = self.call_routine(at_exit, slot);
            if code != CODE_OK {
                tracing::warn!(
                    plugin = %plugin.name,
                    code,
                    "plugin teardown routine reported failure",
                );
            }
        }

        let mut stuck = false;
        for class in plugin.registered_classes.drain(..).rev() {
            if !self.system.registry().is_registered(&class) {
                continue;
            }
            tracing::warn!(
                plugin = %plugin.name,
                class = %class,
                "plugin teardown left class registered; unregistering",
            );
            if let Err(error) = self.system.registry().unregister(&class) {
                tracing::warn!(
                    plugin = %plugin.name,
                    class = %class,
                    error = %error,
                    "class cannot be unregistered; keeping library resident",
                );
                stuck = true;
            }
        }

        while let Some(dependency) = plugin.dependencies.pop() {
            drop(dependency);
        }

        self.cache
            .lock()
            .expect("plugin cache poisoned")
            .retain(|entry| entry.path != plugin.path);

        if stuck {
            // Registered code is still reachable from live instances, so
            // the library must stay mapped for the rest of the process.
            tracing::warn!(plugin = %plugin.name, "library kept resident");
            self.resident
                .lock()
                .expect("plugin residents poisoned")
                .push(plugin.library);
        } else {
            tracing::info!(plugin = %plugin.name, "unloaded plugin");
        }
    }

    fn describe_slot(&self, slot: usize) -> String {
        let slots = self.slots.lock().expect("plugin slots poisoned");
        match slots.get(slot).and_then(|entry| entry.as_ref()) {
            Some(Slot::Loaded(plugin)) => format!(
                "plugin '{}' {} (built against host ABI {})",
                plugin.name, plugin.version, plugin.built_against,
            ),
            _ => format!("[{PLUGIN_CLASS}]"),
        }
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        // Orderly shutdown: unload whatever is still loaded, strictly in
        // reverse load order.
        let count = self.slots.lock().expect("plugin slots poisoned").len();
        for slot in (0..count).rev() {
            self.teardown_slot(slot);
        }
    }
}

fn read_cstr(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: the pointer comes from a plugin manifest whose strings are
    // NUL-terminated static data.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(str::to_string)
}

unsafe extern "C" fn host_register_class(
    ctx: *mut c_void,
    descriptor: *const RawClassDescriptor,
) -> i32 {
    if ctx.is_null() || descriptor.is_null() {
        return CODE_FAILURE;
    }
    // SAFETY: ctx is the HostCtx installed by call_routine and is only
    // handed to routines for the duration of their invocation.
    let ctx = unsafe { &*(ctx as *const HostCtx) };
    // SAFETY: the descriptor pointer was just null-checked; its contents
    // are validated during conversion.
    let descriptor = match unsafe { descriptor_from_raw(&*descriptor) } {
        Ok(descriptor) => descriptor,
        Err(_) => return CODE_INVALID_DESCRIPTOR,
    };
    let name = descriptor.name.clone();
    match ctx.host.system.registry().register(descriptor) {
        Ok(()) => {
            let mut slots = ctx.host.slots.lock().expect("plugin slots poisoned");
            if let Some(Some(Slot::Loaded(plugin))) = slots.get_mut(ctx.slot) {
                plugin.registered_classes.push(name);
            }
            CODE_OK
        }
        Err(error) => error_code(&error),
    }
}

unsafe extern "C" fn host_unregister_class(ctx: *mut c_void, name: *const c_char) -> i32 {
    if ctx.is_null() || name.is_null() {
        return CODE_FAILURE;
    }
    let ctx = unsafe { &*(ctx as *const HostCtx) };
    // SAFETY: per the vtable contract the name is NUL-terminated.
    let Ok(name) = unsafe { CStr::from_ptr(name) }.to_str() else {
        return CODE_FAILURE;
    };
    match ctx.host.system.registry().unregister(name) {
        Ok(()) => {
            let mut slots = ctx.host.slots.lock().expect("plugin slots poisoned");
            if let Some(Some(Slot::Loaded(plugin))) = slots.get_mut(ctx.slot) {
                plugin
                    .registered_classes
                    .retain(|registered| leaf_of(registered) != leaf_of(name));
            }
            CODE_OK
        }
        Err(error) => error_code(&error),
    }
}

unsafe extern "C" fn host_load_dependency(ctx: *mut c_void, name_or_path: *const c_char) -> i32 {
    if ctx.is_null() || name_or_path.is_null() {
        return CODE_FAILURE;
    }
    let ctx = unsafe { &*(ctx as *const HostCtx) };
    // SAFETY: per the vtable contract the path is NUL-terminated.
    let Ok(spec) = unsafe { CStr::from_ptr(name_or_path) }.to_str() else {
        return CODE_FAILURE;
    };
    match ctx.host.load_plugin(Path::new(spec)) {
        Ok(dependency) => {
            let mut slots = ctx.host.slots.lock().expect("plugin slots poisoned");
            if let Some(Some(Slot::Loaded(plugin))) = slots.get_mut(ctx.slot) {
                plugin.dependencies.push(dependency);
            }
            CODE_OK
        }
        Err(PluginError::VersionMismatch { .. }) => CODE_VERSION_MISMATCH,
        Err(PluginError::Object(error)) => error_code(&error),
        Err(_) => CODE_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn manager() -> (Arc<ObjectSystem>, PluginManager) {
        let system = Arc::new(ObjectSystem::new());
        let manager = PluginManager::new(Arc::clone(&system)).unwrap();
        (system, manager)
    }

    #[test]
    fn plugin_class_is_registered() {
        let (system, _manager) = manager();
        assert!(system.registry().is_registered(PLUGIN_CLASS));
    }

    #[test]
    fn missing_library_reports_open_error() {
        let (_system, manager) = manager();
        let err = manager.load("/nonexistent/plugin.so").unwrap_err();
        assert!(matches!(err, PluginError::LibraryOpen { .. }));
        assert!(!manager.is_loaded("/nonexistent/plugin.so"));
    }

    #[test]
    fn failed_load_leaves_no_state_behind() {
        let (system, manager) = manager();
        let classes_before = system.registry().len();

        let _ = manager.load("/nonexistent/plugin.so").unwrap_err();

        assert_eq!(system.registry().len(), classes_before);
        let slots = manager.host.slots.lock().unwrap();
        assert!(slots.iter().all(Option::is_none));
        assert!(manager.host.cache.lock().unwrap().is_empty());
    }

    #[test]
    fn garbage_file_is_not_a_library() {
        let (_system, manager) = manager();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a shared object").unwrap();

        let err = manager.load(file.path()).unwrap_err();
        assert!(matches!(err, PluginError::LibraryOpen { .. }));
    }

    #[test]
    fn bare_names_resolve_against_the_search_path() {
        let (_system, manager) = manager();
        manager.set_search_path(Some(PathBuf::from("/custom/plugins")));
        assert_eq!(manager.search_path(), PathBuf::from("/custom/plugins"));

        let err = manager.load("voice.so").unwrap_err();
        match err {
            PluginError::LibraryOpen { path, .. } => {
                assert_eq!(path, PathBuf::from("/custom/plugins/voice.so"));
            }
            other => panic!("expected LibraryOpen, got {other}"),
        }

        manager.set_search_path(None);
        assert_ne!(manager.search_path(), PathBuf::from("/custom/plugins"));
    }

    #[test]
    fn info_rejects_non_plugin_objects() {
        let (system, manager) = manager();
        system
            .registry()
            .register(ClassDescriptor::new("Other", 8))
            .unwrap();
        let object = system.allocate("Other").unwrap();
        assert!(manager.info(&object).is_none());
    }

    #[test]
    fn stray_plugin_object_teardown_is_harmless() {
        // An allocated-but-never-loaded plugin object points at slot 0;
        // releasing it must not disturb the manager.
        let (system, manager) = manager();
        let stray = system.allocate(PLUGIN_CLASS).unwrap();
        drop(stray);
        assert!(manager.host.slots.lock().unwrap().is_empty());
    }
}

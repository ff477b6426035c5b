//! The C-compatible plugin boundary.
//!
//! Everything a plugin shares with the host crosses through the
//! `#[repr(C)]` types in this module. A plugin exports one symbol,
//! [`PLUGIN_ENTRY_SYMBOL`], with the signature [`PluginEntryFn`]: it
//! receives the host's runtime ABI version plus an error out-parameter
//! and returns a [`PluginManifest`]. The host calls the entry routine
//! exactly once per load and the manifest's teardown routine exactly once
//! per unload.
//!
//! Plugins never see the registry API. The manifest's registration and
//! teardown routines receive a [`HostVtable`] whose three calls (register
//! a class, unregister a class, load a dependency plugin) are the entire
//! surface. Class descriptors cross the boundary as
//! [`RawClassDescriptor`]: name, instance size, revision, then exactly
//! six optional callback slots in the fixed order
//! `init, destroy, dispose, compare, print, copy`. That ordering is the
//! binary interface every plugin must match.
//!
//! The host converts raw descriptors into safe
//! [`ClassDescriptor`]s at the boundary; nothing on the host side of the
//! conversion is unsafe.

use std::ffi::{CStr, c_char, c_void};

use parlance_core::Version;
use parlance_object::{ClassDescriptor, LifecycleError, ObjectError};

use crate::error::PluginError;

/// The symbol every plugin library exports.
pub const PLUGIN_ENTRY_SYMBOL: &str = "parlance_plugin_entry";

/// Class name of plugin handle objects.
pub const PLUGIN_CLASS: &str = "Plugin";

/// Status codes crossing the plugin boundary. Zero is success.
pub const CODE_OK: i32 = 0;
pub const CODE_FAILURE: i32 = 1;
pub const CODE_DUPLICATE_CLASS: i32 = 2;
pub const CODE_CLASS_NOT_FOUND: i32 = 3;
pub const CODE_VERSION_MISMATCH: i32 = 4;
pub const CODE_INVALID_DESCRIPTOR: i32 = 5;
pub const CODE_CLASS_IN_USE: i32 = 6;

/// Signature of the exported entry symbol.
///
/// Called with the host's runtime ABI version. On failure the routine
/// writes a non-zero code through `error` and may return null.
pub type PluginEntryFn =
    unsafe extern "C" fn(host_version: Version, error: *mut i32) -> *const PluginManifest;

/// Signature of the manifest's registration and teardown routines.
pub type PluginRoutineFn = unsafe extern "C" fn(host: *const HostVtable, error: *mut i32);

/// What a plugin's entry routine returns: identity, versions, and the
/// registration/teardown routine pair.
///
/// The pointed-to strings and the manifest itself must stay valid for as
/// long as the library is loaded (static storage in the plugin).
#[repr(C)]
pub struct PluginManifest {
    /// Plugin name (NUL-terminated UTF-8).
    pub name: *const c_char,
    /// Human-readable description (NUL-terminated UTF-8; may be null).
    pub description: *const c_char,
    /// The plugin's own version.
    pub version: Version,
    /// The host ABI version the plugin was built against; gated by
    /// [`Version::accepts`] before `register` may run.
    pub built_against: Version,
    /// Called exactly once per load, after the ABI gate. Registers the
    /// plugin's classes through the vtable.
    pub register: Option<PluginRoutineFn>,
    /// Called exactly once per unload. Must unregister every class the
    /// plugin registered, in reverse dependency order.
    pub at_exit: Option<PluginRoutineFn>,
}

/// Raw instance callbacks. `data` is the instance state buffer of the
/// declared size; callbacks report failure through the error
/// out-parameter where one is present.
pub type RawInitFn = unsafe extern "C" fn(data: *mut u8, len: usize, error: *mut i32);
pub type RawDestroyFn = unsafe extern "C" fn(data: *mut u8, len: usize, error: *mut i32);
pub type RawDisposeFn = unsafe extern "C" fn(data: *const u8, len: usize);
pub type RawCompareFn = unsafe extern "C" fn(a: *const u8, b: *const u8, len: usize) -> i32;
/// Writes up to `buf_len` UTF-8 bytes into the host-owned `buf` and
/// returns the number written; no allocator crosses the boundary.
pub type RawPrintFn =
    unsafe extern "C" fn(data: *const u8, len: usize, buf: *mut u8, buf_len: usize) -> usize;
pub type RawCopyFn =
    unsafe extern "C" fn(src: *const u8, dst: *mut u8, len: usize, error: *mut i32);

/// A class descriptor as it crosses the plugin boundary.
#[repr(C)]
pub struct RawClassDescriptor {
    /// Ancestry name (NUL-terminated UTF-8), e.g. `"Base:Derived"`.
    pub name: *const c_char,
    /// Instance byte size.
    pub instance_size: usize,
    /// Class revision.
    pub revision: Version,
    // The six lifecycle slots, in their fixed binary order.
    pub init: Option<RawInitFn>,
    pub destroy: Option<RawDestroyFn>,
    pub dispose: Option<RawDisposeFn>,
    pub compare: Option<RawCompareFn>,
    pub print: Option<RawPrintFn>,
    pub copy: Option<RawCopyFn>,
}

/// The narrow host surface handed to plugin routines.
///
/// `ctx` is host-owned and opaque to the plugin; it must be passed back
/// unchanged to every call and is only valid for the duration of the
/// routine invocation it was handed to.
#[repr(C)]
pub struct HostVtable {
    /// The host's runtime ABI version.
    pub host_abi: Version,
    /// Opaque host context for the calls below.
    pub ctx: *mut c_void,
    /// Register a class. Returns a status code.
    pub register_class:
        unsafe extern "C" fn(ctx: *mut c_void, descriptor: *const RawClassDescriptor) -> i32,
    /// Unregister a class by name. Returns a status code.
    pub unregister_class: unsafe extern "C" fn(ctx: *mut c_void, name: *const c_char) -> i32,
    /// Load a dependency plugin by name or path. The dependency is
    /// retained by the calling plugin and released, in reverse load
    /// order, on its teardown. Returns a status code.
    pub load_dependency: unsafe extern "C" fn(ctx: *mut c_void, name_or_path: *const c_char) -> i32,
}

/// Map a registry failure to its boundary status code.
pub fn error_code(error: &ObjectError) -> i32 {
    match error {
        ObjectError::DuplicateClass { .. } => CODE_DUPLICATE_CLASS,
        ObjectError::ClassNotFound { .. } => CODE_CLASS_NOT_FOUND,
        ObjectError::InvalidDescriptor { .. } => CODE_INVALID_DESCRIPTOR,
        ObjectError::ClassInUse { .. } => CODE_CLASS_IN_USE,
        ObjectError::Lifecycle { .. } => CODE_FAILURE,
    }
}

fn lifecycle_result(code: i32) -> Result<(), LifecycleError> {
    if code == CODE_OK {
        Ok(())
    } else {
        Err(LifecycleError(format!(
            "plugin callback reported code {code}"
        )))
    }
}

/// Size of the host-owned buffer handed to raw print callbacks.
const PRINT_BUFFER_LEN: usize = 512;

/// Convert a boundary descriptor into a host-side [`ClassDescriptor`],
/// wrapping each raw slot in a safe closure.
///
/// # Safety
///
/// `raw.name` must point to a NUL-terminated string, and every non-null
/// callback must honor the [`RawClassDescriptor`] contract for as long as
/// the class stays registered (the loader guarantees the defining library
/// outlives the registration).
pub unsafe fn descriptor_from_raw(
    raw: &RawClassDescriptor,
) -> Result<ClassDescriptor, PluginError> {
    if raw.name.is_null() {
        return Err(PluginError::BadManifest {
            path: Default::default(),
            detail: "class descriptor name is null".to_string(),
        });
    }
    let name = unsafe { CStr::from_ptr(raw.name) }
        .to_str()
        .map_err(|_| PluginError::BadManifest {
            path: Default::default(),
            detail: "class descriptor name is not UTF-8".to_string(),
        })?
        .to_string();

    let mut descriptor = ClassDescriptor::new(name, raw.instance_size).with_revision(raw.revision);

    if let Some(f) = raw.init {
        descriptor = descriptor.with_init(move |data: &mut [u8]| {
            let mut code = CODE_OK;
            unsafe { f(data.as_mut_ptr(), data.len(), &mut code) };
            lifecycle_result(code)
        });
    }
    if let Some(f) = raw.destroy {
        descriptor = descriptor.with_destroy(move |data: &mut [u8]| {
            let mut code = CODE_OK;
            unsafe { f(data.as_mut_ptr(), data.len(), &mut code) };
            lifecycle_result(code)
        });
    }
    if let Some(f) = raw.dispose {
        descriptor = descriptor.with_dispose(move |data: &[u8]| {
            unsafe { f(data.as_ptr(), data.len()) };
        });
    }
    if let Some(f) = raw.compare {
        descriptor = descriptor.with_compare(move |a: &[u8], b: &[u8]| {
            let ordering = unsafe { f(a.as_ptr(), b.as_ptr(), a.len()) };
            ordering.cmp(&0)
        });
    }
    if let Some(f) = raw.print {
        descriptor = descriptor.with_print(move |data: &[u8]| {
            let mut buf = [0u8; PRINT_BUFFER_LEN];
            let written = unsafe { f(data.as_ptr(), data.len(), buf.as_mut_ptr(), buf.len()) };
            String::from_utf8_lossy(&buf[..written.min(PRINT_BUFFER_LEN)]).into_owned()
        });
    }
    if let Some(f) = raw.copy {
        descriptor = descriptor.with_copy(move |src: &[u8], dst: &mut [u8]| {
            let mut code = CODE_OK;
            unsafe { f(src.as_ptr(), dst.as_mut_ptr(), src.len(), &mut code) };
            lifecycle_result(code)
        });
    }

    Ok(descriptor)
}

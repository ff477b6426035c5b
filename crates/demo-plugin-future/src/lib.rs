//! A plugin that claims to be built against a newer host ABI minor than
//! the running host provides. The loader must reject it at the version
//! gate; its registration routine must never run.

use parlance_core::{HOST_ABI, Version};
use parlance_plugin::abi::{
    CODE_FAILURE, HostVtable, PluginManifest, RawClassDescriptor,
};

unsafe extern "C" fn register(host: *const HostVtable, error: *mut i32) {
    // If the gate ever lets this run, it leaves evidence in the registry.
    let host = unsafe { &*host };
    let descriptor = RawClassDescriptor {
        name: c"NeverRegistered".as_ptr(),
        instance_size: 0,
        revision: Version::new(1, 0),
        init: None,
        destroy: None,
        dispose: None,
        compare: None,
        print: None,
        copy: None,
    };
    let code = unsafe { (host.register_class)(host.ctx, &descriptor) };
    if code != 0 {
        unsafe { *error = CODE_FAILURE };
    }
}

struct ManifestCell(PluginManifest);

unsafe impl Sync for ManifestCell {}

static MANIFEST: ManifestCell = ManifestCell(PluginManifest {
    name: c"demo-from-the-future".as_ptr(),
    description: c"Requires a host minor version that does not exist yet".as_ptr(),
    version: Version::new(9, 9),
    built_against: Version::new(HOST_ABI.major, HOST_ABI.minor + 1),
    register: Some(register),
    at_exit: None,
});

#[unsafe(no_mangle)]
pub unsafe extern "C" fn parlance_plugin_entry(
    _host_version: Version,
    _error: *mut i32,
) -> *const PluginManifest {
    &MANIFEST.0
}

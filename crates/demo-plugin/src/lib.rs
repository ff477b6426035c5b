//! A demonstration plugin: registers one class, `"EchoVoice"`, and
//! unregisters it on teardown. Written the way an out-of-tree plugin
//! would be, using only the `abi` surface of the host.

use parlance_core::Version;
use parlance_plugin::abi::{
    CODE_OK, HostVtable, PluginManifest, RawClassDescriptor,
};

/// `EchoVoice` instance state: a 16-byte scratch area whose first byte is
/// a generation marker written by init.
const ECHO_SIZE: usize = 16;

unsafe extern "C" fn echo_init(data: *mut u8, len: usize, _error: *mut i32) {
    let data = unsafe { std::slice::from_raw_parts_mut(data, len) };
    data[0] = 1;
}

unsafe extern "C" fn echo_print(
    data: *const u8,
    _len: usize,
    buf: *mut u8,
    buf_len: usize,
) -> usize {
    let generation = unsafe { *data };
    let message = format!("echo-voice g{generation}");
    let n = message.len().min(buf_len);
    unsafe { std::ptr::copy_nonoverlapping(message.as_ptr(), buf, n) };
    n
}

unsafe extern "C" fn register(host: *const HostVtable, error: *mut i32) {
    let host = unsafe { &*host };
    let descriptor = RawClassDescriptor {
        name: c"EchoVoice".as_ptr(),
        instance_size: ECHO_SIZE,
        revision: Version::new(1, 0),
        init: Some(echo_init),
        destroy: None,
        dispose: None,
        compare: None,
        print: Some(echo_print),
        copy: None,
    };
    let code = unsafe { (host.register_class)(host.ctx, &descriptor) };
    if code != CODE_OK {
        unsafe { *error = code };
    }
}

unsafe extern "C" fn at_exit(host: *const HostVtable, error: *mut i32) {
    let host = unsafe { &*host };
    let code = unsafe { (host.unregister_class)(host.ctx, c"EchoVoice".as_ptr()) };
    if code != CODE_OK {
        unsafe { *error = code };
    }
}

struct ManifestCell(PluginManifest);

// The manifest only points at static storage.
unsafe impl Sync for ManifestCell {}

static MANIFEST: ManifestCell = ManifestCell(PluginManifest {
    name: c"demo-voice".as_ptr(),
    description: c"Demonstration voice plugin".as_ptr(),
    version: Version::new(1, 0),
    built_against: parlance_core::HOST_ABI,
    register: Some(register),
    at_exit: Some(at_exit),
});

#[unsafe(no_mangle)]
pub unsafe extern "C" fn parlance_plugin_entry(
    _host_version: Version,
    _error: *mut i32,
) -> *const PluginManifest {
    &MANIFEST.0
}

//! Runtime plugin loading for the parlance object runtime.
//!
//! A plugin is a shared library exporting one fixed entry symbol. The
//! loader resolves the library against a configured search path, checks
//! the plugin's declared host ABI version, and hands the plugin's
//! registration routine a narrow host vtable through which it registers
//! classes (and may load dependency plugins). Loaded plugins are
//! themselves reference-counted objects of the built-in `"Plugin"` class;
//! releasing the last reference runs the plugin's teardown routine and
//! closes the library.
//!
//! Everything that crosses the library boundary lives in [`abi`] as
//! `#[repr(C)]` types; the host side of the boundary is safe code.

pub mod abi;
pub mod error;
pub mod manager;
pub mod path;

pub use abi::{HostVtable, PLUGIN_CLASS, PLUGIN_ENTRY_SYMBOL, PluginManifest, RawClassDescriptor};
pub use error::PluginError;
pub use manager::{PluginInfo, PluginManager};
pub use path::{DEFAULT_PLUGIN_DIR, PLUGIN_PATH_ENV};

//! Error types for plugin loading.

use std::path::PathBuf;

use thiserror::Error;

use parlance_core::Version;
use parlance_object::ObjectError;

/// Errors reported by the plugin loader.
///
/// A failed load never leaves side effects behind: no classes are
/// registered and the library handle is closed.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The shared library could not be opened.
    #[error("failed to open plugin library '{}': {source}", path.display())]
    LibraryOpen {
        path: PathBuf,
        source: libloading::Error,
    },

    /// The fixed entry symbol is absent from the library.
    #[error("entry symbol '{symbol}' not found in plugin '{}'", path.display())]
    SymbolNotFound {
        symbol: String,
        path: PathBuf,
        source: libloading::Error,
    },

    /// The entry routine reported a failure or returned no manifest.
    #[error("plugin entry routine failed for '{}' (code {code})", path.display())]
    EntryFailed { path: PathBuf, code: i32 },

    /// The manifest could not be read (null or non-UTF-8 fields).
    #[error("plugin '{}' returned a malformed manifest: {detail}", path.display())]
    BadManifest { path: PathBuf, detail: String },

    /// The plugin was built against a host ABI this host does not satisfy.
    /// The plugin is not loaded and no classes were registered.
    #[error("plugin '{plugin}' was built against host ABI {built_against}, host is {host}")]
    VersionMismatch {
        plugin: String,
        built_against: Version,
        host: Version,
    },

    /// The plugin's registration routine reported a failure; its partial
    /// registrations were rolled back.
    #[error("plugin '{plugin}' registration routine failed (code {code})")]
    RegistrationFailed { plugin: String, code: i32 },

    /// A registry or object model failure surfaced during loading.
    #[error(transparent)]
    Object(#[from] ObjectError),
}

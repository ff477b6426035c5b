//! Plugin search path resolution.

use std::path::{Path, PathBuf};

/// Environment variable overriding the plugin search path.
pub const PLUGIN_PATH_ENV: &str = "PARLANCE_PLUGIN_PATH";

/// Platform default plugin directory, used when no override is configured.
#[cfg(unix)]
pub const DEFAULT_PLUGIN_DIR: &str = "/usr/local/lib/parlance/plugins";

/// Platform default plugin directory, used when no override is configured.
#[cfg(windows)]
pub const DEFAULT_PLUGIN_DIR: &str = r"C:\parlance\plugins";

/// The effective search path: a programmatic override wins, then the
/// [`PLUGIN_PATH_ENV`] environment variable, then the platform default.
pub fn search_path(override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }
    match std::env::var_os(PLUGIN_PATH_ENV) {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_PLUGIN_DIR),
    }
}

/// Resolve a plugin reference against the search path.
///
/// A bare file name is joined onto `search`; anything already carrying a
/// directory component is used as-is.
pub fn resolve(name_or_path: &Path, search: &Path) -> PathBuf {
    if name_or_path.is_absolute() || name_or_path.parent() != Some(Path::new("")) {
        name_or_path.to_path_buf()
    } else {
        search.join(name_or_path)
    }
}

//! Listing of installed plugins at one level of the plugin tree.

use std::path::Path;

use tracing::debug;

use crate::error::{PluginError, PluginResult};

/// Names of the plugin subdirectories directly below `dir`, sorted.
///
/// Plain files (including `manifest.json` itself) are skipped. Symlinked
/// directories are followed.
///
/// # Errors
///
/// Returns [`PluginError::Io`] if `dir` cannot be read.
pub fn list_plugins(dir: &Path) -> PluginResult<Vec<String>> {
    let io_err = |source| PluginError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    debug!(path = %dir.display(), count = names.len(), "Listed installed plugins");
    Ok(names)
}

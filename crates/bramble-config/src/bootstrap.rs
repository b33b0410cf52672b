//! State directory creation.

use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Create `path` and any missing parents, readable only by the owner on
/// Unix (`0700`). An existing directory is left as is.
///
/// # Errors
///
/// Returns [`ConfigError::Bootstrap`] if the directory cannot be created.
pub fn ensure_private_dir(path: &Path) -> ConfigResult<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    builder.create(path).map_err(|source| ConfigError::Bootstrap {
        path: path.display().to_string(),
        source,
    })?;
    debug!(path = %path.display(), "State directory ready");
    Ok(())
}

//! Command resolution against the installed plugin tree.
//!
//! The tree is walked lazily, one argument at a time. A directory that
//! directly contains `manifest.json` is a leaf: resolution stops there and
//! every remaining argument belongs to the plugin. Any other directory is an
//! intermediate node whose children are further command segments.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PluginError, PluginResult};
use crate::manifest::MANIFEST_FILE_NAME;

/// Argument that stops resolution and asks for help at the current depth.
pub const HELP_FLAG: &str = "-h";

/// The outcome of walking the plugin tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A leaf was reached; run its manifest with the remaining arguments.
    Invoke {
        /// Path of the leaf's `manifest.json`.
        manifest: PathBuf,
        /// Arguments left after the command path, forwarded untouched.
        args: Vec<String>,
    },
    /// No leaf was reached; list the children of `dir`.
    Help {
        /// The intermediate directory where resolution stopped.
        dir: PathBuf,
        /// Arguments left unconsumed (empty, or starting with `-h`).
        args: Vec<String>,
    },
}

impl Resolution {
    /// Whether help should be shown instead of invoking a plugin.
    #[must_use]
    pub fn is_help(&self) -> bool {
        matches!(self, Self::Help { .. })
    }

    /// The manifest path, if a leaf was reached.
    #[must_use]
    pub fn manifest(&self) -> Option<&Path> {
        match self {
            Self::Invoke { manifest, .. } => Some(manifest),
            Self::Help { .. } => None,
        }
    }

    /// Arguments that were not consumed as command segments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        match self {
            Self::Invoke { args, .. } | Self::Help { args, .. } => args,
        }
    }
}

/// Resolve a full argument list from the root of the plugin tree.
///
/// # Errors
///
/// See [`resolve_from`].
pub fn resolve(plugins_root: &Path, args: &[String]) -> PluginResult<Resolution> {
    resolve_from(plugins_root, Vec::new(), args.to_vec())
}

/// Resolve `remaining` starting below the already-consumed command path.
///
/// # Errors
///
/// Returns [`PluginError::NotInstalled`] if a consumed segment has no
/// directory, and [`PluginError::Io`] for any other filesystem failure
/// (permission denied, not a directory, ...).
pub fn resolve_from(
    plugins_root: &Path,
    consumed: Vec<String>,
    remaining: Vec<String>,
) -> PluginResult<Resolution> {
    let mut consumed = consumed;
    let mut remaining = VecDeque::from(remaining);

    loop {
        let full_path = consumed
            .iter()
            .fold(plugins_root.to_path_buf(), |dir, segment| dir.join(segment));

        let invokable = is_invokable(&full_path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                PluginError::NotInstalled {
                    command: consumed.join(" "),
                }
            } else {
                PluginError::Io {
                    path: full_path.clone(),
                    source,
                }
            }
        })?;

        if invokable {
            debug!(path = %full_path.display(), "Resolved plugin leaf");
            return Ok(Resolution::Invoke {
                manifest: full_path.join(MANIFEST_FILE_NAME),
                args: remaining.into(),
            });
        }

        match remaining.pop_front() {
            Some(next) if next != HELP_FLAG => {
                debug!(path = %full_path.display(), segment = %next, "Descending into plugin tree");
                consumed.push(next);
            },
            flag => {
                // Put a `-h` back so the help target sees the same arguments.
                if let Some(flag) = flag {
                    remaining.push_front(flag);
                }
                debug!(path = %full_path.display(), "No plugin leaf reached, showing help");
                return Ok(Resolution::Help {
                    dir: full_path,
                    args: remaining.into(),
                });
            },
        }
    }
}

/// Whether `dir` directly contains a manifest file.
fn is_invokable(dir: &Path) -> std::io::Result<bool> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name() == MANIFEST_FILE_NAME && !entry.file_type()?.is_dir() {
            return Ok(true);
        }
    }
    Ok(false)
}

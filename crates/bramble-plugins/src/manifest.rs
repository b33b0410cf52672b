//! Plugin manifest types.
//!
//! A plugin manifest (`manifest.json`) tells the dispatcher how a plugin must
//! be run: as a local executable sitting next to the manifest, or as a
//! container image. The file is decoded into a permissive [`ManifestFile`]
//! first and then validated into a [`Manifest`], so a missing field is always
//! reported by name rather than as a JSON error.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ManifestError, PluginError, PluginResult};

/// Standard plugin manifest file name.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Invoker name for local executables, as written in the manifest.
const EXECUTABLE_INVOKER: &str = "executable";
/// Invoker name for container images, as written in the manifest.
const DOCKER_INVOKER: &str = "docker";

/// The on-disk shape of `manifest.json`, before validation.
///
/// Every field is optional so that decoding only fails on malformed JSON.
/// Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// `"executable"` or `"docker"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoker: Option<String>,
    /// Command path segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Executable name, for the executable invoker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,
    /// Container settings, for the docker invoker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerSection>,
}

/// The `docker` table of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerSection {
    /// Image reference passed to the container runtime.
    #[serde(rename = "image-url", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Whether the container gets a TTY (combined stdout/stderr).
    #[serde(default)]
    pub tty: bool,
}

impl ManifestFile {
    /// Decode a manifest from JSON text.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `json` is not a JSON object of the
    /// manifest shape.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check required fields and produce a typed [`Manifest`].
    ///
    /// The command path is checked first, then the fields the declared
    /// invoker needs.
    ///
    /// # Errors
    ///
    /// Returns the first [`ManifestError`] found.
    pub fn validate(self) -> Result<Manifest, ManifestError> {
        let command = match self.command {
            Some(command) if !command.is_empty() => command,
            _ => return Err(ManifestError::MissingCommand),
        };

        let invoker = match self.invoker.as_deref() {
            Some(EXECUTABLE_INVOKER) => match self.exec {
                Some(exec) if !exec.is_empty() => InvokerSpec::Executable { exec },
                _ => return Err(ManifestError::MissingExec),
            },
            Some(DOCKER_INVOKER) => {
                let docker = self.docker.unwrap_or_default();
                match docker.image_url {
                    Some(image) if !image.is_empty() => InvokerSpec::Container {
                        image,
                        tty: docker.tty,
                    },
                    _ => return Err(ManifestError::MissingImage),
                }
            },
            other => {
                return Err(ManifestError::UnsupportedInvoker(
                    other.unwrap_or_default().to_owned(),
                ));
            },
        };

        Ok(Manifest { command, invoker })
    }
}

/// Which backend runs a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokerKind {
    /// A local binary run as a subprocess.
    Executable,
    /// A container image run through the container runtime.
    Container,
}

impl InvokerKind {
    /// The name used for this kind in `manifest.json`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Executable => EXECUTABLE_INVOKER,
            Self::Container => DOCKER_INVOKER,
        }
    }
}

impl fmt::Display for InvokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-specific settings of a validated manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokerSpec {
    /// Run `<plugin dir>/<exec>`.
    Executable {
        /// Binary name relative to the plugin directory.
        exec: String,
    },
    /// Run a container from `image`.
    Container {
        /// Image reference.
        image: String,
        /// Whether output is a single TTY stream.
        tty: bool,
    },
}

impl InvokerSpec {
    /// The backend this spec selects.
    #[must_use]
    pub fn kind(&self) -> InvokerKind {
        match self {
            Self::Executable { .. } => InvokerKind::Executable,
            Self::Container { .. } => InvokerKind::Container,
        }
    }
}

/// A validated plugin manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    command: Vec<String>,
    invoker: InvokerSpec,
}

impl Manifest {
    /// Build a manifest, applying the same checks as [`ManifestFile::validate`].
    ///
    /// # Errors
    ///
    /// Returns a [`ManifestError`] if the command path is empty or the
    /// invoker spec names an empty executable or image.
    pub fn new(command: Vec<String>, invoker: InvokerSpec) -> Result<Self, ManifestError> {
        ManifestFile::from(&Self { command, invoker }).validate()
    }

    /// Load and validate a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ManifestRead`] if the file cannot be read,
    /// [`PluginError::ManifestDecode`] if it is not valid JSON, and
    /// [`PluginError::InvalidManifest`] if a required field is missing.
    pub fn load(path: &Path) -> PluginResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| PluginError::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;

        let file = ManifestFile::from_json(&content).map_err(|source| PluginError::ManifestDecode {
            path: path.to_path_buf(),
            source,
        })?;

        let manifest = file.validate()?;
        debug!(
            path = %path.display(),
            invoker = %manifest.kind(),
            command = %manifest.command.join(" "),
            "Loaded plugin manifest"
        );
        Ok(manifest)
    }

    /// Command path segments, never empty.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Backend settings.
    #[must_use]
    pub fn invoker(&self) -> &InvokerSpec {
        &self.invoker
    }

    /// The backend this manifest selects.
    #[must_use]
    pub fn kind(&self) -> InvokerKind {
        self.invoker.kind()
    }

    /// Directory of this plugin below `plugins_root`.
    #[must_use]
    pub fn plugin_dir(&self, plugins_root: &Path) -> PathBuf {
        self.command
            .iter()
            .fold(plugins_root.to_path_buf(), |dir, segment| dir.join(segment))
    }

    /// Full path of the plugin binary, for executable manifests.
    #[must_use]
    pub fn executable_path(&self, plugins_root: &Path) -> Option<PathBuf> {
        match &self.invoker {
            InvokerSpec::Executable { exec } => Some(self.plugin_dir(plugins_root).join(exec)),
            InvokerSpec::Container { .. } => None,
        }
    }
}

impl From<&Manifest> for ManifestFile {
    fn from(manifest: &Manifest) -> Self {
        let mut file = Self {
            invoker: Some(manifest.kind().as_str().to_owned()),
            command: Some(manifest.command.clone()),
            ..Self::default()
        };
        match &manifest.invoker {
            InvokerSpec::Executable { exec } => file.exec = Some(exec.clone()),
            InvokerSpec::Container { image, tty } => {
                file.docker = Some(DockerSection {
                    image_url: Some(image.clone()),
                    tty: *tty,
                });
            },
        }
        file
    }
}

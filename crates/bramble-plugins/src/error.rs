//! Plugin error types.

use std::path::PathBuf;

use crate::manifest::InvokerKind;

/// A manifest that decoded successfully but is missing something it needs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    /// `command` is absent or empty.
    #[error("missing 'command' field in manifest file")]
    MissingCommand,

    /// An executable manifest without an `exec` name.
    #[error("missing 'exec' field in manifest file for invoker 'executable'")]
    MissingExec,

    /// A docker manifest without an image reference.
    #[error("missing 'docker.image-url' field in manifest file for invoker 'docker'")]
    MissingImage,

    /// The `invoker` value is absent or not one we know how to run.
    #[error(
        "unsupported invoker '{0}', only 'executable' and 'docker' are currently supported"
    )]
    UnsupportedInvoker(String),
}

/// Errors from resolving and invoking plugins.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// No directory exists for the requested command path.
    #[error("no plugin called \"{command}\" is installed")]
    NotInstalled {
        /// The consumed command segments, joined by spaces.
        command: String,
    },

    /// Any other filesystem failure while walking the plugin tree.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest file could not be opened or read.
    #[error("unable to load manifest at path '{path}': {source}")]
    ManifestRead {
        /// Path to the manifest file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest file is not valid JSON for the manifest shape.
    #[error("unable to decode manifest content at '{path}': {source}")]
    ManifestDecode {
        /// Path to the manifest file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The manifest failed validation.
    #[error(transparent)]
    InvalidManifest(#[from] ManifestError),

    /// A manifest was handed to an invoker for a different backend.
    #[error("manifest selects the '{actual}' invoker, not '{expected}'")]
    InvokerMismatch {
        /// The invoker that received the manifest.
        expected: InvokerKind,
        /// The invoker the manifest asks for.
        actual: InvokerKind,
    },

    /// The plugin executable could not be started.
    #[error("unable to launch '{target}': {source}")]
    Launch {
        /// Executable path.
        target: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The container runtime refused to create the container.
    #[error("unable to create container '{image}': {message}")]
    ContainerCreate {
        /// Image reference.
        image: String,
        /// Runtime failure reason.
        message: String,
    },

    /// The created container could not be started.
    #[error("unable to run container '{image}': {message}")]
    ContainerStart {
        /// Image reference.
        image: String,
        /// Runtime failure reason.
        message: String,
    },

    /// Waiting for the container to exit failed.
    #[error("error waiting for container '{image}': {message}")]
    ContainerWait {
        /// Image reference.
        image: String,
        /// Runtime failure reason.
        message: String,
    },

    /// The plugin ran but exited unsuccessfully.
    #[error("plugin '{target}' exited with {}", describe_exit(.code))]
    ExitStatus {
        /// Executable path or image reference.
        target: String,
        /// Exit code, if the process exited normally.
        code: Option<i64>,
    },

    /// The invocation was cancelled before the plugin finished.
    #[error("invocation of '{target}' was cancelled")]
    Cancelled {
        /// Executable path or image reference.
        target: String,
    },
}

fn describe_exit(code: &Option<i64>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_owned(),
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

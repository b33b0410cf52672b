//! Container runtime boundary.
//!
//! The container invoker never talks to a container engine directly; it
//! consumes a [`ContainerRuntime`]. [`DockerCli`] drives the `docker` binary,
//! and tests plug in an in-memory runtime.

mod docker_cli;
pub mod frame;

pub use docker_cli::{DEFAULT_DOCKER_BINARY, DockerCli};

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Identifier the runtime assigned to a created container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    /// Wrap a runtime-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image reference.
    pub image: String,
    /// Command (arguments) to run in the container.
    pub cmd: Vec<String>,
    /// Environment variables set inside the container.
    pub env: BTreeMap<String, String>,
    /// Allocate a TTY; output is then one combined stream.
    pub tty: bool,
    /// Attach stdin.
    pub attach_stdin: bool,
    /// Attach stdout.
    pub attach_stdout: bool,
    /// Attach stderr.
    pub attach_stderr: bool,
    /// Have the runtime remove the container once it exits.
    pub auto_remove: bool,
}

impl ContainerSpec {
    /// A spec for `image` with all streams attached and auto-remove on.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            cmd: Vec::new(),
            env: BTreeMap::new(),
            tty: false,
            attach_stdin: true,
            attach_stdout: true,
            attach_stderr: true,
            auto_remove: true,
        }
    }

    /// Set the container command.
    #[must_use]
    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = cmd;
        self
    }

    /// Set the container environment.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Enable or disable the TTY.
    #[must_use]
    pub fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }
}

/// Which streams to read from a running container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// Include stdout.
    pub stdout: bool,
    /// Include stderr.
    pub stderr: bool,
    /// Keep streaming until the container stops.
    pub follow: bool,
    /// The container was created with a TTY, so its output is one raw
    /// stream rather than multiplexed frames.
    pub tty: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            stdout: true,
            stderr: true,
            follow: true,
            tty: false,
        }
    }
}

impl LogOptions {
    /// Set whether the container has a TTY.
    #[must_use]
    pub fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }
}

/// Container output.
///
/// For a container created without a TTY the bytes are multiplexed using
/// [`frame`]'s framing; with a TTY they are the raw terminal stream.
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// How a container finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code of the container's main process.
    pub status_code: i64,
    /// Error reported by the runtime while waiting, if any.
    pub error: Option<String>,
}

impl ExitOutcome {
    /// A clean exit with the given status code.
    #[must_use]
    pub fn exited(status_code: i64) -> Self {
        Self {
            status_code,
            error: None,
        }
    }
}

/// Errors from the container runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime could not be reached at all.
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    /// The runtime rejected a request.
    #[error("{action} failed: {message}")]
    Request {
        /// The operation that failed (`create`, `start`, ...).
        action: &'static str,
        /// Runtime-provided reason.
        message: String,
    },

    /// The runtime replied with something we could not interpret.
    #[error("unexpected {action} response: {message}")]
    Protocol {
        /// The operation whose reply was malformed.
        action: &'static str,
        /// What was wrong.
        message: String,
    },

    /// I/O error talking to the runtime.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// The operations the container invoker needs from a container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create (but do not start) a container.
    async fn create(&self, spec: &ContainerSpec) -> RuntimeResult<ContainerId>;

    /// Start a created container.
    async fn start(&self, id: &ContainerId) -> RuntimeResult<()>;

    /// Open the container's output stream.
    async fn logs(&self, id: &ContainerId, options: LogOptions) -> RuntimeResult<LogStream>;

    /// Block until the container stops.
    async fn wait(&self, id: &ContainerId) -> RuntimeResult<ExitOutcome>;

    /// Stop a running container immediately.
    async fn kill(&self, id: &ContainerId) -> RuntimeResult<()>;

    /// Remove a container that will not be started.
    async fn remove(&self, id: &ContainerId) -> RuntimeResult<()>;
}

//! Plugin invokers.
//!
//! An invoker runs a validated manifest to completion. There is one
//! implementation per [`InvokerKind`]; the dispatcher builds a fresh one for
//! every invocation.

mod container;
mod executable;

pub use container::ContainerInvoker;
pub use executable::ExecutableInvoker;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::context::InvocationContext;
use crate::error::{PluginError, PluginResult};
use crate::manifest::{InvokerKind, Manifest};

/// Runs a plugin described by a manifest.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// The backend this invoker drives.
    fn kind(&self) -> InvokerKind;

    /// Run the plugin and return once it has terminated.
    ///
    /// Output is mirrored to the configured standard streams while the
    /// plugin runs. Cancelling `cancel` stops the plugin and yields
    /// [`PluginError::Cancelled`].
    async fn invoke(
        &self,
        manifest: &Manifest,
        ctx: &InvocationContext,
        cancel: &CancellationToken,
    ) -> PluginResult<()>;
}

/// Reject a manifest meant for another invoker.
pub(crate) fn ensure_kind(expected: InvokerKind, manifest: &Manifest) -> PluginResult<()> {
    let actual = manifest.kind();
    if actual == expected {
        Ok(())
    } else {
        Err(PluginError::InvokerMismatch { expected, actual })
    }
}

/// A shared, lockable output sink.
pub type OutputSink = Arc<Mutex<Pin<Box<dyn AsyncWrite + Send>>>>;

/// Where plugin output ends up.
///
/// Sinks are shared so a background copy task can hold a handle. When both
/// are needed, lock stdout before stderr.
#[derive(Clone)]
pub struct OutputStreams {
    /// Receives the plugin's standard output.
    pub stdout: OutputSink,
    /// Receives the plugin's standard error and stream diagnostics.
    pub stderr: OutputSink,
}

impl OutputStreams {
    /// Wrap two writers.
    pub fn new<O, E>(stdout: O, stderr: E) -> Self
    where
        O: AsyncWrite + Send + 'static,
        E: AsyncWrite + Send + 'static,
    {
        Self {
            stdout: Arc::new(Mutex::new(Box::pin(stdout))),
            stderr: Arc::new(Mutex::new(Box::pin(stderr))),
        }
    }

    /// The current process's stdout and stderr.
    #[must_use]
    pub fn inherit() -> Self {
        Self::new(tokio::io::stdout(), tokio::io::stderr())
    }
}

impl Default for OutputStreams {
    fn default() -> Self {
        Self::inherit()
    }
}

impl fmt::Debug for OutputStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStreams").finish_non_exhaustive()
    }
}

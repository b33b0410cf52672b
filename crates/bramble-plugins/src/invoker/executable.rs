//! Runs plugins that ship a local binary.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{Invoker, ensure_kind};
use crate::context::InvocationContext;
use crate::error::{PluginError, PluginResult};
use crate::manifest::{InvokerKind, Manifest};

/// Spawns `<plugins root>/<command...>/<exec>` as a child process.
///
/// The child inherits stdin, stdout and stderr, and the caller's
/// environment with the context overrides applied on top.
#[derive(Debug, Clone)]
pub struct ExecutableInvoker {
    plugins_root: PathBuf,
}

enum ChildExit {
    Exited(io::Result<ExitStatus>),
    Cancelled,
}

impl ExecutableInvoker {
    /// Create an invoker resolving binaries below `plugins_root`.
    #[must_use]
    pub fn new(plugins_root: impl Into<PathBuf>) -> Self {
        Self {
            plugins_root: plugins_root.into(),
        }
    }
}

#[async_trait]
impl Invoker for ExecutableInvoker {
    fn kind(&self) -> InvokerKind {
        InvokerKind::Executable
    }

    async fn invoke(
        &self,
        manifest: &Manifest,
        ctx: &InvocationContext,
        cancel: &CancellationToken,
    ) -> PluginResult<()> {
        ensure_kind(InvokerKind::Executable, manifest)?;
        let path = manifest
            .executable_path(&self.plugins_root)
            .ok_or(PluginError::InvokerMismatch {
                expected: InvokerKind::Executable,
                actual: manifest.kind(),
            })?;
        let target = path.display().to_string();

        info!(plugin = %target, args = ctx.args.len(), "Launching plugin executable");

        let mut child = Command::new(&path)
            .args(&ctx.args)
            .envs(&ctx.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PluginError::Launch {
                target: target.clone(),
                source,
            })?;

        let exit = tokio::select! {
            status = child.wait() => ChildExit::Exited(status),
            () = cancel.cancelled() => ChildExit::Cancelled,
        };

        match exit {
            ChildExit::Cancelled => {
                warn!(plugin = %target, "Invocation cancelled, killing plugin");
                // `kill` also reaps the child.
                if let Err(e) = child.kill().await {
                    warn!(plugin = %target, error = %e, "Failed to kill plugin process");
                }
                Err(PluginError::Cancelled { target })
            },
            ChildExit::Exited(Err(source)) => Err(PluginError::Io { path, source }),
            ChildExit::Exited(Ok(status)) if status.success() => {
                info!(plugin = %target, "Plugin finished");
                Ok(())
            },
            ChildExit::Exited(Ok(status)) => Err(PluginError::ExitStatus {
                target,
                code: status.code().map(i64::from),
            }),
        }
    }
}

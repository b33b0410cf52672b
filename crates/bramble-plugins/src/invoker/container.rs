//! Runs plugins packaged as container images.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Invoker, OutputStreams, ensure_kind};
use crate::context::InvocationContext;
use crate::error::{PluginError, PluginResult};
use crate::manifest::{InvokerKind, InvokerSpec, Manifest};
use crate::runtime::frame;
use crate::runtime::{
    ContainerId, ContainerRuntime, ContainerSpec, ExitOutcome, LogOptions, LogStream,
    RuntimeResult,
};

/// Creates, starts and waits for one container per invocation.
///
/// The container's output is copied to the [`OutputStreams`] by a single
/// background task that is always joined before [`Invoker::invoke`]
/// returns, so no output is lost or printed after the call completes.
pub struct ContainerInvoker {
    runtime: Arc<dyn ContainerRuntime>,
    streams: OutputStreams,
}

enum WaitResult {
    Exited(RuntimeResult<ExitOutcome>),
    Cancelled,
}

impl ContainerInvoker {
    /// Create an invoker that drives `runtime` and writes to `streams`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, streams: OutputStreams) -> Self {
        Self { runtime, streams }
    }

    /// Open the container's output and spawn the copy task.
    ///
    /// Failing to open the stream is reported but does not fail the
    /// invocation.
    async fn spawn_output_task(&self, id: &ContainerId, tty: bool) -> Option<JoinHandle<()>> {
        match self.runtime.logs(id, LogOptions::default().with_tty(tty)).await {
            Ok(stream) => Some(tokio::spawn(copy_output(
                stream,
                self.streams.clone(),
                tty,
            ))),
            Err(e) => {
                warn!(container = %id, error = %e, "Unable to stream container output");
                report(&self.streams, &format!("unable to stream container output: {e}")).await;
                None
            },
        }
    }

    /// Stop a container we are no longer waiting on, so its output ends.
    async fn stop(&self, id: &ContainerId, output: Option<&JoinHandle<()>>) {
        if let Err(e) = self.runtime.kill(id).await {
            warn!(container = %id, error = %e, "Failed to kill container");
            // The stream may never end on its own now.
            if let Some(output) = output {
                output.abort();
            }
        }
    }

    async fn flush(&self) {
        for sink in [&self.streams.stdout, &self.streams.stderr] {
            if let Err(e) = sink.lock().await.flush().await {
                debug!(error = %e, "Failed to flush plugin output");
            }
        }
    }
}

#[async_trait]
impl Invoker for ContainerInvoker {
    fn kind(&self) -> InvokerKind {
        InvokerKind::Container
    }

    async fn invoke(
        &self,
        manifest: &Manifest,
        ctx: &InvocationContext,
        cancel: &CancellationToken,
    ) -> PluginResult<()> {
        ensure_kind(InvokerKind::Container, manifest)?;
        let InvokerSpec::Container { image, tty } = manifest.invoker() else {
            return Err(PluginError::InvokerMismatch {
                expected: InvokerKind::Container,
                actual: manifest.kind(),
            });
        };
        let tty = *tty;

        let spec = ContainerSpec::new(image.clone())
            .with_cmd(ctx.args.clone())
            .with_env(ctx.env.clone())
            .with_tty(tty);

        info!(image = %image, tty, args = ctx.args.len(), "Creating plugin container");
        let id = self
            .runtime
            .create(&spec)
            .await
            .map_err(|e| PluginError::ContainerCreate {
                image: image.clone(),
                message: e.to_string(),
            })?;

        if let Err(e) = self.runtime.start(&id).await {
            if let Err(remove_err) = self.runtime.remove(&id).await {
                warn!(
                    container = %id,
                    error = %remove_err,
                    "Failed to remove container that did not start"
                );
            }
            return Err(PluginError::ContainerStart {
                image: image.clone(),
                message: e.to_string(),
            });
        }
        debug!(container = %id, image = %image, "Container started");

        let output = self.spawn_output_task(&id, tty).await;

        let waited = tokio::select! {
            outcome = self.runtime.wait(&id) => WaitResult::Exited(outcome),
            () = cancel.cancelled() => WaitResult::Cancelled,
        };

        match &waited {
            WaitResult::Cancelled => {
                warn!(container = %id, "Invocation cancelled, killing container");
                self.stop(&id, output.as_ref()).await;
            },
            WaitResult::Exited(Err(e)) => {
                warn!(container = %id, error = %e, "Waiting for container failed");
                self.stop(&id, output.as_ref()).await;
            },
            WaitResult::Exited(Ok(_)) => {},
        }

        if let Some(output) = output
            && let Err(e) = output.await
            && !e.is_cancelled()
        {
            warn!(container = %id, error = %e, "Container output task failed");
        }
        self.flush().await;

        match waited {
            WaitResult::Cancelled => Err(PluginError::Cancelled {
                target: image.clone(),
            }),
            WaitResult::Exited(Err(e)) => Err(PluginError::ContainerWait {
                image: image.clone(),
                message: e.to_string(),
            }),
            WaitResult::Exited(Ok(ExitOutcome {
                error: Some(message),
                ..
            })) => Err(PluginError::ContainerWait {
                image: image.clone(),
                message,
            }),
            WaitResult::Exited(Ok(ExitOutcome { status_code: 0, .. })) => {
                info!(container = %id, image = %image, "Plugin container finished");
                Ok(())
            },
            WaitResult::Exited(Ok(ExitOutcome { status_code, .. })) => {
                Err(PluginError::ExitStatus {
                    target: image.clone(),
                    code: Some(status_code),
                })
            },
        }
    }
}

/// Copy container output to the sinks until the stream ends.
async fn copy_output(mut stream: LogStream, streams: OutputStreams, tty: bool) {
    let result = {
        let mut stdout = streams.stdout.lock().await;
        if tty {
            tokio::io::copy(&mut stream, &mut *stdout).await.map(|_| ())
        } else {
            let mut stderr = streams.stderr.lock().await;
            frame::demux(&mut stream, &mut *stdout, &mut *stderr)
                .await
                .map(|stats| {
                    debug!(stdout = stats.stdout, stderr = stats.stderr, "Container output drained");
                })
        }
    };

    if let Err(e) = result {
        warn!(error = %e, "Container output stream failed");
        report(&streams, &format!("error reading container output: {e}")).await;
    }
}

/// Write a diagnostic line to the stderr sink.
async fn report(streams: &OutputStreams, message: &str) {
    let mut stderr = streams.stderr.lock().await;
    let line = format!("{message}\n");
    if let Err(e) = stderr.write_all(line.as_bytes()).await {
        debug!(error = %e, "Failed to write diagnostic to stderr sink");
    }
}

//! Test doubles: an in-memory container runtime, capture buffers and
//! helpers that lay out plugin trees on disk.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::invoker::OutputStreams;
use crate::manifest::{InvokerSpec, MANIFEST_FILE_NAME, Manifest, ManifestFile};
use crate::runtime::frame::{self, StreamKind};
use crate::runtime::{
    ContainerId, ContainerRuntime, ContainerSpec, ExitOutcome, LogOptions, LogStream,
    RuntimeError, RuntimeResult,
};

/// An `AsyncWrite` that appends into shared memory.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    /// An empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Everything written so far, as (lossy) UTF-8.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }
}

impl AsyncWrite for CaptureBuffer {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Output streams backed by two capture buffers.
#[must_use]
pub fn capture_streams() -> (OutputStreams, CaptureBuffer, CaptureBuffer) {
    let stdout = CaptureBuffer::new();
    let stderr = CaptureBuffer::new();
    (OutputStreams::new(stdout.clone(), stderr.clone()), stdout, stderr)
}

/// A container runtime operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeCall {
    /// `create`
    Create,
    /// `start`
    Start,
    /// `logs`
    Logs,
    /// `wait`
    Wait,
    /// `kill`
    Kill,
    /// `remove`
    Remove,
}

impl RuntimeCall {
    fn action(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Logs => "logs",
            Self::Wait => "wait",
            Self::Kill => "kill",
            Self::Remove => "remove",
        }
    }
}

/// A scripted, in-memory [`ContainerRuntime`].
///
/// Log output is delivered a few bytes at a time from a separate task, so
/// it is usually still in flight when `wait` returns.
#[derive(Debug)]
pub struct ScriptedRuntime {
    output: Vec<u8>,
    exit_code: i64,
    wait_error: Option<String>,
    failures: Vec<RuntimeCall>,
    hang_until_killed: bool,
    killed: CancellationToken,
    calls: Mutex<Vec<RuntimeCall>>,
    specs: Mutex<Vec<ContainerSpec>>,
    log_options: Mutex<Vec<LogOptions>>,
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRuntime {
    /// A runtime whose containers print nothing and exit with 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            output: Vec::new(),
            exit_code: 0,
            wait_error: None,
            failures: Vec::new(),
            hang_until_killed: false,
            killed: CancellationToken::new(),
            calls: Mutex::new(Vec::new()),
            specs: Mutex::new(Vec::new()),
            log_options: Mutex::new(Vec::new()),
        }
    }

    /// Raw bytes returned by `logs`.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<Vec<u8>>) -> Self {
        self.output = output.into();
        self
    }

    /// Multiplexed frames returned by `logs`.
    #[must_use]
    pub fn with_frames(mut self, frames: &[(StreamKind, &str)]) -> Self {
        self.output.clear();
        for (kind, payload) in frames {
            let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
            self.output.extend_from_slice(&frame::header(*kind, len));
            self.output.extend_from_slice(payload.as_bytes());
        }
        self
    }

    /// Exit code reported by `wait`.
    #[must_use]
    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    /// Error carried in the `wait` outcome.
    #[must_use]
    pub fn with_wait_error(mut self, message: impl Into<String>) -> Self {
        self.wait_error = Some(message.into());
        self
    }

    /// Make `call` fail.
    #[must_use]
    pub fn failing(mut self, call: RuntimeCall) -> Self {
        self.failures.push(call);
        self
    }

    /// Keep the container running (and its log stream open) until killed.
    #[must_use]
    pub fn hanging(mut self) -> Self {
        self.hang_until_killed = true;
        self
    }

    /// Operations performed so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Specs passed to `create`.
    #[must_use]
    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Options passed to `logs`.
    #[must_use]
    pub fn log_requests(&self) -> Vec<LogOptions> {
        self.log_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: RuntimeCall) -> RuntimeResult<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        if self.failures.contains(&call) {
            return Err(RuntimeError::Request {
                action: call.action(),
                message: format!("scripted {} failure", call.action()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn create(&self, spec: &ContainerSpec) -> RuntimeResult<ContainerId> {
        self.record(RuntimeCall::Create)?;
        self.specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec.clone());
        Ok(ContainerId::new("scripted-container"))
    }

    async fn start(&self, _id: &ContainerId) -> RuntimeResult<()> {
        self.record(RuntimeCall::Start)
    }

    async fn logs(&self, _id: &ContainerId, options: LogOptions) -> RuntimeResult<LogStream> {
        self.record(RuntimeCall::Logs)?;
        self.log_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(options);

        let (reader, mut writer) = tokio::io::duplex(16);
        let output = self.output.clone();
        let hang = self.hang_until_killed;
        let killed = self.killed.clone();
        tokio::spawn(async move {
            for chunk in output.chunks(3) {
                if writer.write_all(chunk).await.is_err() {
                    return;
                }
                tokio::task::yield_now().await;
            }
            if hang {
                killed.cancelled().await;
            }
            let _ = writer.shutdown().await;
        });

        Ok(Box::pin(reader))
    }

    async fn wait(&self, _id: &ContainerId) -> RuntimeResult<ExitOutcome> {
        self.record(RuntimeCall::Wait)?;
        if self.hang_until_killed {
            self.killed.cancelled().await;
            return Ok(ExitOutcome::exited(137));
        }
        Ok(ExitOutcome {
            status_code: self.exit_code,
            error: self.wait_error.clone(),
        })
    }

    async fn kill(&self, _id: &ContainerId) -> RuntimeResult<()> {
        self.record(RuntimeCall::Kill)?;
        self.killed.cancel();
        Ok(())
    }

    async fn remove(&self, _id: &ContainerId) -> RuntimeResult<()> {
        self.record(RuntimeCall::Remove)
    }
}

fn write_manifest(dir: &Path, manifest: &Manifest) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(&ManifestFile::from(manifest))?;
    let path = dir.join(MANIFEST_FILE_NAME);
    std::fs::write(&path, json)?;
    Ok(path)
}

fn owned(command: &[&str]) -> Vec<String> {
    command.iter().map(|s| (*s).to_owned()).collect()
}

/// Install a container plugin and return its manifest path.
///
/// # Errors
///
/// Returns an error if the manifest cannot be written.
pub fn install_container_plugin(
    root: &Path,
    command: &[&str],
    image: &str,
    tty: bool,
) -> io::Result<PathBuf> {
    let manifest = Manifest::new(
        owned(command),
        InvokerSpec::Container {
            image: image.to_owned(),
            tty,
        },
    )
    .map_err(io::Error::other)?;
    let dir = manifest.plugin_dir(root);
    write_manifest(&dir, &manifest)
}

/// Install an executable plugin whose binary is a `/bin/sh` script running
/// `body`, and return its manifest path.
///
/// # Errors
///
/// Returns an error if the files cannot be written.
#[cfg(unix)]
pub fn install_script_plugin(
    root: &Path,
    command: &[&str],
    exec: &str,
    body: &str,
) -> io::Result<PathBuf> {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let manifest = Manifest::new(
        owned(command),
        InvokerSpec::Executable {
            exec: exec.to_owned(),
        },
    )
    .map_err(io::Error::other)?;
    let dir = manifest.plugin_dir(root);
    let path = write_manifest(&dir, &manifest)?;

    let script = dir.join(exec);
    {
        // Closed before returning so a test can exec it right away without
        // a concurrent fork still holding the write handle.
        let mut file = std::fs::File::create(&script)?;
        file.write_all(format!("#!/bin/sh\n{body}\n").as_bytes())?;
        file.set_permissions(std::fs::Permissions::from_mode(0o755))?;
        file.sync_all()?;
    }
    Ok(path)
}

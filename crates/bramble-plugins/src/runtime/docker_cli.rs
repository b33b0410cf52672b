//! Container runtime backed by the `docker` command-line tool.

use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use super::frame::{self, StreamKind};
use super::{
    ContainerId, ContainerRuntime, ContainerSpec, ExitOutcome, LogOptions, LogStream,
    RuntimeError, RuntimeResult,
};

/// Default binary name.
pub const DEFAULT_DOCKER_BINARY: &str = "docker";

/// Capacity of the in-process pipe between `docker logs` and the reader.
const LOG_PIPE_CAPACITY: usize = 16_384;

/// How long stderr from `docker logs` is held before it is passed on as
/// container output. The CLI's own failure message is its last stderr
/// write and must not be forwarded as if the container had printed it.
const STDERR_SETTLE: Duration = Duration::from_millis(200);

/// Drives containers through `docker create`, `docker start`,
/// `docker logs`, `docker wait`, `docker kill` and `docker rm`.
///
/// `docker logs` writes container stdout and stderr to its own two pipes.
/// For containers without a TTY those pipes are re-framed into the
/// multiplexed format, so callers see the same stream shape as from the
/// engine API. A failing `docker logs` ends the stream with an error
/// carrying its message.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_BINARY)
    }
}

impl DockerCli {
    /// Use the given `docker`-compatible binary (e.g. `podman`).
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// The binary this runtime invokes.
    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: io::Error) -> RuntimeError {
        if e.kind() == io::ErrorKind::NotFound {
            RuntimeError::Unavailable(format!("'{}' was not found on PATH", self.binary))
        } else {
            RuntimeError::Io(e)
        }
    }

    /// Run one `docker` subcommand to completion and return its trimmed stdout.
    async fn run(&self, action: &'static str, args: &[String]) -> RuntimeResult<String> {
        debug!(binary = %self.binary, ?args, "Running container runtime command");
        let output = self
            .command()
            .args(args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::Request {
                action,
                message: stderr.trim().to_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

/// Arguments for `docker create`.
pub(crate) fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["create".to_owned()];

    // Attach only. `--interactive` would hold stdin open with no writer.
    for (enabled, stream) in [
        (spec.attach_stdin, "stdin"),
        (spec.attach_stdout, "stdout"),
        (spec.attach_stderr, "stderr"),
    ] {
        if enabled {
            args.push("--attach".to_owned());
            args.push(stream.to_owned());
        }
    }
    if spec.tty {
        args.push("--tty".to_owned());
    }
    if spec.auto_remove {
        args.push("--rm".to_owned());
    }
    for (key, value) in &spec.env {
        args.push("--env".to_owned());
        args.push(format!("{key}={value}"));
    }

    args.push(spec.image.clone());
    args.extend(spec.cmd.iter().cloned());
    args
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn create(&self, spec: &ContainerSpec) -> RuntimeResult<ContainerId> {
        let stdout = self.run("create", &create_args(spec)).await?;
        // Pull progress may precede the id; the id is always the last line.
        stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .map(ContainerId::new)
            .ok_or_else(|| RuntimeError::Protocol {
                action: "create",
                message: "no container id in output".to_owned(),
            })
    }

    async fn start(&self, id: &ContainerId) -> RuntimeResult<()> {
        self.run("start", &["start".to_owned(), id.to_string()])
            .await
            .map(|_| ())
    }

    async fn logs(&self, id: &ContainerId, options: LogOptions) -> RuntimeResult<LogStream> {
        let mut cmd = self.command();
        cmd.arg("logs");
        if options.follow {
            cmd.arg("--follow");
        }
        cmd.arg(id.as_str())
            .stdout(if options.stdout { Stdio::piped() } else { Stdio::null() })
            .stderr(if options.stderr { Stdio::piped() } else { Stdio::null() });

        let child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        let (reader, writer) = tokio::io::duplex(LOG_PIPE_CAPACITY);
        let (verdict_tx, verdict_rx) = oneshot::channel();
        let binary = self.binary.clone();

        // Ends when `docker logs` exits or the reader is dropped.
        tokio::spawn(async move {
            let verdict = forward_logs(child, writer, &binary, options.tty).await;
            let _ = verdict_tx.send(verdict);
        });

        Ok(Box::pin(LogReader {
            pipe: reader,
            verdict: Some(verdict_rx),
        }))
    }

    async fn wait(&self, id: &ContainerId) -> RuntimeResult<ExitOutcome> {
        let stdout = self.run("wait", &["wait".to_owned(), id.to_string()]).await?;
        let code = stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .unwrap_or_default();
        code.parse::<i64>()
            .map(ExitOutcome::exited)
            .map_err(|e| RuntimeError::Protocol {
                action: "wait",
                message: format!("invalid exit code '{code}': {e}"),
            })
    }

    async fn kill(&self, id: &ContainerId) -> RuntimeResult<()> {
        self.run("kill", &["kill".to_owned(), id.to_string()])
            .await
            .map(|_| ())
    }

    async fn remove(&self, id: &ContainerId) -> RuntimeResult<()> {
        self.run("rm", &["rm".to_owned(), "--force".to_owned(), id.to_string()])
            .await
            .map(|_| ())
    }
}

/// Output of one `docker logs` process.
///
/// Once the forwarded output ends, the read fails with the CLI's own error
/// message if `docker logs` exited unsuccessfully.
struct LogReader {
    pipe: DuplexStream,
    verdict: Option<oneshot::Receiver<Option<String>>>,
}

impl AsyncRead for LogReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.pipe).poll_read(cx, buf))?;
        if buf.filled().len() > before || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let Some(verdict) = this.verdict.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let verdict = ready!(Pin::new(verdict).poll(cx));
        this.verdict = None;
        match verdict {
            Ok(Some(message)) => Poll::Ready(Err(io::Error::other(message))),
            Ok(None) | Err(_) => Poll::Ready(Ok(())),
        }
    }
}

/// Pump `docker logs` output into the in-process pipe.
///
/// Returns the failure to hand to the reader if `docker logs` itself
/// exited unsuccessfully.
async fn forward_logs(
    mut child: Child,
    mut sink: DuplexStream,
    binary: &str,
    tty: bool,
) -> Option<String> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // `unforwarded` is CLI stderr that was not passed on as container output.
    let (result, mut unforwarded) = if tty {
        // A TTY container has a single stream on stdout; stderr is the CLI's.
        let copy = async {
            let copied = copy_pipe(stdout, &mut sink).await;
            if copied.is_err() {
                // Nobody is reading any more; a following `docker logs`
                // would not exit and close its stderr.
                let _ = child.start_kill();
            }
            copied
        };
        tokio::join!(copy, read_pipe(stderr))
    } else {
        match multiplex(stdout, stderr, &mut sink).await {
            Ok(held) => (Ok(()), held),
            Err(e) => {
                let _ = child.start_kill();
                (Err(e), Vec::new())
            },
        }
    };

    if let Err(e) = &result {
        debug!(error = %e, "Container log forwarding stopped");
    }

    let verdict = match child.wait().await {
        Ok(status) if status.success() => None,
        Ok(status) => {
            let detail = String::from_utf8_lossy(&unforwarded);
            let detail = detail.trim();
            Some(if detail.is_empty() {
                format!("'{binary} logs' failed ({status})")
            } else {
                format!("'{binary} logs' failed ({status}): {detail}")
            })
        },
        Err(e) => Some(format!("unable to wait for '{binary} logs': {e}")),
    };

    if result.is_ok()
        && verdict.is_none()
        && !tty
        && let Err(e) = release(&mut sink, &mut unforwarded).await
    {
        debug!(error = %e, "Container log forwarding stopped");
    }
    let _ = sink.shutdown().await;
    verdict
}

async fn copy_pipe<R>(pipe: Option<R>, sink: &mut DuplexStream) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    match pipe {
        Some(mut pipe) => tokio::io::copy(&mut pipe, sink).await.map(|_| ()),
        None => Ok(()),
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe
        && let Err(e) = pipe.read_to_end(&mut buf).await
    {
        debug!(error = %e, "Failed to read container runtime stderr");
    }
    buf
}

/// What woke the multiplexing loop.
enum Chunk {
    Stdout(io::Result<usize>),
    Stderr(io::Result<usize>),
    Settled,
}

/// Interleave two pipes into multiplexed frames, in arrival order.
///
/// Stderr is held back until [`STDERR_SETTLE`] passes without more of it or
/// stdout moves on. Whatever is still held when both pipes close is
/// returned unframed: it may be the CLI's own failure message.
async fn multiplex<O, E, W>(
    mut stdout: Option<O>,
    mut stderr: Option<E>,
    sink: &mut W,
) -> io::Result<Vec<u8>>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut out_buf = vec![0u8; 8192];
    let mut err_buf = vec![0u8; 8192];
    let mut held = Vec::new();
    let mut release_at: Option<Instant> = None;

    while stdout.is_some() || stderr.is_some() {
        // Pipes first, so a CLI that has already exited is seen as closed
        // before the settle timer fires.
        let chunk = tokio::select! {
            biased;
            n = read_some(stdout.as_mut(), &mut out_buf) => Chunk::Stdout(n),
            n = read_some(stderr.as_mut(), &mut err_buf) => Chunk::Stderr(n),
            () = settle(release_at) => Chunk::Settled,
        };

        match chunk {
            Chunk::Stdout(n) => match n? {
                0 => stdout = None,
                n => {
                    release(sink, &mut held).await?;
                    release_at = None;
                    frame::write_frame(sink, StreamKind::Stdout, &out_buf[..n]).await?;
                },
            },
            Chunk::Stderr(n) => match n? {
                0 => stderr = None,
                n => {
                    held.extend_from_slice(&err_buf[..n]);
                    if held.len() >= LOG_PIPE_CAPACITY {
                        release(sink, &mut held).await?;
                        release_at = None;
                    } else if release_at.is_none() {
                        let now = Instant::now();
                        release_at = Some(now.checked_add(STDERR_SETTLE).unwrap_or(now));
                    }
                },
            },
            Chunk::Settled => {
                release(sink, &mut held).await?;
                release_at = None;
            },
        }
    }

    sink.flush().await?;
    Ok(held)
}

/// Write held stderr as one frame.
async fn release<W>(sink: &mut W, held: &mut Vec<u8>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if held.is_empty() {
        return Ok(());
    }
    frame::write_frame(sink, StreamKind::Stderr, held).await?;
    held.clear();
    sink.flush().await
}

async fn settle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Read from a pipe that may already be closed; a closed pipe never resolves.
async fn read_some<R>(pipe: Option<&mut R>, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match pipe {
        Some(pipe) => pipe.read(buf).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn create_args_attach_all_streams_and_auto_remove() {
        let spec = ContainerSpec::new("alpine")
            .with_cmd(vec!["echo".to_owned(), "hello world".to_owned()]);

        assert_eq!(
            create_args(&spec),
            vec![
                "create",
                "--attach",
                "stdin",
                "--attach",
                "stdout",
                "--attach",
                "stderr",
                "--rm",
                "alpine",
                "echo",
                "hello world",
            ]
        );
    }

    #[test]
    fn create_args_tty_and_env() {
        let mut env = BTreeMap::new();
        env.insert("A".to_owned(), "C".to_owned());
        let mut spec = ContainerSpec::new("img:1").with_tty(true).with_env(env);
        spec.attach_stdin = false;
        spec.auto_remove = false;

        let args = create_args(&spec);
        assert!(args.contains(&"--tty".to_owned()));
        assert!(!args.contains(&"--rm".to_owned()));
        assert!(!args.contains(&"stdin".to_owned()));
        let joined = args.join(" ");
        assert!(joined.contains("--env A=C img:1"));
    }

    #[tokio::test]
    async fn multiplex_frames_stdout_and_returns_trailing_stderr() {
        let stdout: &[u8] = b"out";
        let stderr: &[u8] = b"err";
        let mut sink = Vec::new();
        let held = multiplex(Some(stdout), Some(stderr), &mut sink).await.unwrap();

        let (mut out, mut err): (Vec<u8>, Vec<u8>) = (Vec::new(), Vec::new());
        frame::demux(&mut sink.as_slice(), &mut out, &mut err)
            .await
            .unwrap();
        assert_eq!(out, b"out");
        assert!(err.is_empty());
        assert_eq!(held, b"err");
    }

    #[tokio::test(start_paused = true)]
    async fn held_stderr_is_released_after_settling() {
        let (stdout, mut stdout_writer) = tokio::io::duplex(64);
        let stderr: &[u8] = b"warning\n";
        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stdout_writer.write_all(b"later").await.unwrap();
        });

        let mut sink = Vec::new();
        let held = multiplex(Some(stdout), Some(stderr), &mut sink).await.unwrap();
        closer.await.unwrap();

        assert!(held.is_empty());
        let (mut out, mut err): (Vec<u8>, Vec<u8>) = (Vec::new(), Vec::new());
        frame::demux(&mut sink.as_slice(), &mut out, &mut err)
            .await
            .unwrap();
        assert_eq!(err, b"warning\n");
        assert_eq!(out, b"later");
    }

    #[tokio::test]
    async fn log_reader_fails_after_output_when_cli_failed() {
        let (pipe, mut writer) = tokio::io::duplex(64);
        let (tx, rx) = oneshot::channel();
        writer.write_all(b"partial").await.unwrap();
        drop(writer);
        tx.send(Some("'docker logs' failed (exit status: 1): boom".to_owned()))
            .unwrap();

        let mut reader = LogReader {
            pipe,
            verdict: Some(rx),
        };
        let mut buf = Vec::new();
        let err = reader.read_to_end(&mut buf).await.unwrap_err();
        assert_eq!(buf, b"partial");
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn log_reader_ends_cleanly_on_success() {
        let (pipe, writer) = tokio::io::duplex(64);
        let (tx, rx) = oneshot::channel();
        drop(writer);
        tx.send(None).unwrap();

        let mut reader = LogReader {
            pipe,
            verdict: Some(rx),
        };
        let mut buf = Vec::new();
        assert_eq!(reader.read_to_end(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let runtime = DockerCli::new("bramble-test-no-such-docker-binary");
        let err = runtime.start(&ContainerId::new("abc")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Unavailable(_)), "got {err}");
    }
}

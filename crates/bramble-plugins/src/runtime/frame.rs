//! Multiplexed container output framing.
//!
//! Without a TTY, a container's stdout and stderr travel over one byte
//! stream as a sequence of frames. Each frame has an 8-byte header:
//!
//! ```text
//! [stream, 0, 0, 0, len3, len2, len1, len0]
//! ```
//!
//! followed by `len` (big-endian `u32`) payload bytes. `stream` is 0 for
//! stdin, 1 for stdout, 2 for stderr, and 3 for an error raised by the
//! runtime itself.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of a frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Largest runtime error payload read into memory.
const MAX_SYSTEM_ERROR_LEN: u64 = 65_536;

/// Origin of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Echoed stdin.
    Stdin,
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
    /// An error raised by the runtime, not the container.
    SystemError,
}

impl StreamKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            3 => Some(Self::SystemError),
            _ => None,
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            Self::Stdin => 0,
            Self::Stdout => 1,
            Self::Stderr => 2,
            Self::SystemError => 3,
        }
    }
}

/// Byte counts written by [`demux`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    /// Bytes written to the stdout sink.
    pub stdout: u64,
    /// Bytes written to the stderr sink.
    pub stderr: u64,
}

/// Build the header for a frame carrying `len` bytes.
#[must_use]
pub fn header(kind: StreamKind, len: u32) -> [u8; HEADER_LEN] {
    let [l0, l1, l2, l3] = len.to_be_bytes();
    [kind.as_byte(), 0, 0, 0, l0, l1, l2, l3]
}

/// Write one frame.
///
/// # Errors
///
/// Returns an error if the payload does not fit a frame or the write fails.
pub async fn write_frame<W>(writer: &mut W, kind: StreamKind, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame payload too large"))?;
    writer.write_all(&header(kind, len)).await?;
    writer.write_all(payload).await
}

/// Split a multiplexed stream into stdout and stderr.
///
/// Payloads are copied to the sinks as they arrive; nothing beyond one
/// frame header is buffered. Stdin frames go to stdout. A clean end of
/// stream between frames ends the copy successfully.
///
/// # Errors
///
/// Returns `UnexpectedEof` if the stream ends inside a frame,
/// `InvalidData` for an unknown stream byte, the runtime's message for a
/// system-error frame, or any read/write error.
pub async fn demux<R, O, E>(reader: &mut R, stdout: &mut O, stderr: &mut E) -> io::Result<DemuxStats>
where
    R: AsyncRead + Unpin + ?Sized,
    O: AsyncWrite + Unpin + ?Sized,
    E: AsyncWrite + Unpin + ?Sized,
{
    let mut stats = DemuxStats::default();
    let mut head = [0u8; HEADER_LEN];

    while read_header(reader, &mut head).await? {
        let [kind, _, _, _, l0, l1, l2, l3] = head;
        let len = u64::from(u32::from_be_bytes([l0, l1, l2, l3]));
        let kind = StreamKind::from_byte(kind).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown stream type {kind} in container output"),
            )
        })?;

        let mut payload = (&mut *reader).take(len);
        let copied = match kind {
            StreamKind::Stdin | StreamKind::Stdout => {
                let n = tokio::io::copy(&mut payload, stdout).await?;
                stats.stdout = stats.stdout.saturating_add(n);
                n
            },
            StreamKind::Stderr => {
                let n = tokio::io::copy(&mut payload, stderr).await?;
                stats.stderr = stats.stderr.saturating_add(n);
                n
            },
            StreamKind::SystemError => {
                let mut message = Vec::new();
                (&mut payload)
                    .take(MAX_SYSTEM_ERROR_LEN)
                    .read_to_end(&mut message)
                    .await?;
                return Err(io::Error::other(format!(
                    "container runtime error: {}",
                    String::from_utf8_lossy(&message).trim_end()
                )));
            },
        };

        if copied != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("container output ended inside a frame ({copied} of {len} bytes)"),
            ));
        }
    }

    stdout.flush().await?;
    stderr.flush().await?;
    Ok(stats)
}

/// Fill `head`, returning `false` on a clean end of stream before any byte.
async fn read_header<R>(reader: &mut R, head: &mut [u8; HEADER_LEN]) -> io::Result<bool>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0usize;
    while filled < HEADER_LEN {
        let n = reader.read(&mut head[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "container output ended inside a frame header",
            ));
        }
        filled = filled.saturating_add(n);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn framed(frames: &[(StreamKind, &str)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (kind, payload) in frames {
            write_frame(&mut out, *kind, payload.as_bytes()).await.unwrap();
        }
        out
    }

    #[test]
    fn header_layout() {
        assert_eq!(header(StreamKind::Stderr, 0x0102_0304), [2, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn splits_stdout_and_stderr() {
        let input = framed(&[
            (StreamKind::Stdout, "out"),
            (StreamKind::Stderr, "err"),
            (StreamKind::Stdout, "\nmore"),
        ])
        .await;

        let (mut out, mut err): (Vec<u8>, Vec<u8>) = (Vec::new(), Vec::new());
        let stats = demux(&mut input.as_slice(), &mut out, &mut err).await.unwrap();

        assert_eq!(out, b"out\nmore");
        assert_eq!(err, b"err");
        assert_eq!(stats, DemuxStats { stdout: 8, stderr: 3 });
    }

    #[tokio::test]
    async fn empty_stream_is_clean() {
        let mut empty: &[u8] = &[];
        let (mut out, mut err): (Vec<u8>, Vec<u8>) = (Vec::new(), Vec::new());
        let stats = demux(&mut empty, &mut out, &mut err).await.unwrap();
        assert_eq!(stats, DemuxStats::default());
    }

    #[tokio::test]
    async fn stdin_frames_go_to_stdout() {
        let input = framed(&[(StreamKind::Stdin, "echo")]).await;
        let (mut out, mut err): (Vec<u8>, Vec<u8>) = (Vec::new(), Vec::new());
        demux(&mut input.as_slice(), &mut out, &mut err).await.unwrap();
        assert_eq!(out, b"echo");
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn truncated_payload_is_an_error() {
        let mut input = framed(&[(StreamKind::Stdout, "hello")]).await;
        input.truncate(10);

        let (mut out, mut err): (Vec<u8>, Vec<u8>) = (Vec::new(), Vec::new());
        let e = demux(&mut input.as_slice(), &mut out, &mut err).await.unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"he");
    }

    #[tokio::test]
    async fn truncated_header_is_an_error() {
        let input = [1u8, 0, 0];
        let (mut out, mut err): (Vec<u8>, Vec<u8>) = (Vec::new(), Vec::new());
        let e = demux(&mut input.as_slice(), &mut out, &mut err).await.unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn unknown_stream_byte_is_invalid() {
        let input = [9u8, 0, 0, 0, 0, 0, 0, 1, b'x'];
        let (mut out, mut err): (Vec<u8>, Vec<u8>) = (Vec::new(), Vec::new());
        let e = demux(&mut input.as_slice(), &mut out, &mut err).await.unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn system_error_frame_surfaces_message() {
        let input = framed(&[
            (StreamKind::Stdout, "partial"),
            (StreamKind::SystemError, "log driver failed\n"),
        ])
        .await;

        let (mut out, mut err): (Vec<u8>, Vec<u8>) = (Vec::new(), Vec::new());
        let e = demux(&mut input.as_slice(), &mut out, &mut err).await.unwrap_err();
        assert!(e.to_string().contains("log driver failed"));
        assert_eq!(out, b"partial");
    }

    #[tokio::test]
    async fn header_split_across_reads() {
        let input = framed(&[(StreamKind::Stderr, "slow")]).await;
        let (client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            for byte in input {
                server.write_all(&[byte]).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let mut client = client;
        let (mut out, mut err): (Vec<u8>, Vec<u8>) = (Vec::new(), Vec::new());
        demux(&mut client, &mut out, &mut err).await.unwrap();
        writer.await.unwrap();

        assert_eq!(err, b"slow");
    }
}

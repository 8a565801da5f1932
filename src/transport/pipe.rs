//! Unix domain socket transport for BTP.
//!
//! The harness binds a socket path and the IUT (or the board bridge in
//! front of it) connects exactly once per run. After that the socket is a
//! lock-step byte stream: one frame out, one frame in.
//!
//! # Example
//!
//! ```ignore
//! use btp_harness::transport::BtpListener;
//!
//! let listener = BtpListener::bind("/tmp/bt-stack-tester")?;
//! let mut transport = listener.accept().await?;
//! let frame = transport.read(None).await?;
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use crate::error::{BtpError, Result};
use crate::protocol::{Frame, Header, HEADER_SIZE};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Unix Domain Socket listener accepting the single IUT connection.
pub struct BtpListener {
    listener: UnixListener,
    path: PathBuf,
}

impl BtpListener {
    /// Bind to a Unix socket path.
    ///
    /// Removes any existing socket file at the path before binding.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        tracing::debug!("BTP socket bound at {}", path.display());

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accept the IUT connection.
    pub async fn accept(&self) -> Result<Transport> {
        let (stream, _addr) = self.listener.accept().await?;
        tracing::info!("IUT connected on {}", self.path.display());
        Ok(Transport::from_unix(stream))
    }

    /// Accept the IUT connection, giving up after `timeout`.
    pub async fn accept_timeout(&self, timeout: Duration) -> Result<Transport> {
        tokio::time::timeout(timeout, self.accept())
            .await
            .map_err(|_| BtpError::Timeout(timeout))?
    }

    /// Get the socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BtpListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// One connected, bidirectional BTP channel.
///
/// Only one logical caller may use a transport at a time; higher layers
/// serialize access (see [`crate::correlator::BtpHandle`]).
pub struct Transport {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl Transport {
    /// Wrap a connected Unix stream.
    pub fn from_unix(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Wrap any duplex byte stream (in-memory pipes, serial bridges).
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Connect to a socket the other side is listening on.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self::from_unix(stream))
    }

    /// Write one frame with a single write.
    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        tracing::debug!(
            "BTP send: svc=0x{:02x} op=0x{:02x} idx=0x{:02x} len={}",
            frame.header.service_id,
            frame.header.opcode,
            frame.header.controller_index,
            frame.header.data_len
        );
        self.writer
            .write_all(&frame.to_bytes())
            .await
            .map_err(map_io)?;
        self.writer.flush().await.map_err(map_io)
    }

    /// Read one frame: exactly 5 header bytes, then exactly `data_len`
    /// payload bytes.
    ///
    /// Blocks the calling task. With a timeout, fails with
    /// [`BtpError::Timeout`] if both reads have not completed in time.
    pub async fn read(&mut self, timeout: Option<Duration>) -> Result<Frame> {
        let frame = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_frame())
                .await
                .map_err(|_| BtpError::Timeout(limit))??,
            None => self.read_frame().await?,
        };

        tracing::debug!(
            "BTP recv: svc=0x{:02x} op=0x{:02x} idx=0x{:02x} len={}",
            frame.header.service_id,
            frame.header.opcode,
            frame.header.controller_index,
            frame.header.data_len
        );
        Ok(frame)
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        let mut raw = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut raw).await.map_err(map_io)?;
        let header = Header::decode(&raw)?;

        // data_len is a u16, so this allocation never exceeds 64 KiB.
        let mut payload = vec![0u8; header.data_len as usize];
        self.reader.read_exact(&mut payload).await.map_err(map_io)?;

        Ok(Frame::from_parts(header, Bytes::from(payload)))
    }

    /// Shut down the write half.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(map_io)
    }
}

fn map_io(e: io::Error) -> BtpError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset => BtpError::ConnectionClosed,
        _ => BtpError::Io(e),
    }
}

/// Build a socket path unique to this process, under the temp dir.
pub fn generate_socket_path(prefix: &str) -> PathBuf {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let pid = std::process::id();

    std::env::temp_dir().join(format!(
        "{}-{}-{:x}.sock",
        prefix,
        pid,
        nanos.wrapping_mul(0x517cc1b727220a95)
    ))
}

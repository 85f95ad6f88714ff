use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// A connected byte stream with independently locked read and write halves.
///
/// The read half is only ever driven by one receive task; the write half is
/// locked for the duration of a whole `write` call so that concurrent senders
/// cannot interleave the bytes of one buffer with another.
pub struct PipeStream<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
    connected: AtomicBool,
    kind: &'static str,
    peer: Option<PeerCredentials>,
}

/// Credentials of the process on the other end of a local socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub uid: u32,
    pub gid: u32,
    pub pid: Option<u32>,
}

/// Unix domain socket stream split into owned halves.
#[cfg(unix)]
pub type UnixPipeStream =
    PipeStream<tokio::net::unix::OwnedReadHalf, tokio::net::unix::OwnedWriteHalf>;

impl<R, W> PipeStream<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an already connected read/write pair.
    pub fn new(reader: R, writer: W, kind: &'static str) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            connected: AtomicBool::new(true),
            kind,
            peer: None,
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        self.kind
    }

    /// Credentials of the connected peer, when the platform exposes them.
    pub fn peer_credentials(&self) -> Option<PeerCredentials> {
        self.peer
    }

    fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!(transport = self.kind, "transport disconnected");
        }
    }

    fn note_io_error(&self, err: &std::io::Error) {
        if matches!(
            err.kind(),
            ErrorKind::BrokenPipe
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::UnexpectedEof
        ) {
            self.mark_disconnected();
        }
    }
}

#[cfg(unix)]
impl UnixPipeStream {
    /// Split a connected Unix stream into a shared transport.
    pub fn from_unix(stream: tokio::net::UnixStream) -> Self {
        let peer = stream.peer_cred().ok().map(|cred| PeerCredentials {
            uid: cred.uid(),
            gid: cred.gid(),
            pid: cred.pid().map(|pid| pid as u32),
        });
        let (reader, writer) = stream.into_split();
        let mut stream = Self::new(reader, writer, "unix-domain-socket");
        stream.peer = peer;
        stream
    }
}

#[async_trait]
impl<R, W> Transport for PipeStream<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn read(&self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize> {
        let mut reader = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            reader = self.reader.lock() => reader,
        };

        // `AsyncReadExt::read` is cancel safe: losing the race consumes nothing.
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = reader.read(buf) => result,
        };

        match result {
            Ok(0) if !buf.is_empty() => {
                self.mark_disconnected();
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(err) => {
                self.note_io_error(&err);
                Err(TransportError::Io(err))
            }
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await.map_err(|err| {
            self.note_io_error(&err);
            TransportError::Io(err)
        })
    }

    async fn flush(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.flush().await.map_err(|err| {
            self.note_io_error(&err);
            TransportError::Io(err)
        })
    }

    async fn wait_for_drain(&self) -> Result<()> {
        // Sockets and duplex pipes hand bytes to the peer on write; a flush
        // under the write lock waits out any in-progress sender.
        self.flush().await
    }

    async fn close(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(transport = self.kind, "closing transport");
        let mut writer = self.writer.lock().await;
        match writer.shutdown().await {
            Ok(()) => Ok(()),
            Err(err) if matches!(err.kind(), ErrorKind::NotConnected | ErrorKind::BrokenPipe) => {
                Ok(())
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

impl<R, W> std::fmt::Debug for PipeStream<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeStream")
            .field("type", &self.kind)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish()
    }
}

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// An ordered, bidirectional byte stream.
///
/// Implementations are shared between a receive task and any number of
/// senders, so every method takes `&self`. Reads and writes must not block
/// each other: a send issued while a read is pending has to make progress.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Non-blocking connection status query.
    fn is_connected(&self) -> bool;

    /// Read up to `buf.len()` bytes.
    ///
    /// Returns `Ok(0)` when the peer closed the stream. May return fewer bytes
    /// than requested while the connection stays open. When `cancel` fires
    /// before data arrives the read is abandoned with
    /// [`TransportError::Cancelled`](crate::TransportError::Cancelled) and no
    /// bytes are consumed from the stream.
    async fn read(&self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize>;

    /// Write all of `bytes` as one unit.
    async fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Flush buffered writes to the underlying stream.
    async fn flush(&self) -> Result<()>;

    /// Wait until written bytes have been handed to the peer side.
    async fn wait_for_drain(&self) -> Result<()>;

    /// Close the stream. Closing an already closed transport is a no-op.
    async fn close(&self) -> Result<()>;
}

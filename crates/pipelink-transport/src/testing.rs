//! Transports for tests.
//!
//! - [`MemoryTransport`]: a real in-memory duplex pair
//! - [`ScriptedTransport`]: replays a fixed sequence of read results and
//!   records every write, for fault injection

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::io::{duplex, DuplexStream};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransportError};
use crate::stream::PipeStream;
use crate::traits::Transport;

/// Default per-direction buffer size of an in-memory pair.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// A transport backed by two in-memory pipes, one per direction.
pub type MemoryTransport = PipeStream<DuplexStream, DuplexStream>;

impl MemoryTransport {
    /// Create a connected pair of in-memory transports.
    ///
    /// Bytes written on one side are read on the other. Closing or dropping a
    /// side is observed by its partner as end of stream.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a connected pair with a custom buffer size.
    ///
    /// Small buffers force writers to wait on readers, which is useful for
    /// exercising backpressure and short reads.
    pub fn pair_with_buffer_size(buffer_size: usize) -> (Self, Self) {
        let (a_to_b_write, a_to_b_read) = duplex(buffer_size);
        let (b_to_a_write, b_to_a_read) = duplex(buffer_size);

        (
            PipeStream::new(b_to_a_read, a_to_b_write, "in-memory"),
            PipeStream::new(a_to_b_read, b_to_a_write, "in-memory"),
        )
    }
}

enum ReadStep {
    Data(Vec<u8>),
    Eof,
    Fail(ErrorKind),
}

/// A transport that replays scripted read results.
///
/// Each read consumes the next step. A data step larger than the read buffer
/// is split across reads. Once the script is exhausted, reads wait until
/// their cancellation token fires, like an idle open pipe.
#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<ReadStep>>,
    written: Mutex<Vec<u8>>,
    write_failure: Mutex<Option<ErrorKind>>,
    disconnected: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
    flushes: AtomicUsize,
    drains: AtomicUsize,
    closes: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedTransport {
    /// An idle, connected transport with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `bytes` on the next read (split if the buffer is smaller).
    pub fn with_chunk(self, bytes: impl Into<Vec<u8>>) -> Self {
        lock(&self.steps).push_back(ReadStep::Data(bytes.into()));
        self
    }

    /// Append `bytes` to the script of a transport already in use.
    ///
    /// A read that is already waiting on an exhausted script is not woken.
    pub fn push_chunk(&self, bytes: impl Into<Vec<u8>>) {
        lock(&self.steps).push_back(ReadStep::Data(bytes.into()));
    }

    /// Report end of stream on the next read.
    pub fn with_eof(self) -> Self {
        lock(&self.steps).push_back(ReadStep::Eof);
        self
    }

    /// Fail the next read with an I/O error of `kind`.
    pub fn with_read_error(self, kind: ErrorKind) -> Self {
        lock(&self.steps).push_back(ReadStep::Fail(kind));
        self
    }

    /// Fail every write with an I/O error of `kind`.
    pub fn with_write_error(self, kind: ErrorKind) -> Self {
        *lock(&self.write_failure) = Some(kind);
        self
    }

    /// Start out reporting "not connected".
    pub fn disconnected(self) -> Self {
        self.disconnected.store(true, Ordering::SeqCst);
        self
    }

    /// Flip the connection flag.
    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    /// Every byte successfully written so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.written).clone()
    }

    /// Number of read calls that returned a result (data, EOF or error).
    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of write calls that reached the transport.
    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn flush_calls(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn drain_calls(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }

    async fn read(&self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let step = lock(&self.steps).pop_front();
        let Some(step) = step else {
            cancel.cancelled().await;
            return Err(TransportError::Cancelled);
        };
        self.reads.fetch_add(1, Ordering::SeqCst);
        match step {
            ReadStep::Data(mut bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    let rest = bytes.split_off(n);
                    lock(&self.steps).push_front(ReadStep::Data(rest));
                }
                Ok(n)
            }
            ReadStep::Eof => {
                self.disconnected.store(true, Ordering::SeqCst);
                Ok(0)
            }
            ReadStep::Fail(kind) => Err(TransportError::Io(kind.into())),
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = *lock(&self.write_failure) {
            return Err(TransportError::Io(kind.into()));
        }
        lock(&self.written).extend_from_slice(bytes);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_for_drain(&self) -> Result<()> {
        self.drains.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

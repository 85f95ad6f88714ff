use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use pipelink_transport::{CancellationToken, Transport, TransportError};
use tracing::{debug, trace};

use crate::codec::{check_length, decode_header, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Outcome of reading one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRead {
    /// A whole payload arrived.
    Frame(Bytes),
    /// The peer closed the stream at a frame boundary, or before sending any
    /// byte of the body.
    Closed,
}

/// A frame whose header has been consumed but whose body has not fully
/// arrived.
#[derive(Debug)]
struct PartialFrame {
    body: BytesMut,
    filled: usize,
}

/// Reads one frame at a time from a [`Transport`].
///
/// Each frame costs a single header read followed by body reads until the
/// declared length has arrived. A header read that comes back short is a
/// protocol violation; the header is never reassembled across reads.
///
/// A body read interrupted by the cancellation token is parked in the reader
/// and resumed by the next [`read_frame`](Self::read_frame), so cancelling
/// never leaves the stream misaligned. Call [`reset`](Self::reset) before
/// reading from a different transport.
#[derive(Debug, Default)]
pub struct FrameReader {
    config: FrameConfig,
    partial: Mutex<Option<PartialFrame>>,
}

impl FrameReader {
    /// Create a new frame reader with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            config,
            partial: Mutex::new(None),
        }
    }

    fn partial(&self) -> MutexGuard<'_, Option<PartialFrame>> {
        self.partial.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a cancelled frame is waiting to be resumed.
    pub fn has_partial_frame(&self) -> bool {
        self.partial().is_some()
    }

    /// Drop any parked partial frame.
    pub fn reset(&self) {
        if let Some(partial) = self.partial().take() {
            debug!(
                filled = partial.filled,
                expected = partial.body.len(),
                "discarding partial frame"
            );
        }
    }

    /// Read the next frame.
    ///
    /// A cancellation observed by the transport surfaces as
    /// `FrameError::Transport(TransportError::Cancelled)`. If it interrupts
    /// the body, the header and the body bytes read so far are kept and the
    /// next call continues the same frame. Dropping the returned future
    /// instead of cancelling through the token loses that state.
    pub async fn read_frame<T>(&self, transport: &T, cancel: &CancellationToken) -> Result<FrameRead>
    where
        T: Transport + ?Sized,
    {
        let resumed = self.partial().take();
        let (mut body, mut filled) = match resumed {
            Some(partial) => {
                trace!(
                    filled = partial.filled,
                    expected = partial.body.len(),
                    "resuming partial frame"
                );
                (partial.body, partial.filled)
            }
            None => {
                let mut header = [0u8; HEADER_SIZE];
                let read = transport.read(&mut header, cancel).await?;
                if read == 0 {
                    debug!("peer closed stream at frame boundary");
                    return Ok(FrameRead::Closed);
                }
                if read != HEADER_SIZE {
                    return Err(FrameError::ShortHeader {
                        read,
                        expected: HEADER_SIZE,
                    });
                }

                let len =
                    check_length(decode_header(header) as usize, self.config.max_payload_size)?;
                if len == 0 {
                    // A read into an empty buffer would look like end of stream.
                    return Ok(FrameRead::Frame(Bytes::new()));
                }
                (BytesMut::zeroed(len), 0)
            }
        };

        let len = body.len();
        while filled < len {
            let read = match transport.read(&mut body[filled..], cancel).await {
                Ok(read) => read,
                Err(TransportError::Cancelled) => {
                    debug!(filled, expected = len, "frame read cancelled mid-body");
                    *self.partial() = Some(PartialFrame { body, filled });
                    return Err(FrameError::Transport(TransportError::Cancelled));
                }
                Err(err) => return Err(err.into()),
            };
            if read == 0 {
                if filled == 0 {
                    debug!(expected = len, "peer closed stream before frame body");
                    return Ok(FrameRead::Closed);
                }
                return Err(FrameError::TruncatedBody {
                    read: filled,
                    expected: len,
                });
            }
            filled += read;
        }

        trace!(size = len, "frame read");
        Ok(FrameRead::Frame(body.freeze()))
    }

    /// Update maximum payload size for subsequent reads.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

use std::time::Duration;

use pipelink_frame::FrameError;
use pipelink_transport::TransportError;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The connection guard reported "not connected".
    #[error("pipe is not connected")]
    NotConnected,

    /// The endpoint was closed and cannot be reused.
    #[error("pipe endpoint is closed")]
    EndpointClosed,

    /// The endpoint already has a live connection.
    #[error("pipe endpoint is already connected")]
    AlreadyConnected,

    /// Another connection attempt on the same endpoint has not finished.
    #[error("a connection attempt is already in progress")]
    ConnectInProgress,

    /// The byte stream no longer lines up with frame boundaries.
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[source] FrameError),

    /// A frame length above the configured cap, incoming or outgoing.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The underlying transport failed.
    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),

    /// Connection establishment did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Coarse classification of a [`ChannelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotConnected,
    ProtocolViolation,
    TransportFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::ProtocolViolation => "protocol_violation",
            ErrorKind::TransportFailure => "transport_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChannelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::NotConnected
            | ChannelError::EndpointClosed
            | ChannelError::AlreadyConnected
            | ChannelError::ConnectInProgress => ErrorKind::NotConnected,
            ChannelError::ProtocolViolation(_) | ChannelError::FrameTooLarge { .. } => {
                ErrorKind::ProtocolViolation
            }
            ChannelError::TransportFailure(_) | ChannelError::Timeout(_) => {
                ErrorKind::TransportFailure
            }
        }
    }
}

impl From<FrameError> for ChannelError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::PayloadTooLarge { size, max } => ChannelError::FrameTooLarge { size, max },
            FrameError::Transport(TransportError::Closed) => ChannelError::NotConnected,
            FrameError::Transport(err) => ChannelError::TransportFailure(err),
            other => ChannelError::ProtocolViolation(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A header read returned fewer than four bytes.
    #[error("short header read ({read} of {expected} bytes)")]
    ShortHeader { read: usize, expected: usize },

    /// The stream ended partway through a frame body.
    #[error("truncated frame body ({read} of {expected} bytes)")]
    TruncatedBody { read: usize, expected: usize },

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] pipelink_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, FrameError>;

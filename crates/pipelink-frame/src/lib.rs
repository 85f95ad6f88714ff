//! Length-prefixed message framing for pipelink.
//!
//! Every message travels as a 4-byte little-endian payload length followed by
//! the payload itself. There is no magic number, checksum or version byte.
//!
//! - [`codec`] encodes and decodes frames in memory
//! - [`FrameReader`] pulls one frame at a time off a [`Transport`](pipelink_transport::Transport)
//! - [`FrameWriter`] hands one whole frame to a transport per call

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    check_length, decode_frame, decode_header, encode, encode_frame, FrameConfig,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::{FrameRead, FrameReader};
pub use writer::FrameWriter;

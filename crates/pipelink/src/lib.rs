//! Message-oriented duplex pipes over local byte streams.
//!
//! pipelink turns an ordered byte stream (a Unix domain socket, or anything
//! implementing [`transport::Transport`]) into a channel of whole messages,
//! with connect, disconnect and error notifications and a background receive
//! loop that can be cancelled without corrupting the stream.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream transports (Unix domain sockets, in-memory pairs)
//! - [`frame`]: length-prefixed framing, `[u32 LE length][payload]`
//! - [`channel`]: the receive loop, event fan-out and client/server endpoints

/// Re-export transport types.
pub mod transport {
    pub use pipelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pipelink_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use pipelink_channel::*;
}

pub use pipelink_channel::{
    ChannelConfig, ChannelError, ConnectionState, LoopExit, PipeEvent, Result,
};

#[cfg(unix)]
pub use pipelink_channel::{ClientPipe, ServerPipe};

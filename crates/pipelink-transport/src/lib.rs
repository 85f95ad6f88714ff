//! Async byte-stream transports for pipelink.
//!
//! This is the lowest layer: an ordered, bidirectional byte stream that can
//! report whether it is still connected, read into a buffer under a
//! cancellation token, write, flush, drain and close. Everything above it
//! (framing, the receive loop, endpoints) only talks to the [`Transport`]
//! trait.
//!
//! Provided implementations:
//! - [`PipeStream`] over Unix domain sockets, created by [`UnixDomainSocket`]
//! - `testing::MemoryTransport` over an in-memory duplex pipe, with the
//!   `testing` feature

pub mod error;
pub mod stream;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::{PeerCredentials, PipeStream};
pub use traits::Transport;

#[cfg(unix)]
pub use stream::UnixPipeStream;
#[cfg(unix)]
pub use uds::UnixDomainSocket;

pub use tokio_util::sync::CancellationToken;

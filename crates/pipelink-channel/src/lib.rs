//! Message channels over pipelink transports.
//!
//! A channel turns an ordered byte stream into whole messages and publishes
//! what happens on it as [`PipeEvent`]s:
//!
//! - [`PipeCore`] holds the framing state: the connection guard, the send
//!   path, close, and the [`receive_loop`](PipeCore::receive_loop)
//! - [`EventHub`] fans events out to any number of subscribers
//! - [`PipeEndpoint`] owns a transport, runs the loop on a task and tracks
//!   [`ConnectionState`]
//! - [`ClientPipe`] and [`ServerPipe`] are endpoints over Unix domain sockets
//!
//! ```no_run
//! use std::time::Duration;
//! use pipelink_channel::{ClientPipe, PipeEvent, ServerPipe};
//!
//! # async fn demo() -> pipelink_channel::Result<()> {
//! let server = ServerPipe::bind("/tmp/demo.sock")?;
//! let mut events = server.subscribe();
//! let client = ClientPipe::new("/tmp/demo.sock");
//!
//! let (accepted, connected) = tokio::join!(
//!     server.wait_for_connection(),
//!     client.connect(Duration::from_secs(1)),
//! );
//! accepted?;
//! connected?;
//!
//! client.send(b"ping").await;
//! while let Some(event) = events.recv().await {
//!     if let PipeEvent::MessageReceived(payload) = event {
//!         assert_eq!(payload.as_ref(), b"ping");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod pipe;
pub mod receive;

#[cfg(unix)]
pub mod client;
#[cfg(unix)]
pub mod server;

pub use config::ChannelConfig;
pub use endpoint::{ConnectionState, PipeEndpoint};
pub use error::{ChannelError, ErrorKind, Result};
pub use event::{EventHub, EventReceiver, PipeEvent};
pub use pipe::PipeCore;
pub use receive::LoopExit;

#[cfg(unix)]
pub use client::ClientPipe;
#[cfg(unix)]
pub use server::ServerPipe;

pub use pipelink_transport::CancellationToken;

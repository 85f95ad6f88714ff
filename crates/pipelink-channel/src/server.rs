use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use pipelink_transport::{PeerCredentials, UnixDomainSocket, UnixPipeStream};
use tracing::{debug, info};

use crate::config::ChannelConfig;
use crate::endpoint::{ConnectionState, PipeEndpoint};
use crate::error::{ChannelError, Result};
use crate::event::{EventHub, EventReceiver};
use crate::receive::LoopExit;

/// Server side of a pipe: listens on a Unix domain socket and serves one
/// peer at a time.
///
/// The socket file is created on [`bind`](Self::bind) and removed when the
/// server is dropped, unless it was replaced in the meantime.
#[derive(Debug)]
pub struct ServerPipe {
    socket: UnixDomainSocket,
    endpoint: PipeEndpoint<UnixPipeStream>,
    peer: Mutex<Option<PeerCredentials>>,
}

impl ServerPipe {
    /// Bind a listener at `path`. Must be called from within a tokio runtime.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_config(path, ChannelConfig::default())
    }

    pub fn bind_with_config(path: impl AsRef<Path>, config: ChannelConfig) -> Result<Self> {
        let socket = UnixDomainSocket::bind(path)?;
        Ok(Self {
            socket,
            endpoint: PipeEndpoint::new(config),
            peer: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        self.socket.path()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.endpoint.subscribe()
    }

    pub fn events(&self) -> &Arc<EventHub> {
        self.endpoint.events()
    }

    pub fn state(&self) -> ConnectionState {
        self.endpoint.state()
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.is_connected()
    }

    /// Credentials of the most recently accepted peer.
    pub fn peer_credentials(&self) -> Option<PeerCredentials> {
        *self.peer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept exactly one peer, publish `Connected` and start the receive
    /// loop.
    ///
    /// Returns immediately if a peer is already connected. Once the previous
    /// peer has gone away (its `Disconnected` or `Error` event has been
    /// published) this may be called again to serve the next one. A second
    /// call while one is still waiting fails with
    /// [`ChannelError::ConnectInProgress`]. Closing the server while waiting
    /// ends the wait with [`ChannelError::EndpointClosed`].
    pub async fn wait_for_connection(&self) -> Result<()> {
        if !self.endpoint.begin_connecting()? {
            debug!(path = ?self.path(), "peer already connected");
            return Ok(());
        }

        let accepted = tokio::select! {
            _ = self.endpoint.cancellation_token().cancelled() => Err(ChannelError::EndpointClosed),
            accepted = self.socket.accept() => accepted.map_err(ChannelError::from),
        };

        match accepted {
            Ok(stream) => {
                let peer = stream.peer_credentials();
                info!(path = ?self.path(), pid = ?peer.and_then(|p| p.pid), "peer connected");
                *self.peer.lock().unwrap_or_else(PoisonError::into_inner) = peer;
                self.endpoint.start(stream)
            }
            Err(err) => {
                self.endpoint.abort_connecting();
                Err(err)
            }
        }
    }

    pub async fn send(&self, payload: &[u8]) {
        self.endpoint.send(payload).await;
    }

    pub async fn try_send(&self, payload: &[u8]) -> Result<()> {
        self.endpoint.try_send(payload).await
    }

    pub async fn close(&self) {
        self.endpoint.close().await;
    }

    pub async fn try_close(&self) -> Result<()> {
        self.endpoint.try_close().await
    }

    /// Wait for the receive loop to end.
    pub async fn join(&self) -> Option<LoopExit> {
        self.endpoint.join().await
    }
}

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pipelink_transport::{TransportError, UnixDomainSocket, UnixPipeStream};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::ChannelConfig;
use crate::endpoint::{ConnectionState, PipeEndpoint};
use crate::error::{ChannelError, Result};
use crate::event::{EventHub, EventReceiver};
use crate::receive::LoopExit;

/// Client side of a pipe over a Unix domain socket.
///
/// ```no_run
/// use std::time::Duration;
/// use pipelink_channel::{ClientPipe, PipeEvent};
///
/// # async fn demo() -> pipelink_channel::Result<()> {
/// let client = ClientPipe::new("/tmp/pipelink.sock");
/// let mut events = client.subscribe();
/// client.connect(Duration::from_secs(5)).await?;
/// client.send(b"hello").await;
/// while let Some(event) = events.recv().await {
///     if let PipeEvent::MessageReceived(reply) = event {
///         println!("{} bytes", reply.len());
///         break;
///     }
/// }
/// client.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ClientPipe {
    path: PathBuf,
    config: ChannelConfig,
    endpoint: PipeEndpoint<UnixPipeStream>,
}

impl ClientPipe {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_config(path, ChannelConfig::default())
    }

    pub fn with_config(path: impl AsRef<Path>, config: ChannelConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            endpoint: PipeEndpoint::new(config),
        }
    }

    /// Socket path this client connects to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.endpoint.subscribe()
    }

    pub fn events(&self) -> &std::sync::Arc<EventHub> {
        self.endpoint.events()
    }

    pub fn state(&self) -> ConnectionState {
        self.endpoint.state()
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.is_connected()
    }

    /// Connect to the server, retrying while it is not listening yet.
    ///
    /// A missing socket or a refused connection is retried every
    /// `connect_retry_interval` until `timeout` runs out. On success the
    /// `Connected` event is published and the receive loop starts. Calling
    /// this while connected is a no-op; calling it while another `connect`
    /// is still retrying fails with [`ChannelError::ConnectInProgress`].
    pub async fn connect(&self, timeout: Duration) -> Result<()> {
        if !self.endpoint.begin_connecting()? {
            debug!(path = ?self.path, "already connected");
            return Ok(());
        }

        match self.connect_with_retry(timeout).await {
            Ok(stream) => {
                info!(path = ?self.path, "client connected");
                self.endpoint.start(stream)
            }
            Err(err) => {
                self.endpoint.abort_connecting();
                Err(err)
            }
        }
    }

    async fn connect_with_retry(&self, timeout: Duration) -> Result<UnixPipeStream> {
        let deadline = Instant::now() + timeout;
        let cancel = self.endpoint.cancellation_token();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match UnixDomainSocket::connect(&self.path).await {
                Ok(stream) => return Ok(stream),
                Err(err) if is_retryable(&err) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!(path = ?self.path, attempts, error = %err, "giving up on connect");
                        return Err(ChannelError::Timeout(timeout));
                    }
                    let pause = self.config.connect_retry_interval.min(deadline - now);
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ChannelError::EndpointClosed),
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
                Err(err) => return Err(err.into()),
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

fn is_retryable(err: &TransportError) -> bool {
    match err {
        TransportError::Connect { source, .. } => matches!(
            source.kind(),
            IoErrorKind::NotFound | IoErrorKind::ConnectionRefused
        ),
        _ => false,
    }
}

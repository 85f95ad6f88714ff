use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pipelink_transport::{CancellationToken, Transport};
use tokio::task::JoinHandle;
use tokio_util::sync::DropGuard;
use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::event::{EventHub, EventReceiver};
use crate::pipe::PipeCore;
use crate::receive::LoopExit;

/// Connection state of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport attached. The initial state, and the state after the
    /// peer went away or the receive loop faulted.
    Disconnected,
    /// Waiting for a peer.
    Connecting,
    /// A transport is attached and the receive loop is running.
    Connected,
    /// Closed by the owner. Terminal.
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Shared<T: ?Sized> {
    core: PipeCore<T>,
    state: Mutex<ConnectionState>,
}

impl<T: ?Sized> Shared<T> {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns one transport at a time and runs its receive loop.
///
/// The building block behind [`ClientPipe`](crate::ClientPipe) and
/// [`ServerPipe`](crate::ServerPipe); usable directly with any
/// [`Transport`], which is how the in-memory tests drive it.
///
/// Dropping the endpoint cancels its receive loop.
pub struct PipeEndpoint<T: Transport> {
    shared: Arc<Shared<T>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<LoopExit>>>,
    _cancel_on_drop: DropGuard,
}

impl<T: Transport> PipeEndpoint<T> {
    pub fn new(config: ChannelConfig) -> Self {
        let cancel = CancellationToken::new();
        Self {
            shared: Arc::new(Shared {
                core: PipeCore::new(config),
                state: Mutex::new(ConnectionState::Disconnected),
            }),
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            task: Mutex::new(None),
        }
    }

    /// Register an event observer.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.core.subscribe()
    }

    pub fn events(&self) -> &Arc<EventHub> {
        self.shared.core.events()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.core.is_connected()
    }

    /// Token that fires when the endpoint is closed or dropped.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Move from `Disconnected` to `Connecting`.
    ///
    /// Returns `Ok(false)` when a connection is already up, which callers
    /// treat as a successful no-op. Only one attempt may be in flight; a
    /// second one fails with [`ChannelError::ConnectInProgress`].
    pub(crate) fn begin_connecting(&self) -> Result<bool> {
        let mut state = self.shared.state();
        match *state {
            ConnectionState::Closed => Err(ChannelError::EndpointClosed),
            ConnectionState::Connected => Ok(false),
            ConnectionState::Connecting => Err(ChannelError::ConnectInProgress),
            ConnectionState::Disconnected => {
                *state = ConnectionState::Connecting;
                Ok(true)
            }
        }
    }

    /// Undo [`begin_connecting`](Self::begin_connecting) after a failed
    /// attempt. A concurrent close wins.
    pub(crate) fn abort_connecting(&self) {
        let mut state = self.shared.state();
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Disconnected;
        }
    }

    /// Attach a connected transport, publish `Connected` and spawn the
    /// receive loop.
    ///
    /// Fails with [`ChannelError::AlreadyConnected`] while a previous
    /// transport is still attached; `transport` is dropped in that case.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, transport: T) -> Result<()> {
        {
            let mut state = self.shared.state();
            match *state {
                ConnectionState::Closed => return Err(ChannelError::EndpointClosed),
                ConnectionState::Connected => {
                    warn!("endpoint already connected; rejecting new transport");
                    return Err(ChannelError::AlreadyConnected);
                }
                ConnectionState::Disconnected | ConnectionState::Connecting => {
                    *state = ConnectionState::Connected
                }
            }
        }

        self.shared.core.attach(Arc::new(transport));

        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.child_token();
        let handle = tokio::spawn(async move {
            let end = shared.core.read_until_end(&cancel).await;
            if end.is_cancelled() {
                return shared.core.publish_end(end);
            }
            if let Err(err) = shared.core.try_close().await {
                debug!(error = %err, "closing transport after loop exit failed");
            }
            // Observers of the terminal event must already see the endpoint
            // as free to reconnect.
            let mut state = shared.state();
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Disconnected;
            }
            let exit = shared.core.publish_end(end);
            drop(state);
            exit
        });

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            if !previous.is_finished() {
                debug!("replacing a receive loop that is still winding down");
            }
        }
        Ok(())
    }

    /// Send one message; failures are published as `Error` events.
    pub async fn send(&self, payload: &[u8]) {
        self.shared.core.send(payload).await;
    }

    /// Send one message, returning any failure to the caller.
    pub async fn try_send(&self, payload: &[u8]) -> Result<()> {
        self.shared.core.try_send(payload).await
    }

    /// Stop the receive loop, drain and close the transport. Terminal and
    /// idempotent.
    pub async fn try_close(&self) -> Result<()> {
        self.cancel.cancel();
        let previous = std::mem::replace(&mut *self.shared.state(), ConnectionState::Closed);
        if previous != ConnectionState::Closed {
            debug!(from = %previous, "closing endpoint");
        }
        self.shared.core.try_close().await
    }

    /// Like [`try_close`](Self::try_close), publishing failures as `Error`
    /// events.
    pub async fn close(&self) {
        if let Err(err) = self.try_close().await {
            self.events().error(err);
        }
    }

    /// Wait for the current receive loop to end.
    ///
    /// Returns `None` if no loop was started since the last `join`.
    pub async fn join(&self) -> Option<LoopExit> {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        match handle.await {
            Ok(exit) => Some(exit),
            Err(err) => {
                warn!(error = %err, "receive loop task failed");
                None
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for PipeEndpoint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeEndpoint")
            .field("state", &self.state())
            .field("connected", &self.is_connected())
            .finish()
    }
}

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ChannelError;

/// Lifecycle notifications published by a pipe.
#[derive(Debug, Clone)]
pub enum PipeEvent {
    /// A transport was attached and the receive loop is about to start.
    Connected,
    /// The peer closed the stream gracefully.
    Disconnected,
    /// One whole message arrived.
    MessageReceived(Bytes),
    /// A send or the receive loop failed.
    Error(Arc<ChannelError>),
}

/// Receiving side of a subscription. Dropping it unsubscribes.
pub type EventReceiver = mpsc::UnboundedReceiver<PipeEvent>;

/// Fans pipe events out to every subscriber.
///
/// Each subscriber owns an unbounded queue, so a slow observer never causes
/// another to miss events, and every observer sees each event once in
/// emission order. Queues whose receiver was dropped are pruned on the next
/// emission.
#[derive(Debug, Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PipeEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers().push(tx);
        rx
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    pub fn connected(&self) {
        self.emit(PipeEvent::Connected);
    }

    pub fn disconnected(&self) {
        self.emit(PipeEvent::Disconnected);
    }

    pub fn message(&self, payload: Bytes) {
        self.emit(PipeEvent::MessageReceived(payload));
    }

    /// Report an error; returns the shared handle that was published.
    pub fn error(&self, err: ChannelError) -> Arc<ChannelError> {
        let err = Arc::new(err);
        self.error_shared(Arc::clone(&err));
        err
    }

    pub(crate) fn error_shared(&self, err: Arc<ChannelError>) {
        warn!(kind = %err.kind(), error = %err, "pipe error");
        self.emit(PipeEvent::Error(err));
    }

    fn emit(&self, event: PipeEvent) {
        let mut subscribers = self.subscribers();
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.len() != before {
            debug!(
                dropped = before - subscribers.len(),
                "pruned closed event subscribers"
            );
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<PipeEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

use std::sync::{Arc, PoisonError, RwLock};

use pipelink_frame::{FrameReader, FrameWriter};
use pipelink_transport::Transport;
use tracing::{debug, info};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::event::{EventHub, EventReceiver};

/// The framing core shared by client and server endpoints.
///
/// Holds a borrowed reference to the endpoint's transport for as long as the
/// connection lasts. Every send and every receive iteration first asks the
/// transport whether it is still connected; after [`close`](Self::close) the
/// reference is gone and both report [`ChannelError::NotConnected`].
pub struct PipeCore<T: ?Sized> {
    transport: RwLock<Option<Arc<T>>>,
    events: Arc<EventHub>,
    pub(crate) reader: FrameReader,
    writer: FrameWriter,
    drain_on_close: bool,
}

impl<T> PipeCore<T>
where
    T: Transport + ?Sized,
{
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_events(config, Arc::new(EventHub::new()))
    }

    /// Build a core that publishes into an existing hub.
    pub fn with_events(config: ChannelConfig, events: Arc<EventHub>) -> Self {
        Self {
            transport: RwLock::new(None),
            events,
            reader: FrameReader::with_config(config.frame_config()),
            writer: FrameWriter::with_config(config.frame_config()),
            drain_on_close: config.drain_on_close,
        }
    }

    /// Lend a connected transport to the core and publish `Connected`.
    ///
    /// Any partial frame left from a previous transport is discarded.
    pub fn attach(&self, transport: Arc<T>) {
        self.reader.reset();
        *self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(transport);
        info!("pipe connected");
        self.events.connected();
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Whether a transport is attached and reports itself connected.
    pub fn is_connected(&self) -> bool {
        self.current()
            .map(|transport| transport.is_connected())
            .unwrap_or(false)
    }

    /// The connection guard: the attached transport, if it is connected.
    pub(crate) fn connected_transport(&self) -> Result<Arc<T>> {
        match self.current() {
            Some(transport) if transport.is_connected() => Ok(transport),
            _ => Err(ChannelError::NotConnected),
        }
    }

    fn current(&self) -> Option<Arc<T>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn detach(&self) -> Option<Arc<T>> {
        self.transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Send one message, returning any failure to the caller.
    ///
    /// Nothing is written when the guard fails. The frame goes out in one
    /// transport write followed by a flush.
    pub async fn try_send(&self, payload: &[u8]) -> Result<()> {
        let transport = self.connected_transport()?;
        self.writer.send(&*transport, payload).await?;
        debug!(size = payload.len(), "message sent");
        Ok(())
    }

    /// Send one message, reporting any failure as an `Error` event.
    ///
    /// Never returns an error; a failed message is dropped after being
    /// reported once.
    pub async fn send(&self, payload: &[u8]) {
        if let Err(err) = self.try_send(payload).await {
            self.events.error(err);
        }
    }

    /// Drain, close and release the transport. Closing twice is a no-op.
    pub async fn try_close(&self) -> Result<()> {
        let Some(transport) = self.detach() else {
            return Ok(());
        };

        let drained = if self.drain_on_close && transport.is_connected() {
            transport.wait_for_drain().await
        } else {
            Ok(())
        };
        let closed = transport.close().await;
        debug!("pipe closed");

        drained?;
        closed?;
        Ok(())
    }

    /// Like [`try_close`](Self::try_close), reporting failures as an `Error`
    /// event.
    pub async fn close(&self) {
        if let Err(err) = self.try_close().await {
            self.events.error(err);
        }
    }
}

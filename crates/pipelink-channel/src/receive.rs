use std::sync::Arc;

use pipelink_frame::{FrameError, FrameRead};
use pipelink_transport::{CancellationToken, Transport, TransportError};
use tracing::{debug, info};

use crate::error::ChannelError;
use crate::pipe::PipeCore;

/// How a receive loop ended.
#[derive(Debug, Clone)]
pub enum LoopExit {
    /// The peer closed the stream; `Disconnected` was published.
    Disconnected,
    /// The cancellation token fired. Nothing was published.
    Cancelled,
    /// The loop hit an error; it was published once as `Error`.
    Faulted(Arc<ChannelError>),
}

impl LoopExit {
    pub fn is_disconnected(&self) -> bool {
        matches!(self, LoopExit::Disconnected)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoopExit::Cancelled)
    }

    /// The error that ended the loop, if any.
    pub fn error(&self) -> Option<&Arc<ChannelError>> {
        match self {
            LoopExit::Faulted(err) => Some(err),
            _ => None,
        }
    }
}

/// How a read loop ended, before anything about it is published.
#[derive(Debug)]
pub(crate) enum LoopEnd {
    Disconnected,
    Cancelled,
    Faulted(ChannelError),
}

impl LoopEnd {
    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(self, LoopEnd::Cancelled)
    }
}

impl<T> PipeCore<T>
where
    T: Transport + ?Sized,
{
    /// Read frames and publish them until the stream ends, faults, or
    /// `cancel` fires.
    ///
    /// Runs exactly one iteration per frame. The token and the connection
    /// guard are checked at the top of every iteration. A frame interrupted
    /// by the token is never published; its header and body bytes stay
    /// parked in the core's reader, so a later loop over the same transport
    /// picks the frame up where this one stopped.
    pub async fn receive_loop(&self, cancel: &CancellationToken) -> LoopExit {
        let end = self.read_until_end(cancel).await;
        self.publish_end(end)
    }

    /// The loop body: publishes messages but leaves the final
    /// `Disconnected`/`Error` to [`publish_end`](Self::publish_end), so an
    /// owner can release the transport first.
    pub(crate) async fn read_until_end(&self, cancel: &CancellationToken) -> LoopEnd {
        loop {
            if cancel.is_cancelled() {
                debug!("receive loop cancelled");
                return LoopEnd::Cancelled;
            }

            let transport = match self.connected_transport() {
                Ok(transport) => transport,
                Err(err) => return LoopEnd::Faulted(err),
            };

            match self.reader.read_frame(&*transport, cancel).await {
                Ok(FrameRead::Frame(payload)) => {
                    debug!(size = payload.len(), "message received");
                    self.events().message(payload);
                }
                Ok(FrameRead::Closed) => {
                    info!("peer disconnected");
                    return LoopEnd::Disconnected;
                }
                Err(FrameError::Transport(TransportError::Cancelled)) => continue,
                Err(err) => return LoopEnd::Faulted(err.into()),
            }
        }
    }

    /// Publish the terminal event for `end`, if it has one.
    pub(crate) fn publish_end(&self, end: LoopEnd) -> LoopExit {
        match end {
            LoopEnd::Disconnected => {
                self.events().disconnected();
                LoopExit::Disconnected
            }
            LoopEnd::Cancelled => LoopExit::Cancelled,
            LoopEnd::Faulted(err) => LoopExit::Faulted(self.events().error(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind as IoErrorKind;
    use std::time::Duration;

    use pipelink_frame::encode;
    use pipelink_transport::testing::{MemoryTransport, ScriptedTransport};

    use super::*;
    use crate::config::ChannelConfig;
    use crate::error::ErrorKind;
    use crate::event::{EventReceiver, PipeEvent};

    fn frame(payload: &[u8]) -> Vec<u8> {
        encode(payload).unwrap().to_vec()
    }

    fn core_over<T: Transport>(
        transport: T,
        config: ChannelConfig,
    ) -> (PipeCore<T>, Arc<T>, EventReceiver) {
        let core = PipeCore::new(config);
        let events = core.subscribe();
        let transport = Arc::new(transport);
        core.attach(Arc::clone(&transport));
        (core, transport, events)
    }

    fn drain(events: &mut EventReceiver) -> Vec<PipeEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    fn messages(events: &[PipeEvent]) -> Vec<Vec<u8>> {
        events
            .iter()
            .filter_map(|event| match event {
                PipeEvent::MessageReceived(payload) => Some(payload.to_vec()),
                _ => None,
            })
            .collect()
    }

    fn errors(events: &[PipeEvent]) -> Vec<Arc<ChannelError>> {
        events
            .iter()
            .filter_map(|event| match event {
                PipeEvent::Error(err) => Some(Arc::clone(err)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn delivers_messages_in_order_then_one_disconnect() {
        let mut wire = frame(b"A");
        wire.extend(frame(b""));
        wire.extend(frame(b"BC"));
        let (core, _transport, mut events) = core_over(
            ScriptedTransport::new().with_chunk(wire).with_eof(),
            ChannelConfig::default(),
        );

        let exit = core.receive_loop(&CancellationToken::new()).await;
        assert!(exit.is_disconnected());

        let seen = drain(&mut events);
        assert!(matches!(seen.first(), Some(PipeEvent::Connected)));
        assert_eq!(
            messages(&seen),
            vec![b"A".to_vec(), Vec::new(), b"BC".to_vec()]
        );
        assert!(matches!(seen.last(), Some(PipeEvent::Disconnected)));
        assert!(errors(&seen).is_empty());
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn eof_before_body_is_a_graceful_disconnect() {
        let (core, _transport, mut events) = core_over(
            ScriptedTransport::new()
                .with_chunk(5u32.to_le_bytes().to_vec())
                .with_eof(),
            ChannelConfig::default(),
        );

        let exit = core.receive_loop(&CancellationToken::new()).await;
        assert!(exit.is_disconnected());

        let seen = drain(&mut events);
        assert!(messages(&seen).is_empty());
        assert!(errors(&seen).is_empty());
    }

    #[tokio::test]
    async fn short_header_faults_once_without_message() {
        let (core, _transport, mut events) = core_over(
            ScriptedTransport::new().with_chunk(vec![0x01, 0x00]),
            ChannelConfig::default(),
        );

        let exit = core.receive_loop(&CancellationToken::new()).await;
        let err = exit.error().expect("loop should fault");
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);

        let seen = drain(&mut events);
        assert!(messages(&seen).is_empty());
        assert_eq!(errors(&seen).len(), 1);
        assert!(!seen.iter().any(|e| matches!(e, PipeEvent::Disconnected)));
    }

    #[tokio::test]
    async fn truncated_body_is_a_protocol_violation() {
        let mut wire = 6u32.to_le_bytes().to_vec();
        wire.extend_from_slice(b"abc");
        let (core, _transport, mut events) = core_over(
            ScriptedTransport::new().with_chunk(wire).with_eof(),
            ChannelConfig::default(),
        );

        let exit = core.receive_loop(&CancellationToken::new()).await;
        assert_eq!(
            exit.error().map(|err| err.kind()),
            Some(ErrorKind::ProtocolViolation)
        );
        assert!(messages(&drain(&mut events)).is_empty());
    }

    #[tokio::test]
    async fn oversized_header_faults_before_reading_body() {
        let mut wire = 64u32.to_le_bytes().to_vec();
        wire.extend_from_slice(&[0u8; 64]);
        let (core, transport, _events) = core_over(
            ScriptedTransport::new().with_chunk(wire),
            ChannelConfig {
                max_payload_size: 16,
                ..ChannelConfig::default()
            },
        );

        let exit = core.receive_loop(&CancellationToken::new()).await;
        assert!(matches!(
            exit.error().map(|err| &**err),
            Some(ChannelError::FrameTooLarge { size: 64, max: 16 })
        ));
        assert_eq!(transport.read_calls(), 1);
    }

    #[tokio::test]
    async fn transport_failure_faults_once() {
        let (core, _transport, mut events) = core_over(
            ScriptedTransport::new()
                .with_chunk(frame(b"ok"))
                .with_read_error(IoErrorKind::ConnectionReset),
            ChannelConfig::default(),
        );

        let exit = core.receive_loop(&CancellationToken::new()).await;
        assert_eq!(
            exit.error().map(|err| err.kind()),
            Some(ErrorKind::TransportFailure)
        );

        let seen = drain(&mut events);
        assert_eq!(messages(&seen), vec![b"ok".to_vec()]);
        assert_eq!(errors(&seen).len(), 1);
        assert!(!seen.iter().any(|e| matches!(e, PipeEvent::Disconnected)));
    }

    #[tokio::test]
    async fn disconnected_guard_faults_before_any_read() {
        let (core, transport, mut events) = core_over(
            ScriptedTransport::new().disconnected(),
            ChannelConfig::default(),
        );

        let exit = core.receive_loop(&CancellationToken::new()).await;
        assert_eq!(
            exit.error().map(|err| err.kind()),
            Some(ErrorKind::NotConnected)
        );
        assert_eq!(transport.read_calls(), 0);
        assert_eq!(errors(&drain(&mut events)).len(), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_token_exits_without_reading() {
        let (core, transport, mut events) =
            core_over(ScriptedTransport::new(), ChannelConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let exit = core.receive_loop(&cancel).await;
        assert!(exit.is_cancelled());
        assert_eq!(transport.read_calls(), 0);

        let seen = drain(&mut events);
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], PipeEvent::Connected));
    }

    #[tokio::test]
    async fn cancel_mid_frame_publishes_nothing() {
        let mut wire = 10u32.to_le_bytes().to_vec();
        wire.extend_from_slice(b"part");
        let (core, _transport, mut events) = core_over(
            ScriptedTransport::new().with_chunk(wire),
            ChannelConfig::default(),
        );
        let core = Arc::new(core);
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let core = Arc::clone(&core);
            let cancel = cancel.clone();
            async move { core.receive_loop(&cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let exit = task.await.unwrap();
        assert!(exit.is_cancelled());
        let seen = drain(&mut events);
        assert!(messages(&seen).is_empty());
        assert!(errors(&seen).is_empty());
        assert!(!seen.iter().any(|e| matches!(e, PipeEvent::Disconnected)));
    }

    #[tokio::test]
    async fn cancelled_frame_is_delivered_by_the_next_loop() {
        let (left, right) = MemoryTransport::pair();
        let (core, _transport, mut events) = core_over(left, ChannelConfig::default());
        let core = Arc::new(core);
        let wire = frame(b"hello world");

        right.write(&wire[..6]).await.unwrap();
        let cancel = CancellationToken::new();
        let first = tokio::spawn({
            let core = Arc::clone(&core);
            let cancel = cancel.clone();
            async move { core.receive_loop(&cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        assert!(first.await.unwrap().is_cancelled());

        right.write(&wire[6..]).await.unwrap();
        right.write(&frame(b"next")).await.unwrap();
        right.close().await.unwrap();

        let exit = core.receive_loop(&CancellationToken::new()).await;
        assert!(exit.is_disconnected());

        let seen = drain(&mut events);
        assert_eq!(
            messages(&seen),
            vec![b"hello world".to_vec(), b"next".to_vec()]
        );
        assert!(errors(&seen).is_empty());
    }

    #[tokio::test]
    async fn loop_after_close_faults_with_not_connected() {
        let (core, transport, mut events) =
            core_over(ScriptedTransport::new(), ChannelConfig::default());
        core.close().await;

        let exit = core.receive_loop(&CancellationToken::new()).await;
        assert!(matches!(
            exit.error().map(|err| &**err),
            Some(ChannelError::NotConnected)
        ));
        assert_eq!(transport.read_calls(), 0);
        assert_eq!(errors(&drain(&mut events)).len(), 1);
    }

    #[tokio::test]
    async fn memory_pair_carries_messages_both_ways() {
        let (left, right) = MemoryTransport::pair();
        let (server, _server_transport, mut server_events) =
            core_over(left, ChannelConfig::default());
        let (client, _client_transport, mut client_events) =
            core_over(right, ChannelConfig::default());
        let server = Arc::new(server);
        let cancel = CancellationToken::new();

        let server_loop = tokio::spawn({
            let server = Arc::clone(&server);
            let cancel = cancel.clone();
            async move { server.receive_loop(&cancel).await }
        });

        assert!(matches!(server_events.recv().await, Some(PipeEvent::Connected)));
        assert!(matches!(client_events.recv().await, Some(PipeEvent::Connected)));

        let big = vec![0x5Au8; 300 * 1024];
        client.try_send(b"first").await.unwrap();
        client.try_send(&big).await.unwrap();
        client.try_close().await.unwrap();

        assert!(matches!(
            server_events.recv().await,
            Some(PipeEvent::MessageReceived(p)) if p.as_ref() == b"first"
        ));
        assert!(matches!(
            server_events.recv().await,
            Some(PipeEvent::MessageReceived(p)) if p.len() == big.len()
        ));
        assert!(matches!(server_events.recv().await, Some(PipeEvent::Disconnected)));
        assert!(server_loop.await.unwrap().is_disconnected());
    }
}

use pipelink_transport::Transport;
use tracing::trace;

use crate::codec::{check_length, encode, FrameConfig};
use crate::error::Result;

/// Writes complete frames to a [`Transport`].
///
/// Every call encodes the whole frame into one buffer, hands it to the
/// transport in a single `write`, then flushes.
#[derive(Debug, Clone, Default)]
pub struct FrameWriter {
    config: FrameConfig,
}

impl FrameWriter {
    /// Create a new frame writer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Encode and send one payload.
    pub async fn send<T>(&self, transport: &T, payload: &[u8]) -> Result<()>
    where
        T: Transport + ?Sized,
    {
        check_length(payload.len(), self.config.max_payload_size)?;
        let frame = encode(payload)?;

        transport.write(&frame).await?;
        transport.flush().await?;
        trace!(size = payload.len(), "frame written");
        Ok(())
    }

    /// Update maximum payload size for subsequent sends.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

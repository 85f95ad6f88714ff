use std::time::Duration;

use pipelink_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};

/// Controls channel behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Largest payload accepted on receive or send. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Pause between connection attempts while a client waits for a server.
    pub connect_retry_interval: Duration,
    /// Wait for written bytes to drain before closing a connected transport.
    pub drain_on_close: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            connect_retry_interval: Duration::from_millis(25),
            drain_on_close: true,
        }
    }
}

impl ChannelConfig {
    /// Frame-level view of this configuration.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
        }
    }
}

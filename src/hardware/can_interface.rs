use async_trait::async_trait;
use crate::core::Frame;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a CAN bus backend
#[derive(Debug, Error)]
pub enum BusError {
    /// The channel could not be opened; fatal for the worker owning it
    #[error("failed to open {channel}: {reason}")]
    Open { channel: String, reason: String },

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("interface is not connected")]
    NotConnected,

    #[error("{0} is not supported by this build")]
    Unsupported(String),
}

/// Result type for CAN interface operations
pub type CanResult<T> = Result<T, BusError>;

/// Configuration for a CAN interface
#[derive(Debug, Clone)]
pub struct CanConfig {
    /// Channel name, e.g. `vcan0`
    pub channel: String,
    /// Enable CAN FD mode
    pub fd_mode: bool,
    /// Deliver our own transmissions back to our receive path
    pub receive_own_frames: bool,
}

impl CanConfig {
    /// FD-capable loopback configuration used for latency measurement
    pub fn loopback(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            fd_mode: true,
            receive_own_frames: true,
        }
    }
}

/// Status of a CAN interface
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CanStatus {
    /// Interface is disconnected
    Disconnected,
    /// Interface is connected and ready
    Connected,
}

/// Trait for CAN bus interface implementations
///
/// This trait provides a common interface for different CAN backends:
/// - SocketCAN (Linux, `socketcan` feature)
/// - An in-process virtual bus with named channels
/// - Scripted mock interfaces for testing
///
/// Backends that are asked for `receive_own_frames` must echo every frame
/// they send back into their own receive path.
#[async_trait]
pub trait CanInterface: Send {
    /// Get the name/identifier of this interface
    fn name(&self) -> &str;

    /// Get the current status of the interface
    fn status(&self) -> CanStatus;

    /// Open the channel with the given configuration
    async fn connect(&mut self, config: CanConfig) -> CanResult<()>;

    /// Close the channel. Must be safe to call when not connected.
    async fn disconnect(&mut self) -> CanResult<()>;

    /// Send a frame
    async fn send(&mut self, frame: &Frame) -> CanResult<()>;

    /// Wait up to `timeout` for the next frame; `Ok(None)` on timeout
    async fn receive(&mut self, timeout: Duration) -> CanResult<Option<Frame>>;

    /// Check if the interface supports CAN FD
    fn supports_fd(&self) -> bool {
        false
    }
}

//! In-process CAN bus with named channels
//!
//! Every interface connected to the same channel name sees every frame sent
//! on it, like several sockets bound to one `vcan` device. Own frames are
//! delivered back only when `receive_own_frames` is set.

use async_trait::async_trait;
use crate::core::Frame;
use crate::hardware::can_interface::{BusError, CanConfig, CanInterface, CanResult, CanStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

/// Frames buffered per channel before slow receivers start lagging
const CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
struct BusFrame {
    origin: u64,
    frame: Frame,
}

/// Registry of named virtual channels
#[derive(Default)]
pub struct VirtualBus {
    channels: Mutex<HashMap<String, broadcast::Sender<BusFrame>>>,
    next_node: AtomicU64,
}

impl VirtualBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create an interface attached to this bus
    pub fn interface(self: &Arc<Self>, name: &str) -> VirtualCanInterface {
        VirtualCanInterface {
            name: name.to_string(),
            node: self.next_node.fetch_add(1, Ordering::SeqCst),
            bus: self.clone(),
            status: CanStatus::Disconnected,
            receive_own_frames: false,
            link: None,
        }
    }

    /// Number of channels that have been opened at least once
    pub async fn channel_count(&self) -> usize {
        self.channels.lock().await.len()
    }

    async fn attach(&self, channel: &str) -> (broadcast::Sender<BusFrame>, broadcast::Receiver<BusFrame>) {
        let mut channels = self.channels.lock().await;
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        let receiver = sender.subscribe();
        (sender, receiver)
    }
}

struct Link {
    tx: broadcast::Sender<BusFrame>,
    rx: broadcast::Receiver<BusFrame>,
}

/// One node on a [`VirtualBus`] channel
pub struct VirtualCanInterface {
    name: String,
    node: u64,
    bus: Arc<VirtualBus>,
    status: CanStatus,
    receive_own_frames: bool,
    link: Option<Link>,
}

#[async_trait]
impl CanInterface for VirtualCanInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> CanStatus {
        self.status
    }

    async fn connect(&mut self, config: CanConfig) -> CanResult<()> {
        let (tx, rx) = self.bus.attach(&config.channel).await;
        debug!("virtual node {} joined {}", self.node, config.channel);
        self.receive_own_frames = config.receive_own_frames;
        self.link = Some(Link { tx, rx });
        self.status = CanStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> CanResult<()> {
        self.link = None;
        self.status = CanStatus::Disconnected;
        Ok(())
    }

    async fn send(&mut self, frame: &Frame) -> CanResult<()> {
        let link = self.link.as_ref().ok_or(BusError::NotConnected)?;
        link.tx
            .send(BusFrame {
                origin: self.node,
                frame: frame.clone(),
            })
            .map(|_| ())
            .map_err(|e| BusError::Send(e.to_string()))
    }

    async fn receive(&mut self, timeout: Duration) -> CanResult<Option<Frame>> {
        let node = self.node;
        let receive_own = self.receive_own_frames;
        let link = self.link.as_mut().ok_or(BusError::NotConnected)?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match tokio::time::timeout_at(deadline, link.rx.recv()).await {
                Err(_) => return Ok(None),
                Ok(Ok(bus_frame)) => {
                    if bus_frame.origin != node || receive_own {
                        return Ok(Some(bus_frame.frame));
                    }
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!("{} lagged behind, {} frames skipped", self.name, skipped);
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(BusError::Receive("channel closed".to_string()));
                }
            }
        }
    }

    fn supports_fd(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_loopback_echo() {
        let bus = VirtualBus::new();
        let mut iface = bus.interface("a");
        iface.connect(CanConfig::loopback("vcan0")).await.unwrap();

        let frame = Frame::classic(0x321, vec![0xDE, 0xAD]);
        iface.send(&frame).await.unwrap();
        assert_eq!(iface.receive(WAIT).await.unwrap(), Some(frame));
        assert_eq!(iface.receive(WAIT).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_own_frames_filtered_without_loopback() {
        let bus = VirtualBus::new();
        let mut iface = bus.interface("a");
        let config = CanConfig {
            receive_own_frames: false,
            ..CanConfig::loopback("vcan0")
        };
        iface.connect(config).await.unwrap();

        iface.send(&Frame::classic(0x1, vec![])).await.unwrap();
        assert_eq!(iface.receive(WAIT).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_shared_channel_sees_peers() {
        let bus = VirtualBus::new();
        let mut a = bus.interface("a");
        let mut b = bus.interface("b");
        let mut c = bus.interface("c");
        a.connect(CanConfig::loopback("vcan0")).await.unwrap();
        b.connect(CanConfig::loopback("vcan0")).await.unwrap();
        c.connect(CanConfig::loopback("vcan1")).await.unwrap();

        let frame = Frame::classic(0x42, vec![0x01]);
        a.send(&frame).await.unwrap();

        assert_eq!(b.receive(WAIT).await.unwrap(), Some(frame.clone()));
        assert_eq!(a.receive(WAIT).await.unwrap(), Some(frame));
        assert_eq!(c.receive(WAIT).await.unwrap(), None);
        assert_eq!(bus.channel_count().await, 2);
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let bus = VirtualBus::new();
        let mut iface = bus.interface("a");
        assert!(matches!(
            iface.send(&Frame::classic(0x1, vec![])).await,
            Err(BusError::NotConnected)
        ));
    }
}

use async_trait::async_trait;
use crate::core::Frame;
use crate::hardware::can_interface::{BusError, CanConfig, CanInterface, CanResult, CanStatus};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Observations shared between a mock interface and the test that created it
#[derive(Debug, Default)]
pub struct MockHandle {
    sent: Mutex<Vec<Frame>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockHandle {
    /// Frames accepted by `send`, in order
    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

/// Mock CAN interface for testing without hardware
///
/// Echoes sent frames back when `receive_own_frames` is configured and can be
/// scripted to fail opening, fail individual sends, or swallow echoes.
pub struct MockCanInterface {
    name: String,
    status: CanStatus,
    config: Option<CanConfig>,
    rx_buffer: VecDeque<Frame>,
    handle: Arc<MockHandle>,
    send_counter: usize,
    echo_delay: Duration,
    fail_connect: bool,
    failing_sends: HashSet<usize>,
    silent_sends: HashSet<usize>,
    panicking_send: Option<usize>,
}

impl MockCanInterface {
    /// Create a new mock interface
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CanStatus::Disconnected,
            config: None,
            rx_buffer: VecDeque::new(),
            handle: Arc::new(MockHandle::default()),
            send_counter: 0,
            echo_delay: Duration::ZERO,
            fail_connect: false,
            failing_sends: HashSet::new(),
            silent_sends: HashSet::new(),
            panicking_send: None,
        }
    }

    /// Handle for inspecting the interface after it has been moved into a worker
    pub fn handle(&self) -> Arc<MockHandle> {
        self.handle.clone()
    }

    /// Delay applied before an echoed frame is handed out
    pub fn with_echo_delay(mut self, delay: Duration) -> Self {
        self.echo_delay = delay;
        self
    }

    /// Make `connect` fail
    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Make the n-th send attempt (0-based) fail
    pub fn failing_send(mut self, index: usize) -> Self {
        self.failing_sends.insert(index);
        self
    }

    /// Accept the n-th send attempt (0-based) but never echo it
    pub fn silent_send(mut self, index: usize) -> Self {
        self.silent_sends.insert(index);
        self
    }

    /// Panic inside the n-th send attempt (0-based)
    pub fn panicking_send(mut self, index: usize) -> Self {
        self.panicking_send = Some(index);
        self
    }

    /// Add a frame to the receive buffer (for testing)
    pub fn inject_frame(&mut self, frame: Frame) {
        self.rx_buffer.push_back(frame);
    }

    fn loopback(&self) -> bool {
        self.config.as_ref().map(|c| c.receive_own_frames).unwrap_or(false)
    }
}

#[async_trait]
impl CanInterface for MockCanInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> CanStatus {
        self.status
    }

    async fn connect(&mut self, config: CanConfig) -> CanResult<()> {
        if self.fail_connect {
            return Err(BusError::Open {
                channel: config.channel,
                reason: "mock refused to open".to_string(),
            });
        }
        self.config = Some(config);
        self.status = CanStatus::Connected;
        self.handle.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> CanResult<()> {
        if self.status == CanStatus::Connected {
            self.handle.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        self.status = CanStatus::Disconnected;
        self.config = None;
        self.rx_buffer.clear();
        Ok(())
    }

    async fn send(&mut self, frame: &Frame) -> CanResult<()> {
        if self.status != CanStatus::Connected {
            return Err(BusError::NotConnected);
        }

        let index = self.send_counter;
        self.send_counter += 1;
        if self.panicking_send == Some(index) {
            panic!("mock panicked on send #{}", index);
        }
        if self.failing_sends.contains(&index) {
            return Err(BusError::Send(format!("mock rejected send #{}", index)));
        }

        if let Ok(mut sent) = self.handle.sent.lock() {
            sent.push(frame.clone());
        }
        if self.loopback() && !self.silent_sends.contains(&index) {
            self.rx_buffer.push_back(frame.clone());
        }
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> CanResult<Option<Frame>> {
        if self.status != CanStatus::Connected {
            return Err(BusError::NotConnected);
        }

        match self.rx_buffer.pop_front() {
            Some(frame) => {
                if !self.echo_delay.is_zero() {
                    tokio::time::sleep(self.echo_delay.min(timeout)).await;
                }
                Ok(Some(frame))
            }
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
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

    #[tokio::test]
    async fn test_mock_interface_connect() {
        let mut iface = MockCanInterface::new("test");
        let handle = iface.handle();
        assert_eq!(iface.status(), CanStatus::Disconnected);

        iface.connect(CanConfig::loopback("mock0")).await.unwrap();
        assert_eq!(iface.status(), CanStatus::Connected);

        iface.disconnect().await.unwrap();
        assert_eq!(iface.status(), CanStatus::Disconnected);
        assert_eq!(handle.connects(), 1);
        assert_eq!(handle.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_mock_interface_echo() {
        let mut iface = MockCanInterface::new("test");
        iface.connect(CanConfig::loopback("mock0")).await.unwrap();

        let frame = Frame::classic(0x123, vec![1, 2, 3, 4]);
        iface.send(&frame).await.unwrap();

        let received = iface.receive(Duration::from_millis(10)).await.unwrap();
        assert_eq!(received, Some(frame));

        // Buffer should be empty now
        let received = iface.receive(Duration::from_millis(5)).await.unwrap();
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn test_mock_interface_without_loopback() {
        let mut iface = MockCanInterface::new("test");
        let config = CanConfig {
            receive_own_frames: false,
            ..CanConfig::loopback("mock0")
        };
        iface.connect(config).await.unwrap();

        iface.send(&Frame::classic(0x1, vec![])).await.unwrap();
        assert!(iface.receive(Duration::from_millis(5)).await.unwrap().is_none());

        iface.inject_frame(Frame::classic(0x2, vec![0xAA]));
        let received = iface.receive(Duration::from_millis(5)).await.unwrap();
        assert_eq!(received.map(|f| f.arbitration_id), Some(0x2));
    }

    #[tokio::test]
    async fn test_mock_interface_scripted_failures() {
        let mut iface = MockCanInterface::new("test").failing_send(0).silent_send(1);
        let handle = iface.handle();
        iface.connect(CanConfig::loopback("mock0")).await.unwrap();

        let frame = Frame::classic(0x10, vec![0x01]);
        assert!(matches!(iface.send(&frame).await, Err(BusError::Send(_))));
        iface.send(&frame).await.unwrap();
        assert!(iface.receive(Duration::from_millis(5)).await.unwrap().is_none());
        assert_eq!(handle.sent().len(), 1);

        let mut closed = MockCanInterface::new("closed").failing_connect();
        assert!(matches!(
            closed.connect(CanConfig::loopback("mock0")).await,
            Err(BusError::Open { .. })
        ));
    }
}

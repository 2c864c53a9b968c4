use crate::hardware::can_interface::CanInterface;
use crate::hardware::virtual_bus::VirtualBus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Type of CAN interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    /// SocketCAN (Linux)
    SocketCan,
    /// In-process virtual bus
    Virtual,
}

/// Creates one fresh, unconnected interface per worker
pub trait InterfaceFactory: Send + Sync {
    fn create(&self, tag: &str, channel: &str) -> Box<dyn CanInterface>;
}

impl<F> InterfaceFactory for F
where
    F: Fn(&str, &str) -> Box<dyn CanInterface> + Send + Sync,
{
    fn create(&self, tag: &str, channel: &str) -> Box<dyn CanInterface> {
        self(tag, channel)
    }
}

/// Concrete backend selected by configuration
#[derive(Clone)]
pub enum BusBackend {
    SocketCan,
    Virtual(Arc<VirtualBus>),
}

impl BusBackend {
    pub fn from_type(interface_type: InterfaceType) -> Self {
        match interface_type {
            InterfaceType::SocketCan => BusBackend::SocketCan,
            InterfaceType::Virtual => BusBackend::Virtual(VirtualBus::new()),
        }
    }

    pub fn interface_type(&self) -> InterfaceType {
        match self {
            BusBackend::SocketCan => InterfaceType::SocketCan,
            BusBackend::Virtual(_) => InterfaceType::Virtual,
        }
    }
}

impl InterfaceFactory for BusBackend {
    fn create(&self, tag: &str, channel: &str) -> Box<dyn CanInterface> {
        match self {
            BusBackend::Virtual(bus) => Box::new(bus.interface(&format!("{}@{}", tag, channel))),
            BusBackend::SocketCan => socketcan_interface(channel),
        }
    }
}

#[cfg(all(target_os = "linux", feature = "socketcan"))]
fn socketcan_interface(channel: &str) -> Box<dyn CanInterface> {
    Box::new(crate::hardware::socket_can::SocketCanInterface::new(channel))
}

#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
fn socketcan_interface(channel: &str) -> Box<dyn CanInterface> {
    Box::new(unsupported::UnsupportedInterface::new(channel))
}

#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
mod unsupported {
    use async_trait::async_trait;
    use crate::core::Frame;
    use crate::hardware::can_interface::{BusError, CanConfig, CanInterface, CanResult, CanStatus};
    use std::time::Duration;

    /// Stand-in returned when SocketCAN support is compiled out; refuses to open
    pub struct UnsupportedInterface {
        name: String,
    }

    impl UnsupportedInterface {
        pub fn new(name: &str) -> Self {
            Self { name: name.to_string() }
        }
    }

    #[async_trait]
    impl CanInterface for UnsupportedInterface {
        fn name(&self) -> &str {
            &self.name
        }

        fn status(&self) -> CanStatus {
            CanStatus::Disconnected
        }

        async fn connect(&mut self, _config: CanConfig) -> CanResult<()> {
            Err(BusError::Unsupported(
                "SocketCAN (rebuild with --features socketcan on Linux)".to_string(),
            ))
        }

        async fn disconnect(&mut self) -> CanResult<()> {
            Ok(())
        }

        async fn send(&mut self, _frame: &Frame) -> CanResult<()> {
            Err(BusError::NotConnected)
        }

        async fn receive(&mut self, _timeout: Duration) -> CanResult<Option<Frame>> {
            Err(BusError::NotConnected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::can_interface::{CanConfig, CanStatus};
    use crate::hardware::mock::MockCanInterface;

    #[tokio::test]
    async fn test_virtual_backend_creates_connected_nodes() {
        let backend = BusBackend::from_type(InterfaceType::Virtual);
        assert_eq!(backend.interface_type(), InterfaceType::Virtual);

        let mut iface = backend.create("w1", "vcan0");
        assert_eq!(iface.name(), "w1@vcan0");
        iface.connect(CanConfig::loopback("vcan0")).await.unwrap();
        assert_eq!(iface.status(), CanStatus::Connected);
    }

    #[test]
    fn test_closure_factory() {
        let factory = |tag: &str, _channel: &str| -> Box<dyn CanInterface> {
            Box::new(MockCanInterface::new(tag))
        };
        assert_eq!(factory.create("mock", "vcan0").name(), "mock");
    }

    #[test]
    fn test_interface_type_serde() {
        let parsed: InterfaceType = serde_json::from_str("\"socketcan\"").unwrap();
        assert_eq!(parsed, InterfaceType::SocketCan);
    }
}

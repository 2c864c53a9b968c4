pub mod backend;
pub mod can_interface;
pub mod mock;
#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socket_can;
pub mod virtual_bus;

pub use backend::{BusBackend, InterfaceFactory, InterfaceType};
pub use can_interface::{BusError, CanConfig, CanInterface, CanResult, CanStatus};
pub use mock::{MockCanInterface, MockHandle};
pub use virtual_bus::{VirtualBus, VirtualCanInterface};

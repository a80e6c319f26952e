//! USB backend seam
//!
//! The transport layer talks to the bus through these traits so that the
//! session lifecycle can be exercised against a scripted device in tests.
//! [`crate::usb::device`] implements them over rusb.

use protocol::{EndpointDescriptor, PeripheralIdentity};
use std::time::Duration;

/// Result type of raw backend calls
pub type UsbResult<T> = Result<T, rusb::Error>;

/// A USB bus that can be scanned for devices
pub trait UsbBus: Send + Sync + 'static {
    type Device: UsbDevice;

    /// Find the first attached device with exactly this identity
    ///
    /// `Ok(None)` means nothing matched. Errors are reserved for bus scan
    /// failures.
    fn find(&self, identity: PeripheralIdentity) -> UsbResult<Option<Self::Device>>;

    /// Summaries of every attached device
    fn list(&self) -> UsbResult<Vec<DeviceSummary>>;
}

/// An attached, not yet opened device
pub trait UsbDevice: Send {
    type Port: UsbPort;

    fn identity(&self) -> PeripheralIdentity;

    /// Interface tree of the first declared configuration
    fn first_configuration(&self) -> UsbResult<ConfigLayout>;

    /// Open an OS handle to the device; does not claim anything
    fn open(&self) -> UsbResult<Self::Port>;
}

/// An open OS handle to a device
///
/// Dropping the port disposes the OS handle.
pub trait UsbPort: Send {
    fn kernel_driver_active(&mut self, interface: u8) -> UsbResult<bool>;
    fn detach_kernel_driver(&mut self, interface: u8) -> UsbResult<()>;
    fn attach_kernel_driver(&mut self, interface: u8) -> UsbResult<()>;
    fn set_active_configuration(&mut self, config: u8) -> UsbResult<()>;
    fn claim_interface(&mut self, interface: u8) -> UsbResult<()>;
    fn release_interface(&mut self, interface: u8) -> UsbResult<()>;
    fn reset(&mut self) -> UsbResult<()>;

    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> UsbResult<usize>;
    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> UsbResult<usize>;
    fn read_interrupt(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> UsbResult<usize>;
    fn write_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> UsbResult<usize>;
}

/// First interface of the first configuration, as sessions see it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayout {
    /// bConfigurationValue to activate
    pub config_value: u8,
    /// Interface number of the first interface
    pub interface: u8,
    /// Endpoints of the interface's default alternate setting, in descriptor order
    pub endpoints: Vec<EndpointDescriptor>,
}

/// Listing entry for `--list-devices`
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub identity: PeripheralIdentity,
    pub bus_number: u8,
    pub device_address: u8,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

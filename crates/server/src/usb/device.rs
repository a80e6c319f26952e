//! rusb implementation of the USB backend
//!
//! Wraps a libusb context for bus scans, `rusb::Device` for attached devices
//! and `rusb::DeviceHandle` for open ports.

use crate::usb::backend::{ConfigLayout, DeviceSummary, UsbBus, UsbDevice, UsbPort, UsbResult};
use protocol::{EndpointDescriptor, PeripheralIdentity, TransferKind};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::{debug, trace};

/// Index of the configuration sessions operate on
const FIRST_CONFIGURATION: u8 = 0;

/// The host's USB bus, backed by a libusb context
pub struct RusbBus {
    context: Context,
}

impl RusbBus {
    pub fn new() -> UsbResult<Self> {
        Ok(Self {
            context: Context::new()?,
        })
    }
}

impl UsbBus for RusbBus {
    type Device = RusbDevice;

    fn find(&self, identity: PeripheralIdentity) -> UsbResult<Option<RusbDevice>> {
        for device in self.context.devices()?.iter() {
            // Devices that vanish mid-scan have no readable descriptor
            let Ok(descriptor) = device.device_descriptor() else {
                continue;
            };

            if descriptor.vendor_id() == identity.vendor_id
                && descriptor.product_id() == identity.product_id
            {
                debug!(
                    "Found {} at bus {:03} address {:03}",
                    identity,
                    device.bus_number(),
                    device.address()
                );
                return Ok(Some(RusbDevice { device, identity }));
            }
        }

        Ok(None)
    }

    fn list(&self) -> UsbResult<Vec<DeviceSummary>> {
        let mut summaries = Vec::new();

        for device in self.context.devices()?.iter() {
            let Ok(descriptor) = device.device_descriptor() else {
                continue;
            };

            let (manufacturer, product) = device
                .open()
                .ok()
                .map(|handle| read_strings(&handle, &descriptor))
                .unwrap_or((None, None));

            summaries.push(DeviceSummary {
                identity: PeripheralIdentity::new(descriptor.vendor_id(), descriptor.product_id()),
                bus_number: device.bus_number(),
                device_address: device.address(),
                manufacturer,
                product,
            });
        }

        Ok(summaries)
    }
}

/// Read manufacturer and product strings, if the device exposes them
fn read_strings(
    handle: &DeviceHandle<Context>,
    descriptor: &DeviceDescriptor,
) -> (Option<String>, Option<String>) {
    let manufacturer = descriptor
        .manufacturer_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    let product = descriptor
        .product_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    (manufacturer, product)
}

/// An attached device found by [`RusbBus::find`]
pub struct RusbDevice {
    device: Device<Context>,
    identity: PeripheralIdentity,
}

impl UsbDevice for RusbDevice {
    type Port = RusbPort;

    fn identity(&self) -> PeripheralIdentity {
        self.identity
    }

    fn first_configuration(&self) -> UsbResult<ConfigLayout> {
        let config = self.device.config_descriptor(FIRST_CONFIGURATION)?;

        let interface = config.interfaces().next().ok_or(rusb::Error::NotFound)?;
        let setting = interface
            .descriptors()
            .find(|d| d.setting_number() == 0)
            .ok_or(rusb::Error::NotFound)?;

        let endpoints = setting
            .endpoint_descriptors()
            .map(|ep| EndpointDescriptor::new(ep.address(), map_transfer_type(ep.transfer_type())))
            .collect();

        Ok(ConfigLayout {
            config_value: config.number(),
            interface: setting.interface_number(),
            endpoints,
        })
    }

    fn open(&self) -> UsbResult<RusbPort> {
        let handle = self.device.open()?;
        debug!("Opened device {}", self.identity);
        Ok(RusbPort {
            handle,
            identity: self.identity,
        })
    }
}

fn map_transfer_type(transfer_type: rusb::TransferType) -> TransferKind {
    match transfer_type {
        rusb::TransferType::Control => TransferKind::Control,
        rusb::TransferType::Isochronous => TransferKind::Isochronous,
        rusb::TransferType::Bulk => TransferKind::Bulk,
        rusb::TransferType::Interrupt => TransferKind::Interrupt,
    }
}

/// Open libusb handle; closed when dropped
pub struct RusbPort {
    handle: DeviceHandle<Context>,
    identity: PeripheralIdentity,
}

impl UsbPort for RusbPort {
    fn kernel_driver_active(&mut self, interface: u8) -> UsbResult<bool> {
        self.handle.kernel_driver_active(interface)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> UsbResult<()> {
        self.handle.detach_kernel_driver(interface)
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> UsbResult<()> {
        self.handle.attach_kernel_driver(interface)
    }

    fn set_active_configuration(&mut self, config: u8) -> UsbResult<()> {
        self.handle.set_active_configuration(config)
    }

    fn claim_interface(&mut self, interface: u8) -> UsbResult<()> {
        self.handle.claim_interface(interface)
    }

    fn release_interface(&mut self, interface: u8) -> UsbResult<()> {
        self.handle.release_interface(interface)
    }

    fn reset(&mut self) -> UsbResult<()> {
        self.handle.reset()
    }

    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> UsbResult<usize> {
        trace!("Bulk OUT {:#04x}: {} bytes", endpoint, data.len());
        self.handle.write_bulk(endpoint, data, timeout)
    }

    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> UsbResult<usize> {
        trace!("Bulk IN {:#04x}: up to {} bytes", endpoint, buf.len());
        self.handle.read_bulk(endpoint, buf, timeout)
    }

    fn read_interrupt(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> UsbResult<usize> {
        trace!("Interrupt IN {:#04x}: up to {} bytes", endpoint, buf.len());
        self.handle.read_interrupt(endpoint, buf, timeout)
    }

    fn write_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> UsbResult<usize> {
        trace!(
            "Control OUT: request_type={:#x}, request={:#x}, value={:#x}, index={:#x}, data_len={}",
            request_type,
            request,
            value,
            index,
            data.len()
        );
        self.handle
            .write_control(request_type, request, value, index, data, timeout)
    }
}

impl Drop for RusbPort {
    fn drop(&mut self) {
        debug!("Closed device {}", self.identity);
    }
}

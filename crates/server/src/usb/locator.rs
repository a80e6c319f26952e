//! Device locator
//!
//! Resolves a [`PeripheralIdentity`] to an attached device. Absence is a
//! normal outcome (`Ok(None)`), distinct from a failing bus scan.

use crate::usb::backend::{DeviceSummary, UsbBus};
use protocol::PeripheralIdentity;
use tracing::{debug, warn};

/// Failure to scan the bus at all
#[derive(Debug, Clone, thiserror::Error)]
#[error("USB bus scan failed: {0}")]
pub struct BusError(pub String);

/// Find the attached device with exactly this identity
///
/// Does not open or claim the device.
pub fn locate<B: UsbBus>(
    bus: &B,
    identity: PeripheralIdentity,
) -> Result<Option<B::Device>, BusError> {
    match bus.find(identity) {
        Ok(Some(device)) => Ok(Some(device)),
        Ok(None) => {
            debug!("No device matches {}", identity);
            Ok(None)
        }
        Err(e) => {
            warn!("Bus scan for {} failed: {}", identity, e);
            Err(BusError(e.to_string()))
        }
    }
}

/// Summaries of all attached devices, ordered by bus and address
pub fn list_devices<B: UsbBus>(bus: &B) -> Result<Vec<DeviceSummary>, BusError> {
    let mut devices = bus.list().map_err(|e| BusError(e.to_string()))?;
    devices.sort_by_key(|d| (d.bus_number, d.device_address));
    Ok(devices)
}

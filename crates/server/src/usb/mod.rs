//! USB subsystem
//!
//! Peripheral transport layer over USB:
//! - Device location by vendor/product id
//! - Device sessions (kernel driver detach, configuration, claim, endpoint
//!   resolution, guaranteed release)
//! - Per-identity claims serializing sessions
//! - Printer and scale transports
//!
//! All calls here are blocking. The HTTP layer runs them on the Tokio
//! blocking pool.

pub mod backend;
pub mod cancel;
pub mod claims;
pub mod device;
pub mod locator;
pub mod printer;
pub mod scale;
pub mod session;

#[cfg(test)]
pub mod mock;

pub use backend::{ConfigLayout, DeviceSummary, UsbBus, UsbDevice, UsbPort};
pub use cancel::CancelToken;
pub use claims::{ClaimGuard, ClaimRegistry};
pub use device::RusbBus;
pub use locator::{BusError, list_devices, locate};
pub use printer::{JobId, JobResult};
pub use scale::Ack;
pub use session::DeviceSession;

//! Peripheral server
//!
//! Drives a USB receipt printer and a USB postal scale on behalf of HTTP
//! clients. Each request opens its own device session, runs one operation
//! and releases the device again.

pub mod config;
pub mod error;
pub mod http;
pub mod service;
pub mod usb;

pub use error::{PeripheralError, PeripheralKind};
pub use service::{PeripheralService, PrintJob, PrinterStatus, ScaleOutcome};

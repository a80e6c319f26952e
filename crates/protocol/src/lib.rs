//! Device protocol library for peripheral-usb
//!
//! This crate defines the I/O-free part of the peripheral service: USB
//! identities and endpoint selection, the peripheral configuration record,
//! ESC/POS byte sequences and status decoding, the HID POS scale reports,
//! and the error taxonomy shared by the transport layer.
//!
//! # Example
//!
//! ```
//! use protocol::{PeripheralIdentity, StatusCondition, decode_status};
//!
//! let printer = PeripheralIdentity::from_hex("0x04b8", "0x0e15").unwrap();
//! assert_eq!(printer.to_string(), "04b8:0e15");
//!
//! assert_eq!(decode_status(0x18), StatusCondition::PaperEnd);
//! ```

pub mod error;
pub mod escpos;
pub mod scale;
pub mod types;

pub use error::{SessionError, TransportError, ValidationError};
pub use escpos::{StatusCondition, decode_status};
pub use scale::{ControlCommand, GRAMS_PER_OUNCE, ScaleCommand, ScaleReport, grams_to};
pub use types::{
    Direction, EndpointDescriptor, OperationKind, Orientation, PeripheralConfig,
    PeripheralIdentity, PrinterConfig, ScaleConfig, TransferKind, WeightReading, WeightUnit,
    format_hex_id, parse_hex_id, select_endpoint, validate_copies,
};

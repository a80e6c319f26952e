//! Peripheral and USB type definitions
//!
//! This module defines the identity, configuration and endpoint types shared
//! by the USB transport layer and the HTTP surface.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// USB identity of a peripheral (vendor id + product id)
///
/// Two devices with the same identity are treated as the same peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeripheralIdentity {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
}

impl PeripheralIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Build an identity from two hex strings such as `"0x04b8"` and `"0x0202"`
    pub fn from_hex(vendor_id: &str, product_id: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            vendor_id: parse_hex_id(vendor_id, "vendorId")?,
            product_id: parse_hex_id(product_id, "productId")?,
        })
    }

    /// Build an identity from an optional pair of hex strings
    ///
    /// Both missing means "not configured". One without the other is rejected.
    pub fn from_optional_hex(
        vendor_id: Option<&str>,
        product_id: Option<&str>,
    ) -> Result<Option<Self>, ValidationError> {
        match (vendor_id, product_id) {
            (None, None) => Ok(None),
            (Some(vid), Some(pid)) => Self::from_hex(vid, pid).map(Some),
            (Some(_), None) => Err(ValidationError::MissingField("productId")),
            (None, Some(_)) => Err(ValidationError::MissingField("vendorId")),
        }
    }
}

impl fmt::Display for PeripheralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Parse a `0x`-prefixed hexadecimal USB id into a 16-bit value
///
/// `field` names the id in the error message (e.g. "vendorId").
pub fn parse_hex_id(id: &str, field: &'static str) -> Result<u16, ValidationError> {
    let invalid = || ValidationError::InvalidHexId {
        field,
        value: id.to_string(),
    };

    let hex_part = id
        .trim()
        .strip_prefix("0x")
        .or_else(|| id.trim().strip_prefix("0X"))
        .ok_or_else(invalid)?;

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(invalid());
    }

    u16::from_str_radix(hex_part, 16).map_err(|_| invalid())
}

/// Format a USB id the way it is accepted by [`parse_hex_id`]
pub fn format_hex_id(id: u16) -> String {
    format!("0x{:04x}", id)
}

/// Endpoint direction, seen from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device to host
    In,
    /// Host to device
    Out,
}

impl Direction {
    /// Direction encoded in bit 7 of an endpoint address
    pub fn from_address(address: u8) -> Self {
        if address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// USB transfer type of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// One endpoint of the interface a session operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// Endpoint address (includes direction bit)
    pub address: u8,
    pub direction: Direction,
    pub transfer_kind: TransferKind,
}

impl EndpointDescriptor {
    pub fn new(address: u8, transfer_kind: TransferKind) -> Self {
        Self {
            address,
            direction: Direction::from_address(address),
            transfer_kind,
        }
    }

    fn matches(&self, direction: Direction, kinds: &[TransferKind]) -> bool {
        self.direction == direction && kinds.contains(&self.transfer_kind)
    }
}

/// Select the first endpoint matching a direction and one of the transfer kinds
///
/// Endpoints are scanned in descriptor order and the first match wins. There
/// is no ranking between kinds: for a scale that exposes both a bulk IN and an
/// interrupt IN endpoint, whichever the descriptor lists first is used. Ports
/// to other USB stacks must keep this rule to stay behaviorally identical.
pub fn select_endpoint(
    endpoints: &[EndpointDescriptor],
    direction: Direction,
    kinds: &[TransferKind],
) -> Option<EndpointDescriptor> {
    endpoints
        .iter()
        .copied()
        .find(|ep| ep.matches(direction, kinds))
}

/// What a device session is opened for
///
/// Decides which endpoints must be resolved before the session is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Printer writes: bulk OUT
    Print,
    /// Printer real-time status: bulk OUT for the query, bulk IN for the answer
    PrinterStatus,
    /// Scale reads: interrupt or bulk IN
    Scale,
}

impl OperationKind {
    /// Requirement for the outgoing endpoint, if any
    pub fn out_requirement(self) -> Option<&'static [TransferKind]> {
        match self {
            OperationKind::Print | OperationKind::PrinterStatus => Some(&[TransferKind::Bulk]),
            OperationKind::Scale => None,
        }
    }

    /// Requirement for the incoming endpoint, if any
    pub fn in_requirement(self) -> Option<&'static [TransferKind]> {
        match self {
            OperationKind::Print => None,
            OperationKind::PrinterStatus => Some(&[TransferKind::Bulk]),
            OperationKind::Scale => Some(&[TransferKind::Interrupt, TransferKind::Bulk]),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Print => write!(f, "print"),
            OperationKind::PrinterStatus => write!(f, "printer status"),
            OperationKind::Scale => write!(f, "scale"),
        }
    }
}

/// Print orientation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl FromStr for Orientation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            _ => Err(ValidationError::UnknownOrientation(s.to_string())),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Landscape => write!(f, "landscape"),
        }
    }
}

/// Weight unit reported to clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Grams,
    Ounces,
}

impl FromStr for WeightUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "grams" => Ok(WeightUnit::Grams),
            "ounces" => Ok(WeightUnit::Ounces),
            _ => Err(ValidationError::UnknownUnit(s.to_string())),
        }
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightUnit::Grams => write!(f, "grams"),
            WeightUnit::Ounces => write!(f, "ounces"),
        }
    }
}

/// One weight measurement, already in the configured unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightReading {
    pub value: f64,
    pub unit: WeightUnit,
}

/// Printer part of the peripheral configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterConfig {
    /// Bound printer, `None` until configured
    pub identity: Option<PeripheralIdentity>,
    /// Paper/printer type label (e.g. "80mm")
    pub paper: String,
    /// Default copies per job (always >= 1)
    pub copies: u32,
    pub orientation: Orientation,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            identity: None,
            paper: "80mm".to_string(),
            copies: 1,
            orientation: Orientation::Portrait,
        }
    }
}

/// Scale part of the peripheral configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScaleConfig {
    /// Bound scale, `None` until configured
    pub identity: Option<PeripheralIdentity>,
    pub unit: WeightUnit,
}

/// Currently bound peripherals and their preferences
///
/// Replaced as a whole; readers always see a complete record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeripheralConfig {
    pub printer: PrinterConfig,
    pub scale: ScaleConfig,
}

/// Check that a copy count is positive
pub fn validate_copies(copies: u32) -> Result<u32, ValidationError> {
    if copies == 0 {
        Err(ValidationError::InvalidCopies(copies))
    } else {
        Ok(copies)
    }
}

//! HID Point-of-Sale scale protocol
//!
//! Postal scales enumerate as HID devices and stream a Scale Data Report on
//! their IN endpoint:
//!
//! ```text
//! byte 0: report id (0x03)
//! byte 1: status
//! byte 2: unit
//! byte 3: exponent (signed, base 10)
//! byte 4-5: weight, little endian
//! ```
//!
//! Zeroing is done with the Scale Control Report (id 0x02) sent as a HID
//! SET_REPORT request.

use crate::error::{TransportError, ValidationError};
use crate::types::{WeightUnit, WeightReading};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

/// Grams per ounce
pub const GRAMS_PER_OUNCE: f64 = 28.35;

/// Report id of the Scale Data Report
pub const DATA_REPORT_ID: u8 = 0x03;

/// Length of the Scale Data Report
pub const DATA_REPORT_LEN: usize = 6;

/// Report id of the Scale Control Report
pub const CONTROL_REPORT_ID: u8 = 0x02;

/// bmRequestType for a class request to an interface, host to device
pub const HID_SET_REPORT_REQUEST_TYPE: u8 = 0x21;

/// HID class request SET_REPORT
pub const HID_SET_REPORT: u8 = 0x09;

/// HID report type "output" in the high byte of wValue
const HID_OUTPUT_REPORT: u16 = 0x02;

/// Control report flag: enforced zero return
const CONTROL_ENFORCED_ZERO_RETURN: u8 = 0x01;

/// Control report flag: zero scale
const CONTROL_ZERO_SCALE: u8 = 0x02;

/// Convert a weight in grams to the requested unit
pub fn grams_to(grams: f64, unit: WeightUnit) -> f64 {
    match unit {
        WeightUnit::Grams => grams,
        WeightUnit::Ounces => grams / GRAMS_PER_OUNCE,
    }
}

/// Scale status byte of a data report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleStatus {
    Fault,
    StableAtZero,
    InMotion,
    Stable,
    UnderZero,
    OverWeight,
    RequiresCalibration,
    RequiresRezeroing,
    Other(u8),
}

impl From<u8> for ScaleStatus {
    fn from(value: u8) -> Self {
        match value {
            0x01 => ScaleStatus::Fault,
            0x02 => ScaleStatus::StableAtZero,
            0x03 => ScaleStatus::InMotion,
            0x04 => ScaleStatus::Stable,
            0x05 => ScaleStatus::UnderZero,
            0x06 => ScaleStatus::OverWeight,
            0x07 => ScaleStatus::RequiresCalibration,
            0x08 => ScaleStatus::RequiresRezeroing,
            other => ScaleStatus::Other(other),
        }
    }
}

/// Weight unit codes from the HID POS usage table
fn unit_to_grams(code: u8) -> Option<f64> {
    match code {
        0x01 => Some(0.001), // milligram
        0x02 => Some(1.0),   // gram
        0x03 => Some(1000.0), // kilogram
        0x0b => Some(GRAMS_PER_OUNCE), // ounce
        0x0c => Some(GRAMS_PER_OUNCE * 16.0), // pound
        _ => None,
    }
}

/// Decoded Scale Data Report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleReport {
    pub status: ScaleStatus,
    pub unit_code: u8,
    pub exponent: i8,
    pub raw_weight: u16,
}

impl ScaleReport {
    /// Parse a data report as read from the IN endpoint
    pub fn parse(data: &[u8]) -> Result<Self, TransportError> {
        if data.len() < DATA_REPORT_LEN {
            return Err(TransportError::Decode(format!(
                "scale report too short: {} bytes (need {})",
                data.len(),
                DATA_REPORT_LEN
            )));
        }

        let mut cursor = Cursor::new(data);
        let read_err = |e: std::io::Error| TransportError::Decode(e.to_string());

        let report_id = cursor.read_u8().map_err(read_err)?;
        if report_id != DATA_REPORT_ID {
            return Err(TransportError::Decode(format!(
                "unexpected report id {:#04x}",
                report_id
            )));
        }

        let status = ScaleStatus::from(cursor.read_u8().map_err(read_err)?);
        let unit_code = cursor.read_u8().map_err(read_err)?;
        let exponent = cursor.read_i8().map_err(read_err)?;
        let raw_weight = cursor.read_u16::<LittleEndian>().map_err(read_err)?;

        Ok(Self {
            status,
            unit_code,
            exponent,
            raw_weight,
        })
    }

    /// Weight in grams
    ///
    /// Fault-like statuses are errors; under zero gives a negative weight.
    pub fn grams(&self) -> Result<f64, TransportError> {
        match self.status {
            ScaleStatus::Fault
            | ScaleStatus::OverWeight
            | ScaleStatus::RequiresCalibration
            | ScaleStatus::RequiresRezeroing => {
                return Err(TransportError::Decode(format!(
                    "scale reports {:?}",
                    self.status
                )));
            }
            ScaleStatus::StableAtZero => return Ok(0.0),
            _ => {}
        }

        let factor = unit_to_grams(self.unit_code).ok_or_else(|| {
            TransportError::Decode(format!("unknown weight unit {:#04x}", self.unit_code))
        })?;

        let magnitude = f64::from(self.raw_weight) * 10f64.powi(i32::from(self.exponent)) * factor;

        if self.status == ScaleStatus::UnderZero {
            Ok(-magnitude)
        } else {
            Ok(magnitude)
        }
    }

    /// Weight converted to the requested unit
    pub fn reading(&self, unit: WeightUnit) -> Result<WeightReading, TransportError> {
        Ok(WeightReading {
            value: grams_to(self.grams()?, unit),
            unit,
        })
    }
}

/// Command accepted by the scale endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleCommand {
    /// Read the current weight
    Weigh,
    Tare,
    Reset,
}

impl FromStr for ScaleCommand {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scale" => Ok(ScaleCommand::Weigh),
            "tare" => Ok(ScaleCommand::Tare),
            "reset" => Ok(ScaleCommand::Reset),
            _ => Err(ValidationError::UnknownCommand(s.to_string())),
        }
    }
}

impl fmt::Display for ScaleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleCommand::Weigh => write!(f, "scale"),
            ScaleCommand::Tare => write!(f, "tare"),
            ScaleCommand::Reset => write!(f, "reset"),
        }
    }
}

/// Zeroing command issued through the control report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Tare,
    Reset,
}

impl ControlCommand {
    /// Map a scale command to a control command; weighing has none
    pub fn from_command(command: ScaleCommand) -> Option<Self> {
        match command {
            ScaleCommand::Weigh => None,
            ScaleCommand::Tare => Some(ControlCommand::Tare),
            ScaleCommand::Reset => Some(ControlCommand::Reset),
        }
    }

    /// Scale Control Report payload
    pub fn report(self) -> [u8; 2] {
        let flags = match self {
            ControlCommand::Tare => CONTROL_ZERO_SCALE,
            ControlCommand::Reset => CONTROL_ENFORCED_ZERO_RETURN,
        };
        [CONTROL_REPORT_ID, flags]
    }

    /// wValue of the SET_REPORT request
    pub fn report_value() -> u16 {
        (HID_OUTPUT_REPORT << 8) | u16::from(CONTROL_REPORT_ID)
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::Tare => write!(f, "tare"),
            ControlCommand::Reset => write!(f, "reset"),
        }
    }
}

//! Peripheral error types
//!
//! Errors are split by the stage at which they happen so callers can branch
//! on the kind instead of inspecting message text:
//! - [`ValidationError`]: rejected before any USB I/O
//! - [`SessionError`]: a device session could not be opened
//! - [`TransportError`]: an exchange failed on an open session

use crate::types::{Direction, OperationKind};
use thiserror::Error;

/// Malformed input, detected before touching the device
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid {field} '{value}', expected 0x-prefixed hex of 1-4 digits (e.g. '0x1234')")]
    InvalidHexId { field: &'static str, value: String },

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid copies {0}, must be at least 1")]
    InvalidCopies(u32),

    #[error("Unknown orientation '{0}', expected portrait or landscape")]
    UnknownOrientation(String),

    #[error("Unknown unit '{0}', expected grams or ounces")]
    UnknownUnit(String),

    #[error("Invalid scale command '{0}'")]
    UnknownCommand(String),
}

/// Failure while opening a device session
///
/// A session that fails to open never reaches any transfer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("Failed to open device: {message}")]
    Open { message: String },

    #[error("Failed to read configuration descriptor: {message}")]
    Descriptor { message: String },

    #[error("Device declares no configuration with interfaces")]
    NoInterface,

    #[error("Failed to detach kernel driver from interface {interface}: {message}")]
    DetachKernelDriver { interface: u8, message: String },

    #[error("Failed to set configuration {config}: {message}")]
    SetConfiguration { config: u8, message: String },

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterface { interface: u8, message: String },

    #[error("No {direction:?} endpoint suitable for {operation} on interface {interface}")]
    EndpointNotFound {
        operation: OperationKind,
        direction: Direction,
        interface: u8,
    },
}

/// Failure of an exchange on an open session
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("Transfer on endpoint {endpoint:#04x} failed: {message}")]
    Io { endpoint: u8, message: String },

    #[error("Short write on endpoint {endpoint:#04x}: {written} of {expected} bytes")]
    ShortWrite {
        endpoint: u8,
        written: usize,
        expected: usize,
    },

    #[error("Session has no {0:?} endpoint")]
    MissingEndpoint(Direction),

    #[error("Control transfer failed: {message}")]
    Control { message: String },

    #[error("Failed to decode device response: {0}")]
    Decode(String),

    #[error("Print aborted after {completed} of {requested} copies: {source}")]
    PrintAborted {
        completed: u32,
        requested: u32,
        #[source]
        source: Box<TransportError>,
    },

    #[error("Cancelled after {completed} completed step(s)")]
    Cancelled { completed: u32 },
}

impl TransportError {
    /// Number of copies that completed before a print job stopped
    pub fn copies_completed(&self) -> Option<u32> {
        match self {
            TransportError::PrintAborted { completed, .. } => Some(*completed),
            TransportError::Cancelled { completed } => Some(*completed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_aborted_display() {
        let err = TransportError::PrintAborted {
            completed: 2,
            requested: 5,
            source: Box::new(TransportError::ShortWrite {
                endpoint: 0x01,
                written: 3,
                expected: 10,
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("2 of 5"));
        assert!(msg.contains("Short write"));
        assert_eq!(err.copies_completed(), Some(2));
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::DetachKernelDriver {
            interface: 0,
            message: "Access denied".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("detach kernel driver"));
        assert!(msg.contains("Access denied"));
    }

    #[test]
    fn test_endpoint_error_display() {
        let err = SessionError::EndpointNotFound {
            operation: OperationKind::Scale,
            direction: Direction::In,
            interface: 0,
        };
        assert!(err.to_string().contains("scale"));
    }
}

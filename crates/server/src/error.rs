//! Server error types

use crate::usb::BusError;
use protocol::{PeripheralIdentity, SessionError, TransportError, ValidationError};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which peripheral an error is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralKind {
    Printer,
    Scale,
}

impl fmt::Display for PeripheralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeripheralKind::Printer => write!(f, "printer"),
            PeripheralKind::Scale => write!(f, "scale"),
        }
    }
}

/// Everything a peripheral operation can fail with
#[derive(Debug, Error)]
pub enum PeripheralError {
    #[error("USB {kind} not found.")]
    NotFound {
        kind: PeripheralKind,
        identity: PeripheralIdentity,
    },

    #[error("{} not configured.", capitalize(.0))]
    NotConfigured(PeripheralKind),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("USB worker failed: {0}")]
    Worker(String),
}

impl PeripheralError {
    /// Whether the caller is at fault (bad input, absent or unbound device)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PeripheralError::NotFound { .. }
                | PeripheralError::NotConfigured(_)
                | PeripheralError::Validation(_)
        )
    }
}

fn capitalize(kind: &PeripheralKind) -> String {
    let name = kind.to_string();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name,
    }
}

//! Common utilities for peripheral-usb
//!
//! This crate provides shared functionality for the peripheral server:
//! logging setup, the common error type, and the versioned configuration
//! store consulted at the start of every peripheral operation.

pub mod config_store;
pub mod error;
pub mod logging;

pub use config_store::{ConfigSnapshot, ConfigStore};
pub use error::{Error, Result};
pub use logging::setup_logging;

//! Scale transport
//!
//! Reads Scale Data Reports from a HID postal scale and issues zeroing
//! commands through the Scale Control Report.

use crate::usb::backend::UsbPort;
use crate::usb::session::DeviceSession;
use protocol::scale::{HID_SET_REPORT, HID_SET_REPORT_REQUEST_TYPE};
use protocol::{ControlCommand, ScaleReport, TransportError, WeightReading, WeightUnit};
use tracing::{debug, info};

/// Acknowledgment of a completed scale command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub command: ControlCommand,
}

/// Read the current weight, converted to `unit`
pub fn read<P: UsbPort>(
    session: &mut DeviceSession<P>,
    unit: WeightUnit,
) -> Result<WeightReading, TransportError> {
    // Reports are 6 bytes; some scales pad to their max packet size
    let mut buf = [0u8; 64];
    let len = session.read_in(&mut buf)?;

    let report = ScaleReport::parse(&buf[..len])?;
    debug!("Scale report from {}: {:?}", session.identity(), report);

    report.reading(unit)
}

/// Send a zeroing command and wait for the control transfer to complete
pub fn command<P: UsbPort>(
    session: &mut DeviceSession<P>,
    command: ControlCommand,
) -> Result<Ack, TransportError> {
    let report = command.report();

    let written = session.control_out(
        HID_SET_REPORT_REQUEST_TYPE,
        HID_SET_REPORT,
        ControlCommand::report_value(),
        &report,
    )?;

    if written != report.len() {
        return Err(TransportError::Control {
            message: format!("{} of {} report bytes accepted", written, report.len()),
        });
    }

    info!("Scale {} on {} acknowledged", command, session.identity());
    Ok(Ack { command })
}

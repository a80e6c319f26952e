//! Peripheral service
//!
//! Orchestrates one peripheral operation end to end: snapshot the
//! configuration, take the identity's claim, locate the device, open a
//! session, run the transport, close the session, drop the claim. All
//! methods block and are meant to run on a blocking thread.

use crate::error::{PeripheralError, PeripheralKind};
use crate::usb::{
    self, Ack, BusError, CancelToken, ClaimRegistry, DeviceSession, DeviceSummary, JobResult,
    UsbBus, UsbDevice,
};
use common::ConfigStore;
use protocol::{
    ControlCommand, OperationKind, Orientation, PeripheralConfig, PeripheralIdentity,
    ScaleCommand, StatusCondition, TransportError, WeightReading, decode_status, validate_copies,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Print job as requested by a client
#[derive(Debug, Clone, Default)]
pub struct PrintJob {
    pub content: String,
    /// Falls back to the configured copies
    pub copies: Option<u32>,
    /// Falls back to the configured orientation
    pub orientation: Option<Orientation>,
    /// Falls back to the configured paper type
    pub printer_type: Option<String>,
}

/// Result of a scale request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleOutcome {
    Weight(WeightReading),
    Acknowledged(Ack),
}

/// Printer condition as shown by the status endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct PrinterStatus {
    pub printer_type: String,
    pub condition: StatusCondition,
    /// Why the condition is unknown, if it is
    pub error: Option<String>,
}

pub struct PeripheralService<B: UsbBus> {
    bus: B,
    config: Arc<ConfigStore>,
    claims: ClaimRegistry,
    transfer_timeout: Duration,
}

impl<B: UsbBus> PeripheralService<B> {
    pub fn new(bus: B, config: Arc<ConfigStore>, transfer_timeout: Duration) -> Self {
        Self {
            bus,
            config,
            claims: ClaimRegistry::new(),
            transfer_timeout,
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn claims(&self) -> &ClaimRegistry {
        &self.claims
    }

    /// Replace the configuration once the bound scale is known to be attached
    ///
    /// Nothing changes if validation or the scale lookup fails.
    pub fn configure(&self, new: PeripheralConfig) -> Result<u64, PeripheralError> {
        validate_copies(new.printer.copies)?;

        if let Some(identity) = new.scale.identity {
            if usb::locate(&self.bus, identity)?.is_none() {
                warn!("Rejecting configuration: scale {} not attached", identity);
                return Err(PeripheralError::NotFound {
                    kind: PeripheralKind::Scale,
                    identity,
                });
            }
        }

        Ok(self.config.replace(new))
    }

    /// Print a job on the configured printer
    pub fn print(&self, job: PrintJob, cancel: &CancelToken) -> Result<JobResult, PeripheralError> {
        let snapshot = self.config.get();
        let printer = &snapshot.config.printer;

        let identity = printer
            .identity
            .ok_or(PeripheralError::NotConfigured(PeripheralKind::Printer))?;
        let copies = validate_copies(job.copies.unwrap_or(printer.copies))?;
        let orientation = job.orientation.unwrap_or(printer.orientation);
        let printer_type = job.printer_type.as_deref().unwrap_or(&printer.paper);

        debug!(
            "Print request: {} copies, {} on {} paper (config v{})",
            copies, orientation, printer_type, snapshot.version
        );

        self.with_session(
            PeripheralKind::Printer,
            identity,
            OperationKind::Print,
            cancel,
            |session| usb::printer::print(session, &job.content, copies, cancel),
        )
    }

    /// Current printer condition; every failure reads as `Unknown`
    pub fn printer_status(&self, cancel: &CancelToken) -> PrinterStatus {
        let snapshot = self.config.get();
        let printer = &snapshot.config.printer;

        let condition = match printer.identity {
            None => Err(PeripheralError::NotConfigured(PeripheralKind::Printer)),
            Some(identity) => self
                .with_session(
                    PeripheralKind::Printer,
                    identity,
                    OperationKind::PrinterStatus,
                    cancel,
                    usb::printer::query_status,
                )
                .map(|raw| decode_status(u32::from(raw))),
        };

        match condition {
            Ok(condition) => PrinterStatus {
                printer_type: printer.paper.clone(),
                condition,
                error: None,
            },
            Err(e) => {
                debug!("Printer status unknown: {}", e);
                PrinterStatus {
                    printer_type: printer.paper.clone(),
                    condition: StatusCondition::Unknown,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Run a scale command given by name ("scale", "tare" or "reset")
    ///
    /// Unknown names are rejected before the bus is touched.
    pub fn scale(
        &self,
        command: &str,
        cancel: &CancelToken,
    ) -> Result<ScaleOutcome, PeripheralError> {
        let command: ScaleCommand = command.parse()?;

        let snapshot = self.config.get();
        let scale = &snapshot.config.scale;
        let identity = scale
            .identity
            .ok_or(PeripheralError::NotConfigured(PeripheralKind::Scale))?;
        let unit = scale.unit;

        self.with_session(
            PeripheralKind::Scale,
            identity,
            OperationKind::Scale,
            cancel,
            |session| match ControlCommand::from_command(command) {
                None => usb::scale::read(session, unit).map(ScaleOutcome::Weight),
                Some(control) => {
                    usb::scale::command(session, control).map(ScaleOutcome::Acknowledged)
                }
            },
        )
    }

    /// Attached USB devices
    pub fn list_devices(&self) -> Result<Vec<DeviceSummary>, BusError> {
        usb::list_devices(&self.bus)
    }

    /// Run `op` inside a session on `identity`
    ///
    /// The claim is taken before locating the device and dropped only after
    /// the session has released the device, on success and failure alike. A
    /// request cancelled while it waited for the claim never touches the device.
    fn with_session<T, F>(
        &self,
        kind: PeripheralKind,
        identity: PeripheralIdentity,
        operation: OperationKind,
        cancel: &CancelToken,
        op: F,
    ) -> Result<T, PeripheralError>
    where
        F: FnOnce(&mut DeviceSession<<B::Device as UsbDevice>::Port>) -> Result<T, TransportError>,
    {
        let _claim = self.claims.acquire(identity);

        if cancel.is_cancelled() {
            debug!("{} on {} cancelled before opening the device", operation, identity);
            return Err(TransportError::Cancelled { completed: 0 }.into());
        }

        let Some(device) = usb::locate(&self.bus, identity)? else {
            warn!("USB {} {} not attached", kind, identity);
            return Err(PeripheralError::NotFound { kind, identity });
        };

        let mut session = DeviceSession::open(&device, operation, self.transfer_timeout)?;
        let result = op(&mut session);
        session.close();

        if let Err(e) = &result {
            warn!("{} on {} failed: {}", operation, identity, e);
        } else {
            info!("{} on {} completed", operation, identity);
        }

        result.map_err(PeripheralError::from)
    }
}

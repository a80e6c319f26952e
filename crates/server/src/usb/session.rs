//! Device session lifecycle
//!
//! A [`DeviceSession`] is the scoped ownership of one claimed device. Opening
//! runs, in order:
//! 1. detach the kernel driver from the first interface, if one is bound
//! 2. activate the first declared configuration
//! 3. claim the first interface
//! 4. resolve the endpoints the operation needs
//!
//! The release routine undoes whatever was taken (release interface,
//! reattach the kernel driver, reset) and drops the OS handle. It runs
//! exactly once: from [`DeviceSession::close`], or from `Drop` when opening
//! fails halfway, a transfer fails, or the caller unwinds.

use crate::usb::backend::{UsbDevice, UsbPort};
use protocol::{
    Direction, EndpointDescriptor, OperationKind, PeripheralIdentity, SessionError,
    TransferKind, TransportError, select_endpoint,
};
use std::time::Duration;
use tracing::{debug, warn};

/// Open session on one device
pub struct DeviceSession<P: UsbPort> {
    /// `None` once released
    port: Option<P>,
    identity: PeripheralIdentity,
    interface: u8,
    /// Kernel driver was detached by us and must be reattached
    detached_driver: bool,
    claimed: bool,
    out_endpoint: Option<EndpointDescriptor>,
    in_endpoint: Option<EndpointDescriptor>,
    timeout: Duration,
}

impl<P: UsbPort> DeviceSession<P> {
    /// Open a session on `device` for `operation`
    ///
    /// `timeout` applies to every transfer made through the session.
    pub fn open<D>(
        device: &D,
        operation: OperationKind,
        timeout: Duration,
    ) -> Result<Self, SessionError>
    where
        D: UsbDevice<Port = P>,
    {
        let identity = device.identity();

        let layout = device
            .first_configuration()
            .map_err(|e| match e {
                rusb::Error::NotFound => SessionError::NoInterface,
                other => SessionError::Descriptor {
                    message: other.to_string(),
                },
            })?;

        let port = device.open().map_err(|e| {
            warn!("Failed to open {}: {}", identity, e);
            SessionError::Open {
                message: e.to_string(),
            }
        })?;

        // From here on, an early return drops `session` and releases
        // whatever has been taken so far.
        let mut session = Self {
            port: Some(port),
            identity,
            interface: layout.interface,
            detached_driver: false,
            claimed: false,
            out_endpoint: None,
            in_endpoint: None,
            timeout,
        };

        session.detach_kernel_driver()?;
        session.set_configuration(layout.config_value)?;
        session.claim_interface()?;

        session.out_endpoint = resolve(
            &layout.endpoints,
            operation,
            Direction::Out,
            operation.out_requirement(),
            layout.interface,
        )?;
        session.in_endpoint = resolve(
            &layout.endpoints,
            operation,
            Direction::In,
            operation.in_requirement(),
            layout.interface,
        )?;

        debug!(
            "Session open on {} for {} (interface {}, out={:?}, in={:?})",
            identity,
            operation,
            layout.interface,
            session.out_endpoint.map(|ep| ep.address),
            session.in_endpoint.map(|ep| ep.address)
        );

        Ok(session)
    }

    pub fn identity(&self) -> PeripheralIdentity {
        self.identity
    }

    pub fn interface(&self) -> u8 {
        self.interface
    }

    pub fn out_endpoint(&self) -> Option<EndpointDescriptor> {
        self.out_endpoint
    }

    pub fn in_endpoint(&self) -> Option<EndpointDescriptor> {
        self.in_endpoint
    }

    /// Write all of `data` to the OUT endpoint
    ///
    /// A write that transfers fewer bytes than requested is an error.
    pub fn write_out(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let endpoint = self
            .out_endpoint
            .ok_or(TransportError::MissingEndpoint(Direction::Out))?;
        let timeout = self.timeout;

        let written = self
            .port_mut()?
            .write_bulk(endpoint.address, data, timeout)
            .map_err(|e| TransportError::Io {
                endpoint: endpoint.address,
                message: e.to_string(),
            })?;

        if written != data.len() {
            return Err(TransportError::ShortWrite {
                endpoint: endpoint.address,
                written,
                expected: data.len(),
            });
        }

        Ok(())
    }

    /// Read one transfer from the IN endpoint into `buf`
    pub fn read_in(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let endpoint = self
            .in_endpoint
            .ok_or(TransportError::MissingEndpoint(Direction::In))?;
        let timeout = self.timeout;
        let port = self.port_mut()?;

        let result = match endpoint.transfer_kind {
            TransferKind::Interrupt => port.read_interrupt(endpoint.address, buf, timeout),
            _ => port.read_bulk(endpoint.address, buf, timeout),
        };

        result.map_err(|e| TransportError::Io {
            endpoint: endpoint.address,
            message: e.to_string(),
        })
    }

    /// Class request to the session's interface (host to device)
    pub fn control_out(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        data: &[u8],
    ) -> Result<usize, TransportError> {
        let index = u16::from(self.interface);
        let timeout = self.timeout;

        self.port_mut()?
            .write_control(request_type, request, value, index, data, timeout)
            .map_err(|e| TransportError::Control {
                message: e.to_string(),
            })
    }

    /// Close the session, releasing the device
    pub fn close(mut self) {
        self.release();
    }

    fn port_mut(&mut self) -> Result<&mut P, TransportError> {
        // Only reachable after release, which consumes the session
        self.port.as_mut().ok_or_else(|| TransportError::Io {
            endpoint: 0,
            message: "session already closed".to_string(),
        })
    }

    fn detach_kernel_driver(&mut self) -> Result<(), SessionError> {
        let interface = self.interface;
        let Some(port) = self.port.as_mut() else {
            return Ok(());
        };

        let active = match port.kernel_driver_active(interface) {
            Ok(active) => active,
            // Platforms without kernel drivers to detach
            Err(rusb::Error::NotSupported) => false,
            Err(e) => {
                return Err(SessionError::DetachKernelDriver {
                    interface,
                    message: format!("could not query kernel driver: {}", e),
                });
            }
        };

        if !active {
            debug!("No kernel driver active on interface {}", interface);
            return Ok(());
        }

        debug!(
            "Detaching kernel driver from interface {} on {}",
            interface, self.identity
        );
        port.detach_kernel_driver(interface)
            .map_err(|e| SessionError::DetachKernelDriver {
                interface,
                message: e.to_string(),
            })?;
        self.detached_driver = true;

        Ok(())
    }

    fn set_configuration(&mut self, config: u8) -> Result<(), SessionError> {
        let Some(port) = self.port.as_mut() else {
            return Ok(());
        };

        port.set_active_configuration(config)
            .map_err(|e| SessionError::SetConfiguration {
                config,
                message: e.to_string(),
            })
    }

    fn claim_interface(&mut self) -> Result<(), SessionError> {
        let interface = self.interface;
        let Some(port) = self.port.as_mut() else {
            return Ok(());
        };

        port.claim_interface(interface)
            .map_err(|e| SessionError::ClaimInterface {
                interface,
                message: e.to_string(),
            })?;
        self.claimed = true;
        debug!("Claimed interface {} on {}", interface, self.identity);

        Ok(())
    }

    /// Undo every claim and dispose the OS handle
    ///
    /// Each step is attempted even if an earlier one failed.
    fn release(&mut self) {
        let Some(mut port) = self.port.take() else {
            return;
        };

        if self.claimed {
            if let Err(e) = port.release_interface(self.interface) {
                warn!(
                    "Failed to release interface {} on {}: {}",
                    self.interface, self.identity, e
                );
            }
            self.claimed = false;
        }

        if self.detached_driver {
            match port.attach_kernel_driver(self.interface) {
                Ok(()) => debug!(
                    "Reattached kernel driver to interface {} on {}",
                    self.interface, self.identity
                ),
                Err(e) => debug!(
                    "Could not reattach kernel driver to interface {}: {}",
                    self.interface, e
                ),
            }
            self.detached_driver = false;
        }

        if let Err(e) = port.reset() {
            warn!("Failed to reset {}: {}", self.identity, e);
        }

        drop(port);
        debug!("Session on {} released", self.identity);
    }
}

impl<P: UsbPort> Drop for DeviceSession<P> {
    fn drop(&mut self) {
        self.release();
    }
}

fn resolve(
    endpoints: &[EndpointDescriptor],
    operation: OperationKind,
    direction: Direction,
    requirement: Option<&[TransferKind]>,
    interface: u8,
) -> Result<Option<EndpointDescriptor>, SessionError> {
    let Some(kinds) = requirement else {
        return Ok(None);
    };

    select_endpoint(endpoints, direction, kinds)
        .map(Some)
        .ok_or(SessionError::EndpointNotFound {
            operation,
            direction,
            interface,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::backend::UsbBus;
    use crate::usb::mock::{Call, MockBus, MockDeviceSpec, Step};

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn open_with(
        spec: MockDeviceSpec,
        operation: OperationKind,
    ) -> (MockBus, Result<(), SessionError>) {
        let identity = spec.identity;
        let bus = MockBus::new(vec![spec]);
        let device = bus.find(identity).unwrap().unwrap();
        let result = DeviceSession::open(&device, operation, TIMEOUT)
            .map(|session| session.close());
        (bus, result)
    }

    #[test]
    fn test_open_order_and_single_release() {
        let spec = MockDeviceSpec::printer().with_kernel_driver();
        let identity = spec.identity;
        let (bus, result) = open_with(spec, OperationKind::Print);
        result.unwrap();

        let calls = bus.log().calls_for(identity);
        assert_eq!(
            calls,
            vec![
                Call::Open,
                Call::KernelDriverActive(0),
                Call::DetachKernelDriver(0),
                Call::SetConfiguration(1),
                Call::ClaimInterface(0),
                Call::ReleaseInterface(0),
                Call::AttachKernelDriver(0),
                Call::Reset,
                Call::Dispose,
            ]
        );
    }

    #[test]
    fn test_no_kernel_driver_skips_detach_and_reattach() {
        let (bus, result) = open_with(MockDeviceSpec::printer(), OperationKind::Print);
        result.unwrap();

        let log = bus.log();
        assert_eq!(log.count(|c| matches!(c, Call::DetachKernelDriver(_))), 0);
        assert_eq!(log.count(|c| matches!(c, Call::AttachKernelDriver(_))), 0);
        assert_eq!(log.count(|c| *c == Call::Dispose), 1);
    }

    #[test]
    fn test_detach_failure_is_session_error() {
        let spec = MockDeviceSpec::printer()
            .with_kernel_driver()
            .failing(Step::Detach);
        let (bus, result) = open_with(spec, OperationKind::Print);

        assert!(matches!(
            result,
            Err(SessionError::DetachKernelDriver { interface: 0, .. })
        ));
        let log = bus.log();
        assert_eq!(log.count(|c| *c == Call::Dispose), 1);
        assert_eq!(log.count(|c| matches!(c, Call::SetConfiguration(_))), 0);
    }

    #[test]
    fn test_descriptor_errors_never_open_the_device() {
        let (bus, result) = open_with(
            MockDeviceSpec::printer().failing(Step::Descriptor),
            OperationKind::Print,
        );
        assert!(matches!(result, Err(SessionError::Descriptor { .. })));
        assert!(bus.log().calls().is_empty());

        let (bus, result) = open_with(
            MockDeviceSpec::printer().without_interface(),
            OperationKind::Print,
        );
        assert!(matches!(result, Err(SessionError::NoInterface)));
        assert!(bus.log().calls().is_empty());
    }

    #[test]
    fn test_kernel_driver_query_failure_is_session_error() {
        let spec = MockDeviceSpec::printer()
            .with_kernel_driver()
            .failing(Step::KernelDriverQuery);
        let (bus, result) = open_with(spec, OperationKind::Print);

        match result {
            Err(SessionError::DetachKernelDriver { interface, message }) => {
                assert_eq!(interface, 0);
                assert!(message.contains("could not query kernel driver"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let log = bus.log();
        assert_eq!(log.count(|c| matches!(c, Call::DetachKernelDriver(_))), 0);
        assert_eq!(log.count(|c| matches!(c, Call::SetConfiguration(_))), 0);
        assert_eq!(log.count(|c| matches!(c, Call::AttachKernelDriver(_))), 0);
        assert_eq!(log.count(|c| *c == Call::Dispose), 1);
    }

    #[test]
    fn test_claim_failure_reattaches_driver() {
        let spec = MockDeviceSpec::printer()
            .with_kernel_driver()
            .failing(Step::Claim);
        let (bus, result) = open_with(spec, OperationKind::Print);

        assert!(matches!(result, Err(SessionError::ClaimInterface { .. })));
        let log = bus.log();
        assert_eq!(log.count(|c| matches!(c, Call::AttachKernelDriver(0))), 1);
        assert_eq!(log.count(|c| matches!(c, Call::ReleaseInterface(_))), 0);
        assert_eq!(log.count(|c| *c == Call::Dispose), 1);
    }

    #[test]
    fn test_set_configuration_failure() {
        let spec = MockDeviceSpec::printer().failing(Step::SetConfiguration);
        let (bus, result) = open_with(spec, OperationKind::Print);

        assert!(matches!(
            result,
            Err(SessionError::SetConfiguration { config: 1, .. })
        ));
        assert_eq!(bus.log().count(|c| *c == Call::Dispose), 1);
    }

    #[test]
    fn test_open_failure_has_nothing_to_release() {
        let spec = MockDeviceSpec::printer().failing(Step::Open);
        let (bus, result) = open_with(spec, OperationKind::Print);

        assert!(matches!(result, Err(SessionError::Open { .. })));
        assert_eq!(bus.log().count(|c| *c == Call::Dispose), 0);
    }

    #[test]
    fn test_missing_endpoint_releases_claim() {
        // A scale exposes no bulk OUT endpoint
        let spec = MockDeviceSpec::scale();
        let (bus, result) = open_with(spec, OperationKind::Print);

        assert!(matches!(
            result,
            Err(SessionError::EndpointNotFound {
                direction: Direction::Out,
                ..
            })
        ));
        let log = bus.log();
        assert_eq!(log.count(|c| matches!(c, Call::ReleaseInterface(0))), 1);
        assert_eq!(log.count(|c| *c == Call::Dispose), 1);
    }

    #[test]
    fn test_endpoint_resolution_per_operation() {
        let bus = MockBus::new(vec![MockDeviceSpec::printer(), MockDeviceSpec::scale()]);

        let printer = bus.find(MockDeviceSpec::PRINTER).unwrap().unwrap();
        let session = DeviceSession::open(&printer, OperationKind::PrinterStatus, TIMEOUT).unwrap();
        assert_eq!(session.out_endpoint().map(|ep| ep.address), Some(0x01));
        assert_eq!(session.in_endpoint().map(|ep| ep.address), Some(0x82));
        session.close();

        let scale = bus.find(MockDeviceSpec::SCALE).unwrap().unwrap();
        let session = DeviceSession::open(&scale, OperationKind::Scale, TIMEOUT).unwrap();
        assert_eq!(session.out_endpoint(), None);
        assert_eq!(session.in_endpoint().map(|ep| ep.address), Some(0x81));
        session.close();
    }

    #[test]
    fn test_drop_releases_once() {
        let bus = MockBus::new(vec![MockDeviceSpec::printer()]);
        let device = bus.find(MockDeviceSpec::PRINTER).unwrap().unwrap();

        {
            let _session = DeviceSession::open(&device, OperationKind::Print, TIMEOUT).unwrap();
        }

        let log = bus.log();
        assert_eq!(log.count(|c| matches!(c, Call::ReleaseInterface(_))), 1);
        assert_eq!(log.count(|c| *c == Call::Reset), 1);
        assert_eq!(log.count(|c| *c == Call::Dispose), 1);
    }

    #[test]
    fn test_release_continues_after_failed_step() {
        let spec = MockDeviceSpec::printer()
            .with_kernel_driver()
            .failing(Step::Release);
        let (bus, result) = open_with(spec, OperationKind::Print);
        result.unwrap();

        let log = bus.log();
        assert_eq!(log.count(|c| matches!(c, Call::AttachKernelDriver(0))), 1);
        assert_eq!(log.count(|c| *c == Call::Reset), 1);
        assert_eq!(log.count(|c| *c == Call::Dispose), 1);
    }

    #[test]
    fn test_short_write_is_transport_error() {
        let spec = MockDeviceSpec::printer().short_write_at(0);
        let bus = MockBus::new(vec![spec]);
        let device = bus.find(MockDeviceSpec::PRINTER).unwrap().unwrap();
        let mut session = DeviceSession::open(&device, OperationKind::Print, TIMEOUT).unwrap();

        let err = session.write_out(b"hello").unwrap_err();
        assert!(matches!(
            err,
            TransportError::ShortWrite {
                endpoint: 0x01,
                written: 4,
                expected: 5
            }
        ));
        session.close();
        assert_eq!(bus.log().count(|c| *c == Call::Dispose), 1);
    }
}

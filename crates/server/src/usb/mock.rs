//! Scripted USB bus for tests
//!
//! Every backend call is appended to a shared [`MockLog`]. Devices can be
//! told to fail a given step, to return short writes, or to hand back a
//! fixed IN payload. The log also tracks which identities have an open port
//! and flags any moment where two ports are open for the same identity.

use crate::usb::backend::{ConfigLayout, DeviceSummary, UsbBus, UsbDevice, UsbPort, UsbResult};
use protocol::{EndpointDescriptor, PeripheralIdentity, TransferKind};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open,
    KernelDriverActive(u8),
    DetachKernelDriver(u8),
    AttachKernelDriver(u8),
    SetConfiguration(u8),
    ClaimInterface(u8),
    ReleaseInterface(u8),
    Reset,
    WriteBulk(u8, Vec<u8>),
    ReadBulk(u8),
    ReadInterrupt(u8),
    WriteControl {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: Vec<u8>,
    },
    Dispose,
}

impl Call {
    /// Calls that move data, as opposed to lifecycle calls
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            Call::WriteBulk(..)
                | Call::ReadBulk(_)
                | Call::ReadInterrupt(_)
                | Call::WriteControl { .. }
        )
    }
}

/// Step a device can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Open,
    Descriptor,
    KernelDriverQuery,
    Detach,
    SetConfiguration,
    Claim,
    Release,
    Read,
    Control,
}

#[derive(Debug, Clone)]
pub struct MockDeviceSpec {
    pub identity: PeripheralIdentity,
    pub layout: ConfigLayout,
    pub kernel_driver: bool,
    /// Configuration descriptor lists no interface
    pub no_interface: bool,
    pub failing: HashSet<Step>,
    /// Index of the bulk write (0-based, per port) that fails outright
    pub fail_write_at: Option<usize>,
    /// Index of the bulk write that transfers one byte less than asked
    pub short_write_at: Option<usize>,
    /// Payload returned by IN transfers
    pub in_data: Vec<u8>,
    /// Time each bulk write takes
    pub write_delay: Duration,
}

impl MockDeviceSpec {
    pub const PRINTER: PeripheralIdentity = PeripheralIdentity::new(0x04b8, 0x0e15);
    pub const SCALE: PeripheralIdentity = PeripheralIdentity::new(0x0922, 0x8003);

    /// Receipt printer: bulk OUT 0x01, bulk IN 0x82
    pub fn printer() -> Self {
        Self::with_layout(
            Self::PRINTER,
            vec![
                EndpointDescriptor::new(0x01, TransferKind::Bulk),
                EndpointDescriptor::new(0x82, TransferKind::Bulk),
            ],
        )
        .in_data(vec![0x12])
    }

    /// Postal scale: interrupt IN 0x81, reporting 250 g stable
    pub fn scale() -> Self {
        Self::with_layout(
            Self::SCALE,
            vec![EndpointDescriptor::new(0x81, TransferKind::Interrupt)],
        )
        .in_data(vec![0x03, 0x04, 0x02, 0x00, 0xfa, 0x00])
    }

    pub fn with_layout(identity: PeripheralIdentity, endpoints: Vec<EndpointDescriptor>) -> Self {
        Self {
            identity,
            layout: ConfigLayout {
                config_value: 1,
                interface: 0,
                endpoints,
            },
            kernel_driver: false,
            no_interface: false,
            failing: HashSet::new(),
            fail_write_at: None,
            short_write_at: None,
            in_data: Vec::new(),
            write_delay: Duration::ZERO,
        }
    }

    pub fn with_kernel_driver(mut self) -> Self {
        self.kernel_driver = true;
        self
    }

    pub fn without_interface(mut self) -> Self {
        self.no_interface = true;
        self
    }

    pub fn failing(mut self, step: Step) -> Self {
        self.failing.insert(step);
        self
    }

    pub fn fail_write_at(mut self, index: usize) -> Self {
        self.fail_write_at = Some(index);
        self
    }

    pub fn short_write_at(mut self, index: usize) -> Self {
        self.short_write_at = Some(index);
        self
    }

    pub fn in_data(mut self, data: Vec<u8>) -> Self {
        self.in_data = data;
        self
    }

    pub fn write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    fn fails(&self, step: Step) -> UsbResult<()> {
        if self.failing.contains(&step) {
            Err(rusb::Error::Io)
        } else {
            Ok(())
        }
    }
}

/// Shared record of everything the mock bus saw
#[derive(Debug, Default)]
pub struct MockLog {
    calls: Mutex<Vec<(PeripheralIdentity, Call)>>,
    open_ports: Mutex<HashMap<PeripheralIdentity, usize>>,
    overlap: AtomicBool,
    scans: AtomicUsize,
}

impl MockLog {
    fn lock_calls(&self) -> MutexGuard<'_, Vec<(PeripheralIdentity, Call)>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, identity: PeripheralIdentity, call: Call) {
        self.lock_calls().push((identity, call));
    }

    fn port_opened(&self, identity: PeripheralIdentity) {
        let mut open = self.open_ports.lock().unwrap_or_else(|e| e.into_inner());
        let count = open.entry(identity).or_insert(0);
        *count += 1;
        if *count > 1 {
            self.overlap.store(true, Ordering::SeqCst);
        }
    }

    fn port_closed(&self, identity: PeripheralIdentity) {
        let mut open = self.open_ports.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = open.get_mut(&identity) {
            *count -= 1;
        }
    }

    pub fn calls(&self) -> Vec<(PeripheralIdentity, Call)> {
        self.lock_calls().clone()
    }

    pub fn calls_for(&self, identity: PeripheralIdentity) -> Vec<Call> {
        self.lock_calls()
            .iter()
            .filter(|(id, _)| *id == identity)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.lock_calls().iter().filter(|(_, c)| pred(c)).count()
    }

    pub fn bulk_writes(&self) -> Vec<Vec<u8>> {
        self.lock_calls()
            .iter()
            .filter_map(|(_, call)| match call {
                Call::WriteBulk(_, data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// True if two ports were ever open for the same identity at once
    pub fn saw_overlap(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

pub struct MockBus {
    devices: Vec<MockDeviceSpec>,
    log: Arc<MockLog>,
    scan_fails: bool,
}

impl MockBus {
    pub fn new(devices: Vec<MockDeviceSpec>) -> Self {
        Self {
            devices,
            log: Arc::new(MockLog::default()),
            scan_fails: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// A bus whose scans fail outright
    pub fn broken() -> Self {
        Self {
            scan_fails: true,
            ..Self::empty()
        }
    }

    pub fn log(&self) -> Arc<MockLog> {
        self.log.clone()
    }
}

impl UsbBus for MockBus {
    type Device = MockDevice;

    fn find(&self, identity: PeripheralIdentity) -> UsbResult<Option<MockDevice>> {
        self.log.scans.fetch_add(1, Ordering::SeqCst);
        if self.scan_fails {
            return Err(rusb::Error::Other);
        }

        Ok(self
            .devices
            .iter()
            .find(|spec| spec.identity == identity)
            .map(|spec| MockDevice {
                spec: spec.clone(),
                log: self.log.clone(),
            }))
    }

    fn list(&self) -> UsbResult<Vec<DeviceSummary>> {
        if self.scan_fails {
            return Err(rusb::Error::Other);
        }

        Ok(self
            .devices
            .iter()
            .enumerate()
            .map(|(i, spec)| DeviceSummary {
                identity: spec.identity,
                bus_number: 1,
                device_address: i as u8 + 1,
                manufacturer: Some("Mock".to_string()),
                product: None,
            })
            .collect())
    }
}

pub struct MockDevice {
    spec: MockDeviceSpec,
    log: Arc<MockLog>,
}

impl UsbDevice for MockDevice {
    type Port = MockPort;

    fn identity(&self) -> PeripheralIdentity {
        self.spec.identity
    }

    fn first_configuration(&self) -> UsbResult<ConfigLayout> {
        self.spec.fails(Step::Descriptor)?;
        if self.spec.no_interface {
            return Err(rusb::Error::NotFound);
        }
        Ok(self.spec.layout.clone())
    }

    fn open(&self) -> UsbResult<MockPort> {
        self.log.record(self.spec.identity, Call::Open);
        if self.spec.failing.contains(&Step::Open) {
            return Err(rusb::Error::Access);
        }

        self.log.port_opened(self.spec.identity);
        Ok(MockPort {
            spec: self.spec.clone(),
            log: self.log.clone(),
            writes: 0,
        })
    }
}

pub struct MockPort {
    spec: MockDeviceSpec,
    log: Arc<MockLog>,
    writes: usize,
}

impl MockPort {
    fn record(&self, call: Call) {
        self.log.record(self.spec.identity, call);
    }

    fn fill(&self, buf: &mut [u8]) -> usize {
        let len = self.spec.in_data.len().min(buf.len());
        buf[..len].copy_from_slice(&self.spec.in_data[..len]);
        len
    }
}

impl UsbPort for MockPort {
    fn kernel_driver_active(&mut self, interface: u8) -> UsbResult<bool> {
        self.record(Call::KernelDriverActive(interface));
        self.spec.fails(Step::KernelDriverQuery)?;
        Ok(self.spec.kernel_driver)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> UsbResult<()> {
        self.record(Call::DetachKernelDriver(interface));
        self.spec.fails(Step::Detach)
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> UsbResult<()> {
        self.record(Call::AttachKernelDriver(interface));
        Ok(())
    }

    fn set_active_configuration(&mut self, config: u8) -> UsbResult<()> {
        self.record(Call::SetConfiguration(config));
        self.spec.fails(Step::SetConfiguration)
    }

    fn claim_interface(&mut self, interface: u8) -> UsbResult<()> {
        self.record(Call::ClaimInterface(interface));
        self.spec.fails(Step::Claim)
    }

    fn release_interface(&mut self, interface: u8) -> UsbResult<()> {
        self.record(Call::ReleaseInterface(interface));
        self.spec.fails(Step::Release)
    }

    fn reset(&mut self) -> UsbResult<()> {
        self.record(Call::Reset);
        Ok(())
    }

    fn write_bulk(&mut self, endpoint: u8, data: &[u8], _timeout: Duration) -> UsbResult<usize> {
        let index = self.writes;
        self.writes += 1;

        if !self.spec.write_delay.is_zero() {
            std::thread::sleep(self.spec.write_delay);
        }

        if self.spec.fail_write_at == Some(index) {
            self.record(Call::WriteBulk(endpoint, Vec::new()));
            return Err(rusb::Error::Pipe);
        }

        let written = if self.spec.short_write_at == Some(index) {
            data.len().saturating_sub(1)
        } else {
            data.len()
        };

        self.record(Call::WriteBulk(endpoint, data[..written].to_vec()));
        Ok(written)
    }

    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], _timeout: Duration) -> UsbResult<usize> {
        self.record(Call::ReadBulk(endpoint));
        self.spec.fails(Step::Read)?;
        Ok(self.fill(buf))
    }

    fn read_interrupt(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> UsbResult<usize> {
        self.record(Call::ReadInterrupt(endpoint));
        self.spec.fails(Step::Read)?;
        Ok(self.fill(buf))
    }

    fn write_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        _timeout: Duration,
    ) -> UsbResult<usize> {
        self.record(Call::WriteControl {
            request_type,
            request,
            value,
            index,
            data: data.to_vec(),
        });
        self.spec.fails(Step::Control)?;
        Ok(data.len())
    }
}

impl Drop for MockPort {
    fn drop(&mut self) {
        self.record(Call::Dispose);
        self.log.port_closed(self.spec.identity);
    }
}

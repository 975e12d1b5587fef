//! Test utilities for the printer session
//!
//! [`MockHost`] is a scriptable in-memory [`UsbHost`]: tests decide which
//! devices are attached, which are authorized, what their interfaces look
//! like and how each bulk transfer ends, then inspect how many handles and
//! interface claims are still held.
//!
//! # Example
//!
//! ```
//! use common::test_utils::mock_printer;
//! use printer::test_utils::MockHost;
//! use printer::usb::UsbHost;
//!
//! let host = MockHost::new();
//! host.attach(mock_printer(1), true);
//! assert_eq!(host.devices().unwrap().len(), 1);
//! assert_eq!(host.open_handles(), 0);
//! ```

use crate::usb::host::{DeviceConnection, HostError, UsbHost};
use common::test_utils::printer_interface;
use protocol::{DeviceDescriptor, InterfaceDescriptor};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Scripted result of one bulk transfer
#[derive(Debug, Clone)]
pub enum BulkOutcome {
    /// All bytes written
    Written,
    /// Transfer fails with the given error
    Fail(HostError),
    /// The transfer panics
    Panic,
}

#[derive(Debug)]
struct MockState {
    host_supported: bool,
    devices: Vec<DeviceDescriptor>,
    permissions: HashMap<String, bool>,
    interfaces: HashMap<String, InterfaceDescriptor>,
    open_failures: HashMap<String, HostError>,
    claim_failures: HashMap<String, HostError>,
    /// Devices whose interface is bound to a kernel driver
    kernel_drivers: HashSet<String>,
    bulk_outcomes: VecDeque<BulkOutcome>,
    open_handles: usize,
    claimed_interfaces: usize,
    forced_claims: usize,
    driver_detaches: usize,
    driver_reattaches: usize,
    opens: usize,
    permission_requests: usize,
    bulk_calls: usize,
    written: Vec<Vec<u8>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            host_supported: true,
            devices: Vec::new(),
            permissions: HashMap::new(),
            interfaces: HashMap::new(),
            open_failures: HashMap::new(),
            claim_failures: HashMap::new(),
            kernel_drivers: HashSet::new(),
            bulk_outcomes: VecDeque::new(),
            open_handles: 0,
            claimed_interfaces: 0,
            forced_claims: 0,
            driver_detaches: 0,
            driver_reattaches: 0,
            opens: 0,
            permission_requests: 0,
            bulk_calls: 0,
            written: Vec::new(),
        }
    }
}

/// In-memory USB host
///
/// Cloning shares the same state, so a test can keep a clone after handing
/// the host to the worker.
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// Attach a device, authorized or not
    pub fn attach(&self, device: DeviceDescriptor, permitted: bool) {
        let mut state = self.state();
        state
            .permissions
            .insert(device.device_id.clone(), permitted);
        state.devices.push(device);
    }

    /// Remove a device from the attached list
    pub fn remove(&self, device_id: &str) {
        self.state().devices.retain(|d| d.device_id != device_id);
    }

    pub fn set_host_supported(&self, supported: bool) {
        self.state().host_supported = supported;
    }

    pub fn set_permission(&self, device_id: &str, permitted: bool) {
        self.state()
            .permissions
            .insert(device_id.to_string(), permitted);
    }

    /// Override interface 0 of a device (default: bulk IN + bulk OUT)
    pub fn set_interface(&self, device_id: &str, interface: InterfaceDescriptor) {
        self.state()
            .interfaces
            .insert(device_id.to_string(), interface);
    }

    pub fn fail_open(&self, device_id: &str, err: HostError) {
        self.state()
            .open_failures
            .insert(device_id.to_string(), err);
    }

    /// Let later opens of the device succeed again
    pub fn heal_open(&self, device_id: &str) {
        self.state().open_failures.remove(device_id);
    }

    pub fn fail_claim(&self, device_id: &str, err: HostError) {
        self.state()
            .claim_failures
            .insert(device_id.to_string(), err);
    }

    /// Bind the device's interface to a kernel driver (e.g. `usblp`)
    pub fn bind_kernel_driver(&self, device_id: &str) {
        self.state().kernel_drivers.insert(device_id.to_string());
    }

    /// Whether the kernel driver currently holds the device's interface
    pub fn kernel_driver_bound(&self, device_id: &str) -> bool {
        self.state().kernel_drivers.contains(device_id)
    }

    /// Queue outcomes for the next bulk transfers; afterwards transfers succeed
    pub fn queue_bulk(&self, outcomes: impl IntoIterator<Item = BulkOutcome>) {
        self.state().bulk_outcomes.extend(outcomes);
    }

    /// Make every bulk transfer fail
    pub fn fail_all_bulk(&self, count: usize) {
        self.queue_bulk((0..count).map(|_| BulkOutcome::Fail(HostError::Io)));
    }

    /// Handles opened and not yet closed
    pub fn open_handles(&self) -> usize {
        self.state().open_handles
    }

    /// Interfaces claimed and not yet released
    pub fn claimed_interfaces(&self) -> usize {
        self.state().claimed_interfaces
    }

    /// Total successful opens
    pub fn opens(&self) -> usize {
        self.state().opens
    }

    /// Claims made with `force`
    pub fn forced_claims(&self) -> usize {
        self.state().forced_claims
    }

    pub fn driver_detaches(&self) -> usize {
        self.state().driver_detaches
    }

    pub fn driver_reattaches(&self) -> usize {
        self.state().driver_reattaches
    }

    pub fn permission_requests(&self) -> usize {
        self.state().permission_requests
    }

    pub fn bulk_calls(&self) -> usize {
        self.state().bulk_calls
    }

    /// Buffers accepted by successful transfers
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }
}

impl UsbHost for MockHost {
    type Connection = MockConnection;

    fn is_host_supported(&self) -> bool {
        self.state().host_supported
    }

    fn devices(&self) -> Result<Vec<DeviceDescriptor>, HostError> {
        Ok(self.state().devices.clone())
    }

    fn has_permission(&self, device: &DeviceDescriptor) -> bool {
        self.state()
            .permissions
            .get(&device.device_id)
            .copied()
            .unwrap_or(false)
    }

    fn request_permission(&self, _device: &DeviceDescriptor) -> Result<(), HostError> {
        self.state().permission_requests += 1;
        Ok(())
    }

    fn open(&self, device: &DeviceDescriptor) -> Result<MockConnection, HostError> {
        let mut state = self.state();

        if let Some(err) = state.open_failures.get(&device.device_id) {
            return Err(err.clone());
        }
        if !state
            .devices
            .iter()
            .any(|d| d.device_id == device.device_id)
        {
            return Err(HostError::NoDevice);
        }

        state.open_handles += 1;
        state.opens += 1;

        Ok(MockConnection {
            state: Arc::clone(&self.state),
            device: device.clone(),
            claimed: None,
            detached_driver: false,
        })
    }
}

/// Handle returned by [`MockHost::open`]
///
/// Dropping it without `close` still releases its claim and handle, like
/// libusb does when a handle is destroyed, and hands a detached interface
/// back to its kernel driver.
#[derive(Debug)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    device: DeviceDescriptor,
    claimed: Option<u8>,
    detached_driver: bool,
}

impl MockConnection {
    fn reattach_driver(&mut self, state: &mut MockState) {
        if std::mem::take(&mut self.detached_driver) {
            state.kernel_drivers.insert(self.device.device_id.clone());
            state.driver_reattaches += 1;
        }
    }
}

impl DeviceConnection for MockConnection {
    fn interface(&self, index: u8) -> Result<InterfaceDescriptor, HostError> {
        if index >= self.device.interface_count {
            return Err(HostError::NotFound);
        }
        Ok(lock(&self.state)
            .interfaces
            .get(&self.device.device_id)
            .cloned()
            .unwrap_or_else(printer_interface))
    }

    fn claim_interface(&mut self, number: u8, force: bool) -> Result<(), HostError> {
        let state = Arc::clone(&self.state);
        let mut state = lock(&state);
        if force {
            state.forced_claims += 1;
            if state.kernel_drivers.remove(&self.device.device_id) {
                state.driver_detaches += 1;
                self.detached_driver = true;
            }
        } else if state.kernel_drivers.contains(&self.device.device_id) {
            return Err(HostError::Busy);
        }

        if let Some(err) = state.claim_failures.get(&self.device.device_id).cloned() {
            self.reattach_driver(&mut state);
            return Err(err);
        }
        if self.claimed.is_none() {
            state.claimed_interfaces += 1;
        }
        self.claimed = Some(number);
        Ok(())
    }

    fn release_interface(&mut self, number: u8) -> Result<(), HostError> {
        if self.claimed != Some(number) {
            return Err(HostError::NotFound);
        }
        self.claimed = None;
        let state = Arc::clone(&self.state);
        let mut state = lock(&state);
        state.claimed_interfaces -= 1;
        self.reattach_driver(&mut state);
        Ok(())
    }

    fn bulk_out(&self, _endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize, HostError> {
        let outcome = {
            let mut state = lock(&self.state);
            state.bulk_calls += 1;
            state
                .bulk_outcomes
                .pop_front()
                .unwrap_or(BulkOutcome::Written)
        };

        match outcome {
            BulkOutcome::Written => {
                lock(&self.state).written.push(data.to_vec());
                Ok(data.len())
            }
            BulkOutcome::Fail(err) => Err(err),
            BulkOutcome::Panic => panic!("mock bulk transfer fault"),
        }
    }

    fn close(self) {}
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        let state = Arc::clone(&self.state);
        let mut state = lock(&state);
        if self.claimed.take().is_some() {
            state.claimed_interfaces -= 1;
        }
        self.reattach_driver(&mut state);
        state.open_handles -= 1;
    }
}

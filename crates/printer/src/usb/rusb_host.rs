//! libusb-backed USB host
//!
//! Implements [`UsbHost`] over a `rusb` context. libusb has no permission
//! dialog: access is decided by device node permissions (udev rules), so a
//! permission request re-probes access and posts the answer back through the
//! host event sink like a platform dialog would.

use crate::usb::host::{DeviceConnection, HostError, UsbHost};
use common::{HostEvent, HostEventSink};
use protocol::{
    DeviceDescriptor, Direction, EndpointDescriptor, InterfaceDescriptor, TransferKind,
};
use rusb::{Context, Device, DeviceHandle, Hotplug, HotplugBuilder, UsbContext};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long one `handle_events` call may block
const EVENT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Device node path used as the device identifier
fn device_node_path(bus: u8, address: u8) -> String {
    format!("/dev/bus/usb/{:03}/{:03}", bus, address)
}

fn transfer_kind(kind: rusb::TransferType) -> TransferKind {
    match kind {
        rusb::TransferType::Control => TransferKind::Control,
        rusb::TransferType::Isochronous => TransferKind::Isochronous,
        rusb::TransferType::Bulk => TransferKind::Bulk,
        rusb::TransferType::Interrupt => TransferKind::Interrupt,
    }
}

fn direction(dir: rusb::Direction) -> Direction {
    match dir {
        rusb::Direction::In => Direction::In,
        rusb::Direction::Out => Direction::Out,
    }
}

/// Build a descriptor from a libusb device
fn describe<T: UsbContext>(device: &Device<T>) -> Result<DeviceDescriptor, rusb::Error> {
    let descriptor = device.device_descriptor()?;
    let interface_count = match device.active_config_descriptor() {
        Ok(config) => config.num_interfaces(),
        Err(e) => {
            debug!(
                "No active configuration for bus={} addr={}: {}",
                device.bus_number(),
                device.address(),
                e
            );
            0
        }
    };

    Ok(DeviceDescriptor {
        device_id: device_node_path(device.bus_number(), device.address()),
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        class: descriptor.class_code(),
        interface_count,
    })
}

/// USB host backed by libusb
pub struct RusbHost {
    context: Context,
    sink: HostEventSink,
}

impl RusbHost {
    pub fn new(sink: HostEventSink) -> Result<Self, HostError> {
        let context = Context::new()?;
        Ok(Self { context, sink })
    }

    fn find_device(&self, device_id: &str) -> Result<Device<Context>, HostError> {
        self.context
            .devices()?
            .iter()
            .find(|d| device_node_path(d.bus_number(), d.address()) == device_id)
            .ok_or(HostError::NotFound)
    }

    /// Whether the device node can be opened by this process
    fn probe_access(&self, device: &DeviceDescriptor) -> Result<(), HostError> {
        let handle = self.find_device(&device.device_id)?.open()?;
        drop(handle);
        Ok(())
    }

    /// Start the `usb-events` thread
    ///
    /// Pumps libusb events and forwards hot-plug callbacks to the sink until
    /// `cancel` fires.
    pub fn spawn_event_pump(&self, cancel: CancellationToken) -> std::io::Result<JoinHandle<()>> {
        let context = self.context.clone();
        let sink = self.sink.clone();

        std::thread::Builder::new()
            .name("usb-events".to_string())
            .spawn(move || run_event_pump(context, sink, cancel))
    }
}

fn run_event_pump(context: Context, sink: HostEventSink, cancel: CancellationToken) {
    let _registration = if rusb::has_hotplug() {
        let callback: Box<dyn Hotplug<Context>> = Box::new(HotplugForwarder { sink });
        match HotplugBuilder::new()
            .enumerate(false)
            .register(&context, callback)
        {
            Ok(registration) => {
                debug!("Hot-plug callbacks registered");
                Some(registration)
            }
            Err(e) => {
                warn!("Failed to register hot-plug callbacks: {}", e);
                None
            }
        }
    } else {
        warn!("libusb has no hot-plug support on this platform");
        None
    };

    info!("USB event thread started");

    while !cancel.is_cancelled() {
        match context.handle_events(Some(EVENT_POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(rusb::Error::Interrupted) => {
                debug!("USB event handling interrupted");
            }
            Err(e) => {
                warn!("Error handling USB events: {}", e);
                std::thread::sleep(EVENT_POLL_TIMEOUT);
            }
        }
    }

    info!("USB event thread stopped");
}

/// Forwards libusb hot-plug callbacks as host events
struct HotplugForwarder {
    sink: HostEventSink,
}

impl HotplugForwarder {
    fn forward(&self, event: HostEvent) {
        // Never block the libusb event thread on a full queue
        if let Err(e) = self.sink.try_notify(event) {
            warn!("Dropping hot-plug notification: {}", e);
        }
    }
}

impl Hotplug<Context> for HotplugForwarder {
    fn device_arrived(&mut self, device: Device<Context>) {
        match describe(&device) {
            Ok(descriptor) => {
                debug!("Hot-plug: device arrived {}", descriptor);
                self.forward(HostEvent::Attached { device: descriptor });
            }
            Err(e) => warn!(
                "Failed to read descriptor of arrived device (bus={}, addr={}): {}",
                device.bus_number(),
                device.address(),
                e
            ),
        }
    }

    fn device_left(&mut self, device: Device<Context>) {
        let device_id = device_node_path(device.bus_number(), device.address());
        debug!("Hot-plug: device left {}", device_id);
        self.forward(HostEvent::Detached { device_id });
    }
}

impl UsbHost for RusbHost {
    type Connection = RusbConnection;

    fn is_host_supported(&self) -> bool {
        match self.context.devices() {
            Ok(_) => true,
            Err(e) => {
                error!("USB enumeration unavailable: {}", e);
                false
            }
        }
    }

    fn devices(&self) -> Result<Vec<DeviceDescriptor>, HostError> {
        let list = self.context.devices()?;
        let mut devices = Vec::with_capacity(list.len());

        for device in list.iter() {
            match describe(&device) {
                Ok(descriptor) => devices.push(descriptor),
                Err(e) => debug!(
                    "Skipping device bus={} addr={}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                ),
            }
        }

        debug!("Enumerated {} devices", devices.len());
        Ok(devices)
    }

    fn has_permission(&self, device: &DeviceDescriptor) -> bool {
        // Other failures surface from open() with their own error
        !matches!(self.probe_access(device), Err(HostError::Access))
    }

    fn request_permission(&self, device: &DeviceDescriptor) -> Result<(), HostError> {
        let granted = !matches!(self.probe_access(device), Err(HostError::Access));
        if !granted {
            info!(
                "No access to {}; grant it with a udev rule for {:04x}:{:04x}",
                device.device_id, device.vendor_id, device.product_id
            );
        }

        self.sink
            .try_notify(HostEvent::PermissionResult {
                device: device.clone(),
                granted,
            })
            .map_err(|e| HostError::Other(e.to_string()))
    }

    fn open(&self, device: &DeviceDescriptor) -> Result<RusbConnection, HostError> {
        let usb_device = self.find_device(&device.device_id)?;
        let handle = usb_device.open()?;
        debug!("Opened {}", device.device_id);

        Ok(RusbConnection {
            handle,
            device: usb_device,
            detached_driver: None,
        })
    }
}

/// An opened libusb device handle
pub struct RusbConnection {
    handle: DeviceHandle<Context>,
    device: Device<Context>,
    /// Interface whose kernel driver was detached by a forced claim
    detached_driver: Option<u8>,
}

impl DeviceConnection for RusbConnection {
    fn interface(&self, index: u8) -> Result<InterfaceDescriptor, HostError> {
        let config = self.device.active_config_descriptor()?;
        let interface = config
            .interfaces()
            .nth(usize::from(index))
            .ok_or(HostError::NotFound)?;
        let descriptor = interface.descriptors().next().ok_or(HostError::NotFound)?;

        let endpoints = descriptor
            .endpoint_descriptors()
            .map(|ep| EndpointDescriptor {
                address: ep.address(),
                kind: transfer_kind(ep.transfer_type()),
                direction: direction(ep.direction()),
            })
            .collect();

        Ok(InterfaceDescriptor {
            number: descriptor.interface_number(),
            class: descriptor.class_code(),
            endpoints,
        })
    }

    fn claim_interface(&mut self, number: u8, force: bool) -> Result<(), HostError> {
        if force {
            match self.handle.kernel_driver_active(number) {
                Ok(true) => {
                    debug!("Detaching kernel driver from interface {}", number);
                    self.handle.detach_kernel_driver(number)?;
                    self.detached_driver = Some(number);
                }
                Ok(false) => {}
                Err(e) => {
                    debug!(
                        "Could not check kernel driver status for interface {}: {}",
                        number, e
                    );
                }
            }
        }

        if let Err(e) = self.handle.claim_interface(number) {
            self.reattach_driver();
            return Err(e.into());
        }
        debug!("Claimed interface {}", number);
        Ok(())
    }

    fn release_interface(&mut self, number: u8) -> Result<(), HostError> {
        self.handle.release_interface(number)?;

        if self.detached_driver == Some(number) {
            self.reattach_driver();
        }
        Ok(())
    }

    fn bulk_out(&self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, HostError> {
        Ok(self.handle.write_bulk(endpoint, data, timeout)?)
    }

    fn close(self) {}
}

impl RusbConnection {
    /// Hand a detached interface back to its kernel driver
    fn reattach_driver(&mut self) {
        if let Some(number) = self.detached_driver.take() {
            match self.handle.attach_kernel_driver(number) {
                Ok(()) => debug!("Reattached kernel driver to interface {}", number),
                Err(e) => debug!(
                    "Could not reattach kernel driver to interface {}: {}",
                    number, e
                ),
            }
        }
    }
}

impl Drop for RusbConnection {
    fn drop(&mut self) {
        // libusb drops the claim with the handle but leaves the driver detached
        self.reattach_driver();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_node_path() {
        assert_eq!(device_node_path(1, 4), "/dev/bus/usb/001/004");
        assert_eq!(device_node_path(12, 127), "/dev/bus/usb/012/127");
    }

    #[test]
    fn test_endpoint_mapping() {
        assert_eq!(transfer_kind(rusb::TransferType::Bulk), TransferKind::Bulk);
        assert_eq!(
            transfer_kind(rusb::TransferType::Interrupt),
            TransferKind::Interrupt
        );
        assert_eq!(direction(rusb::Direction::Out), Direction::Out);
        assert_eq!(direction(rusb::Direction::In), Direction::In);
    }
}

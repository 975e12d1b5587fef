//! Test utilities for otg-printer
//!
//! Descriptor builders and async helpers shared by the test suites.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{mock_device, BEMATECH_VENDOR_ID};
//!
//! let device = mock_device(1, BEMATECH_VENDOR_ID, 0x0200, 0x07);
//! assert_eq!(device.device_id, "/dev/bus/usb/001/001");
//! ```

use protocol::{
    DeviceDescriptor, Direction, EndpointDescriptor, InterfaceDescriptor, TransferKind,
    USB_CLASS_PER_INTERFACE, USB_CLASS_PRINTER,
};
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Vendor id of the Bematech printers the default configuration targets
pub const BEMATECH_VENDOR_ID: u16 = 0x0dd4;

/// Create a device descriptor with one interface
///
/// `address` doubles as the device address in the node path.
pub fn mock_device(address: u8, vendor_id: u16, product_id: u16, class: u8) -> DeviceDescriptor {
    DeviceDescriptor {
        device_id: format!("/dev/bus/usb/001/{:03}", address),
        vendor_id,
        product_id,
        class,
        interface_count: 1,
    }
}

/// A Bematech receipt printer (vendor match)
pub fn mock_printer(address: u8) -> DeviceDescriptor {
    mock_device(address, BEMATECH_VENDOR_ID, 0x0200, USB_CLASS_PER_INTERFACE)
}

/// A generic printer-class device from another vendor
pub fn mock_class_printer(address: u8) -> DeviceDescriptor {
    mock_device(address, 0x04b8, 0x0202, USB_CLASS_PRINTER)
}

/// A HID keyboard (neither vendor nor class match)
pub fn mock_keyboard(address: u8) -> DeviceDescriptor {
    mock_device(address, 0x046d, 0xc31c, 0x03)
}

/// A vendor-specific device (neither vendor nor class match)
pub fn mock_vendor_specific(address: u8) -> DeviceDescriptor {
    mock_device(address, 0x1a86, 0x7523, 0xff)
}

/// Bulk OUT endpoint
pub fn bulk_out(address: u8) -> EndpointDescriptor {
    EndpointDescriptor {
        address,
        kind: TransferKind::Bulk,
        direction: Direction::Out,
    }
}

/// Bulk IN endpoint
pub fn bulk_in(address: u8) -> EndpointDescriptor {
    EndpointDescriptor {
        address: address | 0x80,
        kind: TransferKind::Bulk,
        direction: Direction::In,
    }
}

/// Interrupt OUT endpoint
pub fn interrupt_out(address: u8) -> EndpointDescriptor {
    EndpointDescriptor {
        address,
        kind: TransferKind::Interrupt,
        direction: Direction::Out,
    }
}

/// Typical printer interface: bulk IN status pipe followed by bulk OUT data pipe
pub fn printer_interface() -> InterfaceDescriptor {
    InterfaceDescriptor {
        number: 0,
        class: USB_CLASS_PRINTER,
        endpoints: vec![bulk_in(1), bulk_out(0x02)],
    }
}

/// Run a future with a timeout
///
/// # Example
/// ```
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let value = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
/// assert_eq!(value, 42);
/// # }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

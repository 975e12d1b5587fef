//! USB host capability surface
//!
//! The session logic depends on the platform only through these two traits:
//! [`UsbHost`] for enumeration, authorization and opening, and
//! [`DeviceConnection`] for an opened device. [`crate::usb::RusbHost`] backs
//! them with libusb; tests use `test_utils::MockHost`.

use protocol::{DeviceDescriptor, ErrorCode, InterfaceDescriptor};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the USB host
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("device not found")]
    NotFound,

    #[error("device disconnected")]
    NoDevice,

    #[error("access denied")]
    Access,

    #[error("resource busy")]
    Busy,

    #[error("operation timed out")]
    Timeout,

    #[error("endpoint stalled")]
    Pipe,

    #[error("input/output error")]
    Io,

    #[error("{0}")]
    Other(String),
}

impl HostError {
    /// Error code for a host failure outside of connect/send classification
    pub fn code(&self) -> ErrorCode {
        match self {
            HostError::NotFound | HostError::NoDevice => ErrorCode::DeviceNotFound,
            HostError::Access => ErrorCode::UsbPermissionDenied,
            _ => ErrorCode::UnknownException,
        }
    }
}

impl From<rusb::Error> for HostError {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::NotFound => HostError::NotFound,
            rusb::Error::NoDevice => HostError::NoDevice,
            rusb::Error::Access => HostError::Access,
            rusb::Error::Busy => HostError::Busy,
            rusb::Error::Timeout => HostError::Timeout,
            rusb::Error::Pipe => HostError::Pipe,
            rusb::Error::Io => HostError::Io,
            _ => HostError::Other(err.to_string()),
        }
    }
}

/// Platform USB host
pub trait UsbHost: Send + 'static {
    /// Handle type for an opened device
    type Connection: DeviceConnection;

    /// Whether the platform can act as a USB host at all
    fn is_host_supported(&self) -> bool;

    /// Currently attached devices, in enumeration order
    fn devices(&self) -> Result<Vec<DeviceDescriptor>, HostError>;

    /// Whether the platform already records authorization for `device`
    fn has_permission(&self, device: &DeviceDescriptor) -> bool;

    /// Ask for authorization without waiting for the answer
    ///
    /// The outcome arrives later as a `HostEvent::PermissionResult`.
    fn request_permission(&self, device: &DeviceDescriptor) -> Result<(), HostError>;

    /// Open a handle to `device`
    fn open(&self, device: &DeviceDescriptor) -> Result<Self::Connection, HostError>;
}

/// An opened device handle
pub trait DeviceConnection: Send + 'static {
    /// Descriptor of the interface at `index` in the active configuration
    fn interface(&self, index: u8) -> Result<InterfaceDescriptor, HostError>;

    /// Claim an interface; `force` takes it from a kernel driver holding it
    fn claim_interface(&mut self, number: u8, force: bool) -> Result<(), HostError>;

    /// Release a claimed interface
    fn release_interface(&mut self, number: u8) -> Result<(), HostError>;

    /// Bulk OUT transfer; returns the number of bytes written
    fn bulk_out(&self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, HostError>;

    /// Close the handle
    fn close(self);
}

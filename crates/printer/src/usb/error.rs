//! Session acquisition errors

use crate::usb::host::HostError;
use protocol::ErrorCode;
use thiserror::Error;

/// Reasons a session could not be established
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("No USB devices found")]
    NoDevicesFound,

    #[error("USB device not found: {0}")]
    NotFound(String),

    #[error("USB permission denied for {0}")]
    PermissionDenied(String),

    #[error("No USB interfaces found")]
    InterfaceNotFound,

    #[error("Failed to claim USB interface {interface}: {source}")]
    ClaimFailed { interface: u8, source: HostError },

    #[error("No BULK OUT endpoint found")]
    EndpointNotFound,

    #[error("Failed to open USB connection: {0}")]
    OpenFailed(HostError),

    #[error("Exception: {0}")]
    Unknown(String),
}

impl ConnectError {
    /// Map an `open()` failure
    pub fn from_open(device_id: &str, err: HostError) -> Self {
        match err {
            HostError::NotFound | HostError::NoDevice => ConnectError::NotFound(device_id.into()),
            HostError::Access => ConnectError::PermissionDenied(device_id.into()),
            other => ConnectError::OpenFailed(other),
        }
    }

    /// Stable error code reported to callers
    pub fn code(&self) -> ErrorCode {
        match self {
            ConnectError::NoDevicesFound | ConnectError::NotFound(_) => ErrorCode::DeviceNotFound,
            ConnectError::PermissionDenied(_) => ErrorCode::UsbPermissionDenied,
            ConnectError::InterfaceNotFound | ConnectError::ClaimFailed { .. } => {
                ErrorCode::InterfaceNotFound
            }
            ConnectError::EndpointNotFound => ErrorCode::EndpointBulkOutNotFound,
            ConnectError::OpenFailed(_) => ErrorCode::ConnectionClosed,
            ConnectError::Unknown(_) => ErrorCode::UnknownException,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_failure_mapping() {
        let id = "/dev/bus/usb/001/002";
        assert_eq!(
            ConnectError::from_open(id, HostError::NoDevice).code(),
            ErrorCode::DeviceNotFound
        );
        assert_eq!(
            ConnectError::from_open(id, HostError::Access).code(),
            ErrorCode::UsbPermissionDenied
        );
        assert_eq!(
            ConnectError::from_open(id, HostError::Busy).code(),
            ErrorCode::ConnectionClosed
        );
    }

    #[test]
    fn test_claim_failure_reports_interface_code() {
        let err = ConnectError::ClaimFailed {
            interface: 0,
            source: HostError::Busy,
        };
        assert_eq!(err.code(), ErrorCode::InterfaceNotFound);
        assert!(err.to_string().contains("interface 0"));
    }
}

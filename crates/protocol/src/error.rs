//! Stable error codes surfaced to callers

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error code reported in failed responses
///
/// The serialized names are part of the public contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Permission was denied, or a permission request is awaiting the user
    #[error("UsbPermissionDenied")]
    #[serde(rename = "UsbPermissionDenied")]
    UsbPermissionDenied,

    #[error("DeviceNotFound")]
    #[serde(rename = "DeviceNotFound")]
    DeviceNotFound,

    #[error("InterfaceNotFound")]
    #[serde(rename = "InterfaceNotFound")]
    InterfaceNotFound,

    #[error("EndpointBulkOutNotFound")]
    #[serde(rename = "EndpointBulkOutNotFound")]
    EndpointBulkOutNotFound,

    #[error("bulkTransferFailed")]
    #[serde(rename = "bulkTransferFailed")]
    BulkTransferFailed,

    /// No open session (never connected, or the handle could not be opened)
    #[error("connectionClosed")]
    #[serde(rename = "connectionClosed")]
    ConnectionClosed,

    #[error("unknownException")]
    #[serde(rename = "unknownException")]
    UnknownException,
}

impl ErrorCode {
    /// The wire identifier of this code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UsbPermissionDenied => "UsbPermissionDenied",
            ErrorCode::DeviceNotFound => "DeviceNotFound",
            ErrorCode::InterfaceNotFound => "InterfaceNotFound",
            ErrorCode::EndpointBulkOutNotFound => "EndpointBulkOutNotFound",
            ErrorCode::BulkTransferFailed => "bulkTransferFailed",
            ErrorCode::ConnectionClosed => "connectionClosed",
            ErrorCode::UnknownException => "unknownException",
        }
    }
}

//! Boundary types for the USB receipt printer session
//!
//! This crate defines the types that cross the boundary between the hosting
//! application and the printer session: device descriptors, the request
//! payload and response shapes, emitted hot-plug events and the stable error
//! codes.
//!
//! # Example
//!
//! ```
//! use protocol::{ErrorCode, SendPayload, SendResponse};
//!
//! // Base64 text is decoded, anything else is sent as UTF-8
//! let bytes = SendPayload::from("SGVsbG8=").into_bytes();
//! assert_eq!(&bytes[..], b"Hello");
//!
//! let response = SendResponse::failed(ErrorCode::ConnectionClosed, "Printer not connected", 0);
//! assert!(!response.success);
//! ```

pub mod error;
pub mod messages;
pub mod types;

pub use error::ErrorCode;
pub use messages::{
    ConnectResponse, DisconnectResponse, HostSupportResponse, PrinterEvent, SendPayload,
    SendResponse, StatusResponse,
};
pub use types::{
    DeviceDescriptor, Direction, EndpointDescriptor, InterfaceDescriptor, PrinterState,
    TransferKind, USB_CLASS_PER_INTERFACE, USB_CLASS_PRINTER,
};

//! Boundary message definitions
//!
//! Requests and responses exchanged with the hosting application, plus the
//! fire-and-forget events emitted on hot-plug. Field names follow the
//! camelCase convention of the application side; optional fields are omitted
//! when absent.

use crate::error::ErrorCode;
use crate::types::{DeviceDescriptor, PrinterState};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Standard alphabet, padding optional
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Response to `checkHostSupport`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSupportResponse {
    pub supported: bool,
}

/// Response to `connect`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl ConnectResponse {
    /// Successful connection to `device`
    pub fn connected(device: &DeviceDescriptor) -> Self {
        Self {
            success: true,
            device_id: Some(device.device_id.clone()),
            vendor_id: Some(device.vendor_id),
            product_id: Some(device.product_id),
            error: None,
            error_code: None,
        }
    }

    /// Failed connection
    pub fn failed(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            device_id: None,
            vendor_id: None,
            product_id: None,
            error: Some(error.into()),
            error_code: Some(code),
        }
    }
}

/// Response to `disconnect` (always succeeds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectResponse {
    pub success: bool,
}

impl Default for DisconnectResponse {
    fn default() -> Self {
        Self { success: true }
    }
}

/// Response to `send`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub attempts: u32,
}

impl SendResponse {
    pub fn sent(bytes_sent: usize, attempts: u32) -> Self {
        Self {
            success: true,
            bytes_sent: Some(bytes_sent),
            error: None,
            error_code: None,
            attempts,
        }
    }

    pub fn failed(code: ErrorCode, error: impl Into<String>, attempts: u32) -> Self {
        Self {
            success: false,
            bytes_sent: None,
            error: Some(error.into()),
            error_code: Some(code),
            attempts,
        }
    }
}

/// Response to `status`
///
/// Identity fields are present only while connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub connected: bool,
    pub state: PrinterState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
}

impl StatusResponse {
    pub fn new(state: PrinterState, device: Option<&DeviceDescriptor>) -> Self {
        let device = device.filter(|_| state == PrinterState::Connected);
        Self {
            connected: device.is_some(),
            state,
            device_id: device.map(|d| d.device_id.clone()),
            vendor_id: device.map(|d| d.vendor_id),
            product_id: device.map(|d| d.product_id),
        }
    }
}

/// Payload of a `send` request
///
/// Either raw byte values, or text that is base64 when it decodes as such and
/// UTF-8 otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendPayload {
    Bytes(Vec<u8>),
    Text(String),
}

impl SendPayload {
    /// Decode the payload into the bytes to transmit
    pub fn into_bytes(self) -> Bytes {
        match self {
            SendPayload::Bytes(data) => Bytes::from(data),
            SendPayload::Text(text) => decode_text(text),
        }
    }
}

impl From<&str> for SendPayload {
    fn from(text: &str) -> Self {
        SendPayload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for SendPayload {
    fn from(data: Vec<u8>) -> Self {
        SendPayload::Bytes(data)
    }
}

fn decode_text(text: String) -> Bytes {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match LENIENT_BASE64.decode(compact.as_bytes()) {
        Ok(decoded) => Bytes::from(decoded),
        Err(_) => Bytes::from(text.into_bytes()),
    }
}

/// Event emitted to the application on hot-plug
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PrinterEvent {
    #[serde(rename_all = "camelCase")]
    Attached {
        device_id: String,
        vendor_id: u16,
        product_id: u16,
    },
    #[serde(rename_all = "camelCase")]
    Detached { device_id: String },
}

impl PrinterEvent {
    pub fn attached(device: &DeviceDescriptor) -> Self {
        PrinterEvent::Attached {
            device_id: device.device_id.clone(),
            vendor_id: device.vendor_id,
            product_id: device.product_id,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            PrinterEvent::Attached { device_id, .. } | PrinterEvent::Detached { device_id } => {
                device_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printer() -> DeviceDescriptor {
        DeviceDescriptor {
            device_id: "/dev/bus/usb/001/007".to_string(),
            vendor_id: 0x0dd4,
            product_id: 0x0200,
            class: 0x07,
            interface_count: 1,
        }
    }

    #[test]
    fn test_base64_text_is_decoded() {
        let bytes = SendPayload::from("SGVsbG8=").into_bytes();
        assert_eq!(&bytes[..], b"Hello");
    }

    #[test]
    fn test_non_base64_text_falls_back_to_utf8() {
        let bytes = SendPayload::from("olá").into_bytes();
        assert_eq!(&bytes[..], "olá".as_bytes());
        assert_eq!(&bytes[..], &[0x6f, 0x6c, 0xc3, 0xa1]);
    }

    #[test]
    fn test_base64_without_padding_and_with_newlines() {
        let bytes = SendPayload::from("SGVs\nbG8").into_bytes();
        assert_eq!(&bytes[..], b"Hello");
    }

    #[test]
    fn test_plain_sentence_falls_back() {
        let bytes = SendPayload::from("Hello, world!").into_bytes();
        assert_eq!(&bytes[..], b"Hello, world!");
    }

    #[test]
    fn test_raw_bytes_untouched() {
        let payload: SendPayload = serde_json::from_str("[27, 64, 10]").unwrap();
        assert_eq!(&payload.into_bytes()[..], &[0x1b, 0x40, 0x0a]);

        let payload: SendPayload = serde_json::from_str("\"G0A=\"").unwrap();
        assert_eq!(&payload.into_bytes()[..], &[0x1b, 0x40]);
    }

    #[test]
    fn test_connect_response_shapes() {
        let ok = serde_json::to_value(ConnectResponse::connected(&printer())).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["deviceId"], "/dev/bus/usb/001/007");
        assert_eq!(ok["vendorId"], 0x0dd4);
        assert!(ok.get("errorCode").is_none());

        let failed = serde_json::to_value(ConnectResponse::failed(
            ErrorCode::DeviceNotFound,
            "No USB devices found",
        ))
        .unwrap();
        assert_eq!(failed["success"], false);
        assert_eq!(failed["errorCode"], "DeviceNotFound");
        assert!(failed.get("deviceId").is_none());
    }

    #[test]
    fn test_send_response_shapes() {
        let ok = serde_json::to_value(SendResponse::sent(12, 2)).unwrap();
        assert_eq!(ok["bytesSent"], 12);
        assert_eq!(ok["attempts"], 2);

        let failed = serde_json::to_value(SendResponse::failed(
            ErrorCode::ConnectionClosed,
            "Printer not connected",
            0,
        ))
        .unwrap();
        assert_eq!(failed["errorCode"], "connectionClosed");
        assert_eq!(failed["attempts"], 0);
    }

    #[test]
    fn test_status_identity_only_when_connected() {
        let device = printer();

        let connected = StatusResponse::new(PrinterState::Connected, Some(&device));
        assert!(connected.connected);
        assert_eq!(connected.vendor_id, Some(0x0dd4));

        let pending = StatusResponse::new(PrinterState::PermissionPending, Some(&device));
        assert!(!pending.connected);
        assert!(pending.device_id.is_none());

        let json = serde_json::to_value(StatusResponse::new(PrinterState::Disconnected, None))
            .unwrap();
        assert_eq!(json["connected"], false);
        assert_eq!(json["state"], "disconnected");
        assert!(json.get("deviceId").is_none());
    }

    #[test]
    fn test_event_shapes() {
        let attached = serde_json::to_value(PrinterEvent::attached(&printer())).unwrap();
        assert_eq!(attached["event"], "attached");
        assert_eq!(attached["productId"], 0x0200);

        let detached = serde_json::to_value(PrinterEvent::Detached {
            device_id: "/dev/bus/usb/001/007".to_string(),
        })
        .unwrap();
        assert_eq!(detached["event"], "detached");
        assert_eq!(detached["deviceId"], "/dev/bus/usb/001/007");
    }
}

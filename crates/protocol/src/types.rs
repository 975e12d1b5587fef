//! USB and printer type definitions
//!
//! This module defines the device, interface and endpoint descriptors exchanged
//! between the USB host layer and the printer session, plus the printer state.

use serde::{Deserialize, Serialize};

/// USB class code for printers
pub const USB_CLASS_PRINTER: u8 = 0x07;

/// USB class code meaning "class defined per interface"
pub const USB_CLASS_PER_INTERFACE: u8 = 0x00;

/// Device information as reported by the platform
///
/// Immutable snapshot; re-read from the host on every discovery pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Opaque platform identifier (device node path on Linux)
    pub device_id: String,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// USB device class (bDeviceClass)
    pub class: u8,
    /// Number of interfaces in the active configuration
    pub interface_count: u8,
}

impl DeviceDescriptor {
    /// Whether the device class suggests a printer
    ///
    /// Many receipt printers report a per-interface class at the device level,
    /// so both codes are accepted.
    pub fn has_printer_class(&self) -> bool {
        self.class == USB_CLASS_PRINTER || self.class == USB_CLASS_PER_INTERFACE
    }
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:04x}:{:04x} class {:#04x})",
            self.device_id, self.vendor_id, self.product_id, self.class
        )
    }
}

/// USB endpoint transfer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// USB endpoint direction, from the host's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Device to host
    In,
    /// Host to device
    Out,
}

/// Endpoint descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Endpoint address (includes direction bit)
    pub address: u8,
    /// Transfer type
    pub kind: TransferKind,
    /// Direction
    pub direction: Direction,
}

impl EndpointDescriptor {
    /// Whether this endpoint can carry printer data (bulk, host to device)
    pub fn is_bulk_out(&self) -> bool {
        self.kind == TransferKind::Bulk && self.direction == Direction::Out
    }
}

/// Interface descriptor (alternate setting 0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    /// bInterfaceNumber
    pub number: u8,
    /// bInterfaceClass
    pub class: u8,
    /// Endpoints in the order the device reports them
    pub endpoints: Vec<EndpointDescriptor>,
}

/// Printer connection state
///
/// Derived from whether a session exists and whether a permission request
/// is outstanding; exactly one holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrinterState {
    #[default]
    Disconnected,
    PermissionPending,
    Connected,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(class: u8) -> DeviceDescriptor {
        DeviceDescriptor {
            device_id: "/dev/bus/usb/001/004".to_string(),
            vendor_id: 0x0dd4,
            product_id: 0x0200,
            class,
            interface_count: 1,
        }
    }

    #[test]
    fn test_printer_class_heuristic() {
        assert!(device(USB_CLASS_PRINTER).has_printer_class());
        assert!(device(USB_CLASS_PER_INTERFACE).has_printer_class());
        assert!(!device(0x03).has_printer_class());
        assert!(!device(0xff).has_printer_class());
    }

    #[test]
    fn test_bulk_out_detection() {
        let bulk_out = EndpointDescriptor {
            address: 0x02,
            kind: TransferKind::Bulk,
            direction: Direction::Out,
        };
        let bulk_in = EndpointDescriptor {
            address: 0x81,
            kind: TransferKind::Bulk,
            direction: Direction::In,
        };
        let interrupt_out = EndpointDescriptor {
            address: 0x03,
            kind: TransferKind::Interrupt,
            direction: Direction::Out,
        };

        assert!(bulk_out.is_bulk_out());
        assert!(!bulk_in.is_bulk_out());
        assert!(!interrupt_out.is_bulk_out());
    }

    #[test]
    fn test_device_display() {
        let shown = device(USB_CLASS_PRINTER).to_string();
        assert!(shown.contains("/dev/bus/usb/001/004"));
        assert!(shown.contains("0dd4:0200"));
    }

    #[test]
    fn test_descriptor_field_names() {
        let json = serde_json::to_value(device(USB_CLASS_PRINTER)).unwrap();
        assert_eq!(json["deviceId"], "/dev/bus/usb/001/004");
        assert_eq!(json["vendorId"], 0x0dd4);
        assert_eq!(json["interfaceCount"], 1);
    }
}

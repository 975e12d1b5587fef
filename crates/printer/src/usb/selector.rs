//! Printer candidate selection
//!
//! Picks the device to connect to from the attached device list: a known
//! printer vendor first, then a plausible device class, then anything.

use protocol::DeviceDescriptor;
use std::fmt;
use tracing::debug;

/// Why a device was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    /// Vendor id matches the configured printer vendor
    VendorMatch,
    /// Device class is printer or per-interface
    PrinterClass,
    /// Nothing matched; first device in enumeration order
    FirstAvailable,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionReason::VendorMatch => write!(f, "vendor match"),
            SelectionReason::PrinterClass => write!(f, "printer class"),
            SelectionReason::FirstAvailable => write!(f, "first available"),
        }
    }
}

/// The selected device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub device: &'a DeviceDescriptor,
    pub reason: SelectionReason,
}

/// Select the printer candidate from `devices`
///
/// A vendor match short-circuits the scan and wins over any class match seen
/// earlier. Returns `None` only for an empty list.
pub fn select_printer_candidate(
    devices: &[DeviceDescriptor],
    vendor_id: u16,
) -> Option<Candidate<'_>> {
    let mut class_match = None;

    for device in devices {
        debug!("Found device: {}", device);

        if device.vendor_id == vendor_id {
            debug!("Known printer vendor detected: {}", device.device_id);
            return Some(Candidate {
                device,
                reason: SelectionReason::VendorMatch,
            });
        }

        if class_match.is_none() && device.has_printer_class() {
            class_match = Some(device);
        }
    }

    if let Some(device) = class_match {
        return Some(Candidate {
            device,
            reason: SelectionReason::PrinterClass,
        });
    }

    let device = devices.first()?;
    debug!("No printer class found, using first available device");
    Some(Candidate {
        device,
        reason: SelectionReason::FirstAvailable,
    })
}

//! USB receipt printer session
//!
//! Connects an application to a single USB receipt printer: picks the device,
//! obtains access to it, holds the claimed interface and bulk OUT endpoint,
//! and pushes opaque command bytes with bounded retry. Hot-plug and
//! permission notifications are surfaced as events.
//!
//! [`PrinterService`] is the entry point; [`usb::RusbHost`] backs it with
//! libusb. The `test-utils` feature adds `test_utils::MockHost`, a scriptable
//! in-memory host.

pub mod config;
pub mod service;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod usb;

pub use config::PrinterConfig;
pub use service::PrinterService;

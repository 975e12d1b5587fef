//! Common utilities for otg-printer
//!
//! This crate provides functionality shared between the printer session and
//! its callers: error handling, logging setup, the async channel bridge to the
//! session-owning task, and test helpers.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;

pub use channel::{
    HostEvent, HostEventSink, PrinterBridge, PrinterCommand, PrinterWorker, create_printer_bridge,
};
pub use error::{Error, Result};
pub use logging::setup_logging;

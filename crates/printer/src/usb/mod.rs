//! USB subsystem
//!
//! Everything between a boundary request and the printer's bulk OUT pipe:
//! candidate selection, the permission handshake, session acquisition and
//! teardown, endpoint resolution, transfers with retry, and hot-plug routing.
//!
//! The session lives inside a single tokio task ([`worker`]); blocking
//! transfers are moved onto the blocking pool for their duration.

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod host;
pub mod hotplug;
pub mod permission;
pub mod rusb_host;
pub mod selector;
pub mod transfer;
pub mod worker;

pub use connection::{ConnectionManager, Session, WriteError};
pub use endpoint::resolve_outbound_endpoint;
pub use error::ConnectError;
pub use host::{DeviceConnection, HostError, UsbHost};
pub use hotplug::HotplugNotifier;
pub use permission::{Authorization, PermissionGate, PermissionOutcome, PermissionState};
pub use rusb_host::{RusbConnection, RusbHost};
pub use selector::{Candidate, SelectionReason, select_printer_candidate};
pub use transfer::{RetryPolicy, SendOutcome, send_with_retry};
pub use worker::{DEFAULT_VENDOR_ID, PrinterWorkerTask, WorkerSettings, spawn_printer_worker};

//! Connection manager
//!
//! Owns the single live printer session: the opened handle, the claimed
//! interface and the resolved bulk OUT endpoint. Acquisition rolls back
//! everything it took on any failure, so callers never observe a half-open
//! session.

use crate::usb::endpoint::resolve_outbound_endpoint;
use crate::usb::error::ConnectError;
use crate::usb::host::{DeviceConnection, HostError, UsbHost};
use bytes::Bytes;
use protocol::{DeviceDescriptor, EndpointDescriptor};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The printer always uses the first interface
const PRINTER_INTERFACE: u8 = 0;

/// A live connection to the printer
#[derive(Debug)]
pub struct Session<C> {
    device: DeviceDescriptor,
    connection: C,
    interface: u8,
    endpoint: EndpointDescriptor,
}

impl<C: DeviceConnection> Session<C> {
    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    /// The claimed interface number
    pub fn interface(&self) -> u8 {
        self.interface
    }

    /// The bulk OUT endpoint data is written to
    pub fn endpoint(&self) -> EndpointDescriptor {
        self.endpoint
    }

    fn write(&self, data: &[u8], timeout: Duration) -> Result<usize, HostError> {
        self.connection
            .bulk_out(self.endpoint.address, data, timeout)
    }

    fn release(mut self) {
        if let Err(e) = self.connection.release_interface(self.interface) {
            warn!("Failed to release interface {}: {}", self.interface, e);
        }
        self.connection.close();
        debug!("Closed handle to {}", self.device.device_id);
    }
}

/// Why a single bulk write did not complete
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Printer not connected")]
    NotConnected,

    #[error("bulkTransfer failed: {0}")]
    Transfer(HostError),

    #[error("Transfer aborted: {0}")]
    Fault(String),
}

/// Owner of the single printer session
pub struct ConnectionManager<H: UsbHost> {
    host: H,
    session: Option<Session<H::Connection>>,
    /// Device to reconnect to after a transient failure
    last_device: Option<DeviceDescriptor>,
}

impl<H: UsbHost> ConnectionManager<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            session: None,
            last_device: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn session(&self) -> Option<&Session<H::Connection>> {
        self.session.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Device the current (or most recent) session was opened on
    pub fn last_device(&self) -> Option<&DeviceDescriptor> {
        self.last_device.as_ref()
    }

    /// Open, claim and resolve a session over `device`
    ///
    /// Any existing session is torn down first. Permission for `device` must
    /// already be granted.
    pub fn acquire_session(
        &mut self,
        device: &DeviceDescriptor,
    ) -> Result<&Session<H::Connection>, ConnectError> {
        if self.session.is_some() {
            debug!("Replacing existing session before connecting to {}", device);
            self.teardown();
        }

        let session = Self::open_session(&self.host, device)?;

        info!(
            "Connected to printer {} (interface {}, endpoint {:#04x})",
            device,
            session.interface,
            session.endpoint.address
        );

        self.last_device = Some(device.clone());
        Ok(&*self.session.insert(session))
    }

    fn open_session(
        host: &H,
        device: &DeviceDescriptor,
    ) -> Result<Session<H::Connection>, ConnectError> {
        let mut connection = host.open(device).map_err(|e| {
            warn!("Failed to open device connection {}: {}", device.device_id, e);
            ConnectError::from_open(&device.device_id, e)
        })?;

        if device.interface_count == 0 {
            warn!("Device {} has no interfaces", device.device_id);
            connection.close();
            return Err(ConnectError::InterfaceNotFound);
        }

        let interface = match connection.interface(PRINTER_INTERFACE) {
            Ok(interface) => interface,
            Err(e) => {
                warn!("Failed to read interface {}: {}", PRINTER_INTERFACE, e);
                connection.close();
                return Err(ConnectError::InterfaceNotFound);
            }
        };

        if let Err(e) = connection.claim_interface(interface.number, true) {
            warn!("Failed to claim interface {}: {}", interface.number, e);
            connection.close();
            return Err(ConnectError::ClaimFailed {
                interface: interface.number,
                source: e,
            });
        }

        let endpoint = match resolve_outbound_endpoint(&interface) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("No BULK OUT endpoint on {}", device.device_id);
                if let Err(release) = connection.release_interface(interface.number) {
                    warn!("Failed to release interface {}: {}", interface.number, release);
                }
                connection.close();
                return Err(e);
            }
        };

        Ok(Session {
            device: device.clone(),
            connection,
            interface: interface.number,
            endpoint,
        })
    }

    /// Tear the session down and forget the device
    ///
    /// Idempotent; returns whether a session was open.
    pub fn disconnect(&mut self) -> bool {
        let was_connected = self.teardown();
        self.last_device = None;
        if was_connected {
            info!("Disconnected from printer");
        }
        was_connected
    }

    /// Tear the session down but keep the device for [`Self::reacquire`]
    pub fn teardown(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                session.release();
                true
            }
            None => false,
        }
    }

    /// Open a fresh session on the last known device
    pub fn reacquire(&mut self) -> Result<(), ConnectError> {
        let device = self
            .last_device
            .clone()
            .ok_or(ConnectError::NoDevicesFound)?;
        self.acquire_session(&device).map(|_| ())
    }

    /// Tear down the session only if it runs over `device_id`
    pub fn disconnect_if(&mut self, device_id: &str) -> bool {
        let matches = self
            .session
            .as_ref()
            .is_some_and(|s| s.device.device_id == device_id);
        if matches {
            self.disconnect();
        }
        matches
    }

    /// Write `data` to the session's bulk OUT endpoint
    ///
    /// The transfer blocks, so it runs on the blocking pool with the session
    /// moved into the job. If the job panics the session is lost and its
    /// handle closed.
    pub async fn bulk_write(&mut self, data: Bytes, timeout: Duration) -> Result<usize, WriteError> {
        let session = self.session.take().ok_or(WriteError::NotConnected)?;

        let job = tokio::task::spawn_blocking(move || {
            let result = session.write(&data, timeout);
            (session, result)
        });

        match job.await {
            Ok((session, result)) => {
                self.session = Some(session);
                result.map_err(WriteError::Transfer)
            }
            Err(e) => Err(WriteError::Fault(e.to_string())),
        }
    }
}

impl<H: UsbHost> Drop for ConnectionManager<H> {
    fn drop(&mut self) {
        self.teardown();
    }
}

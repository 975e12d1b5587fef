//! Printer worker task
//!
//! The single owner of the session. Boundary requests and platform
//! notifications arrive on the same command queue and are handled one at a
//! time, so acquisition, transfer, disconnect and hot-plug handling never
//! overlap.

use crate::usb::connection::ConnectionManager;
use crate::usb::error::ConnectError;
use crate::usb::host::UsbHost;
use crate::usb::hotplug::HotplugNotifier;
use crate::usb::permission::{Authorization, PermissionGate};
use crate::usb::selector::select_printer_candidate;
use crate::usb::transfer::{RetryPolicy, send_with_retry};
use common::{PrinterCommand, PrinterWorker};
use protocol::{
    ConnectResponse, DisconnectResponse, ErrorCode, HostSupportResponse, PrinterState,
    SendResponse, StatusResponse,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bematech
pub const DEFAULT_VENDOR_ID: u16 = 0x0DD4;

/// Tunables of the printer worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Vendor id preferred by the selector
    pub vendor_id: u16,
    pub retry: RetryPolicy,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            retry: RetryPolicy::default(),
        }
    }
}

/// Printer worker task
pub struct PrinterWorkerTask<H: UsbHost> {
    manager: ConnectionManager<H>,
    gate: PermissionGate,
    notifier: HotplugNotifier,
    worker: PrinterWorker,
    settings: WorkerSettings,
    shutdown: CancellationToken,
}

impl<H: UsbHost> PrinterWorkerTask<H> {
    pub fn new(
        host: H,
        worker: PrinterWorker,
        settings: WorkerSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            manager: ConnectionManager::new(host),
            gate: PermissionGate::new(),
            notifier: HotplugNotifier::new(),
            worker,
            settings,
            shutdown,
        }
    }

    /// Current state, derived from the session and the permission gate
    pub fn state(&self) -> PrinterState {
        if self.manager.is_connected() {
            PrinterState::Connected
        } else if self.gate.is_pending() {
            PrinterState::PermissionPending
        } else {
            PrinterState::Disconnected
        }
    }

    /// Run until shut down
    ///
    /// The worker holds a [`common::HostEventSink`] of its own, so the command
    /// queue stays open after every caller is gone; only the shutdown token or
    /// a `Shutdown` command ends the loop.
    pub async fn run(mut self) {
        info!("Printer worker started");

        loop {
            let cmd = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Shutdown requested");
                    break;
                }
                cmd = self.worker.recv_command() => cmd,
            };

            match cmd {
                Ok(PrinterCommand::Shutdown) => {
                    info!("Printer worker shutting down");
                    break;
                }
                Ok(cmd) => self.handle_command(cmd).await,
                Err(e) => {
                    debug!("Command channel closed: {}", e);
                    break;
                }
            }
        }

        self.manager.disconnect();
        info!("Printer worker stopped");
    }

    async fn handle_command(&mut self, cmd: PrinterCommand) {
        match cmd {
            PrinterCommand::CheckHostSupport { response } => {
                let supported = self.manager.host().is_host_supported();
                debug!("USB host supported: {}", supported);
                let _ = response.send(HostSupportResponse { supported });
            }

            PrinterCommand::ListDevices { response } => {
                let devices = self
                    .manager
                    .host()
                    .devices()
                    .map_err(|e| common::Error::Usb(e.to_string()));
                let _ = response.send(devices);
            }

            PrinterCommand::Connect { response } => {
                let result = self.connect();
                let _ = response.send(result);
            }

            PrinterCommand::Disconnect { response } => {
                self.manager.disconnect();
                let _ = response.send(DisconnectResponse::default());
            }

            PrinterCommand::Send {
                data,
                cancel,
                response,
            } => {
                // Shutdown interrupts the backoff as well as the caller's token
                let linked = self.shutdown.child_token();
                let watcher = tokio::spawn({
                    let linked = linked.clone();
                    async move {
                        cancel.cancelled().await;
                        linked.cancel();
                    }
                });

                let outcome =
                    send_with_retry(&mut self.manager, data, &self.settings.retry, &linked).await;
                watcher.abort();
                let _ = response.send(SendResponse::from(outcome));
            }

            PrinterCommand::Status { response } => {
                let status = StatusResponse::new(
                    self.state(),
                    self.manager.session().map(|s| s.device()),
                );
                let _ = response.send(status);
            }

            PrinterCommand::Host(event) => {
                if let Some(event) = self
                    .notifier
                    .route(event, &mut self.manager, &mut self.gate)
                {
                    self.worker.emit(event);
                }
            }

            PrinterCommand::Shutdown => {
                // Handled by the run loop
            }
        }
    }

    /// Selector, then permission gate, then connection manager
    fn connect(&mut self) -> ConnectResponse {
        let devices = match self.manager.host().devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Failed to enumerate USB devices: {}", e);
                let err = ConnectError::Unknown(e.to_string());
                return ConnectResponse::failed(err.code(), err.to_string());
            }
        };

        let Some(candidate) = select_printer_candidate(&devices, self.settings.vendor_id) else {
            let err = ConnectError::NoDevicesFound;
            warn!("{}", err);
            return ConnectResponse::failed(err.code(), err.to_string());
        };
        let device = candidate.device.clone();
        info!("Selected {} ({})", device, candidate.reason);

        match self.gate.ensure_authorized(self.manager.host(), &device) {
            Ok(Authorization::AlreadyGranted) => {}
            Ok(Authorization::RequestIssued) => {
                if self.manager.disconnect() {
                    info!("Released previous session while waiting for permission");
                }
                return ConnectResponse::failed(
                    ErrorCode::UsbPermissionDenied,
                    "Permission requested - waiting for user approval",
                );
            }
            Err(e) => {
                warn!("Permission request for {} failed: {}", device.device_id, e);
                let err = ConnectError::Unknown(e.to_string());
                return ConnectResponse::failed(err.code(), err.to_string());
            }
        }

        match self.manager.acquire_session(&device) {
            Ok(session) => ConnectResponse::connected(session.device()),
            Err(e) => {
                warn!("Connection to {} failed: {}", device.device_id, e);
                ConnectResponse::failed(e.code(), e.to_string())
            }
        }
    }
}

/// Spawn the printer worker on the tokio runtime
pub fn spawn_printer_worker<H: UsbHost>(
    host: H,
    worker: PrinterWorker,
    settings: WorkerSettings,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(PrinterWorkerTask::new(host, worker, settings, shutdown).run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockHost;
    use common::create_printer_bridge;
    use common::test_utils::{mock_keyboard, mock_printer};

    fn task(host: MockHost) -> PrinterWorkerTask<MockHost> {
        let (_bridge, worker) = create_printer_bridge(8);
        PrinterWorkerTask::new(
            host,
            worker,
            WorkerSettings::default(),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_connect_prefers_vendor() {
        let host = MockHost::new();
        host.attach(mock_keyboard(1), true);
        host.attach(mock_printer(2), true);
        let mut task = task(host);

        let response = task.connect();
        assert!(response.success);
        assert_eq!(response.vendor_id, Some(DEFAULT_VENDOR_ID));
        assert_eq!(task.state(), PrinterState::Connected);
    }

    #[test]
    fn test_connect_requests_permission() {
        let host = MockHost::new();
        host.attach(mock_printer(1), false);
        let mut task = task(host.clone());

        let response = task.connect();
        assert!(!response.success);
        assert_eq!(response.error_code, Some(ErrorCode::UsbPermissionDenied));
        assert_eq!(task.state(), PrinterState::PermissionPending);
        assert_eq!(host.opens(), 0);
    }

    #[test]
    fn test_connect_releases_session_before_permission_request() {
        let host = MockHost::new();
        let device = mock_printer(1);
        host.attach(device.clone(), true);
        let mut task = task(host.clone());
        assert!(task.connect().success);

        host.set_permission(&device.device_id, false);
        let response = task.connect();
        assert_eq!(response.error_code, Some(ErrorCode::UsbPermissionDenied));
        assert_eq!(task.state(), PrinterState::PermissionPending);
        assert_eq!(host.open_handles(), 0);
        assert_eq!(host.claimed_interfaces(), 0);
    }

    #[test]
    fn test_connect_without_devices() {
        let mut task = task(MockHost::new());

        let response = task.connect();
        assert_eq!(response.error_code, Some(ErrorCode::DeviceNotFound));
        assert_eq!(response.error.as_deref(), Some("No USB devices found"));
        assert_eq!(task.state(), PrinterState::Disconnected);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_token() {
        let host = MockHost::new();
        host.attach(mock_printer(1), true);
        let (_bridge, worker) = create_printer_bridge(8);
        let shutdown = CancellationToken::new();

        let mut task = PrinterWorkerTask::new(
            host.clone(),
            worker,
            WorkerSettings::default(),
            shutdown.clone(),
        );
        assert!(task.connect().success);

        let handle = tokio::spawn(task.run());
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(host.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_run_continues_after_callers_drop() {
        let (bridge, worker) = create_printer_bridge(8);
        let shutdown = CancellationToken::new();
        let handle = spawn_printer_worker(
            MockHost::new(),
            worker,
            WorkerSettings::default(),
            shutdown.clone(),
        );

        drop(bridge);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        shutdown.cancel();
        handle.await.unwrap();
    }
}

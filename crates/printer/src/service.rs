//! Boundary facade
//!
//! [`PrinterService`] is what the hosting application calls. Every operation
//! resolves to a structured response; a worker that is gone or dropped a
//! reply is reported as `unknownException` instead of an error.

use crate::usb::{UsbHost, WorkerSettings, spawn_printer_worker};
use bytes::Bytes;
use common::{HostEventSink, PrinterBridge, PrinterCommand, PrinterWorker, create_printer_bridge};
use protocol::{
    ConnectResponse, DeviceDescriptor, DisconnectResponse, ErrorCode, HostSupportResponse,
    PrinterEvent, PrinterState, SendPayload, SendResponse, StatusResponse,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Handle to a running printer session
pub struct PrinterService {
    bridge: PrinterBridge,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl PrinterService {
    /// Start the printer worker over `host`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<H: UsbHost>(host: H, settings: WorkerSettings, event_buffer: usize) -> Self {
        let (bridge, worker) = create_printer_bridge(event_buffer);
        Self::with_bridge(host, bridge, worker, settings)
    }

    /// Start the printer worker on an existing bridge
    ///
    /// Used when the host itself needs the bridge's event sink.
    pub fn with_bridge<H: UsbHost>(
        host: H,
        bridge: PrinterBridge,
        worker: PrinterWorker,
        settings: WorkerSettings,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let handle = spawn_printer_worker(host, worker, settings, shutdown.clone());
        info!("Printer service started");

        Self {
            bridge,
            shutdown,
            worker: Some(handle),
        }
    }

    /// Sink for platform notifications
    pub fn host_sink(&self) -> HostEventSink {
        self.bridge.host_sink()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> PrinterCommand,
    ) -> Result<T, String> {
        let (tx, rx) = oneshot::channel();
        self.bridge
            .send_command(build(tx))
            .await
            .map_err(|e| e.to_string())?;
        rx.await.map_err(|e| {
            error!("Printer worker dropped the request: {}", e);
            format!("Printer worker unavailable: {}", e)
        })
    }

    pub async fn check_host_support(&self) -> HostSupportResponse {
        self.request(|response| PrinterCommand::CheckHostSupport { response })
            .await
            .unwrap_or(HostSupportResponse { supported: false })
    }

    /// Select, authorize and open the printer
    pub async fn connect(&self) -> ConnectResponse {
        match self
            .request(|response| PrinterCommand::Connect { response })
            .await
        {
            Ok(response) => response,
            Err(e) => ConnectResponse::failed(ErrorCode::UnknownException, e),
        }
    }

    /// Tear the session down; always succeeds
    pub async fn disconnect(&self) -> DisconnectResponse {
        if let Err(e) = self
            .request(|response| PrinterCommand::Disconnect { response })
            .await
        {
            debug!("Disconnect without a worker: {}", e);
        }
        DisconnectResponse::default()
    }

    /// Decode and send a payload
    pub async fn send(&self, payload: SendPayload) -> SendResponse {
        self.send_cancellable(payload, CancellationToken::new())
            .await
    }

    /// Send a payload; cancelling `cancel` interrupts the retry backoff
    pub async fn send_cancellable(
        &self,
        payload: SendPayload,
        cancel: CancellationToken,
    ) -> SendResponse {
        self.send_bytes(payload.into_bytes(), cancel).await
    }

    /// Send raw bytes as-is
    pub async fn send_bytes(&self, data: Bytes, cancel: CancellationToken) -> SendResponse {
        debug!("Sending {} bytes", data.len());
        match self
            .request(|response| PrinterCommand::Send {
                data,
                cancel,
                response,
            })
            .await
        {
            Ok(response) => response,
            Err(e) => SendResponse::failed(ErrorCode::UnknownException, e, 0),
        }
    }

    pub async fn status(&self) -> StatusResponse {
        self.request(|response| PrinterCommand::Status { response })
            .await
            .unwrap_or_else(|_| StatusResponse::new(PrinterState::Disconnected, None))
    }

    /// Attached devices in enumeration order
    pub async fn list_devices(&self) -> common::Result<Vec<DeviceDescriptor>> {
        self.request(|response| PrinterCommand::ListDevices { response })
            .await
            .map_err(common::Error::Channel)?
    }

    /// Wait for the next attached/detached event
    ///
    /// Returns `None` once the worker is gone.
    pub async fn next_event(&self) -> Option<PrinterEvent> {
        self.bridge.recv_event().await.ok()
    }

    /// Take an already emitted event without waiting
    pub fn try_next_event(&self) -> Option<PrinterEvent> {
        self.bridge.try_recv_event()
    }

    /// Release the session and stop the worker
    pub async fn shutdown(mut self) {
        info!("Shutting down printer service");
        if let Err(e) = self.bridge.send_command(PrinterCommand::Shutdown).await {
            debug!("Printer worker already stopped: {}", e);
        }
        // Interrupts a send still backing off
        self.shutdown.cancel();
        if let Some(handle) = self.worker.take()
            && let Err(e) = handle.await
        {
            error!("Printer worker failed: {}", e);
        }
    }
}

impl Drop for PrinterService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

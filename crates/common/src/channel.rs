//! Async channel bridge between callers and the printer worker
//!
//! The printer session is owned by a single task. Boundary requests and
//! platform notifications both travel through the same command queue, so the
//! worker handles them strictly one at a time.

use async_channel::{Receiver, Sender, TrySendError, bounded};
use bytes::Bytes;
use protocol::{
    ConnectResponse, DeviceDescriptor, DisconnectResponse, HostSupportResponse, PrinterEvent,
    SendResponse, StatusResponse,
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Capacity of the command queue
const COMMAND_CAPACITY: usize = 256;

/// Notifications from the platform USB host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Device hot-plugged
    Attached { device: DeviceDescriptor },

    /// Device removed
    Detached { device_id: String },

    /// Outcome of an earlier permission request
    PermissionResult {
        device: DeviceDescriptor,
        granted: bool,
    },
}

/// Commands to the printer worker
#[derive(Debug)]
pub enum PrinterCommand {
    /// Report whether the platform can act as a USB host
    CheckHostSupport {
        response: oneshot::Sender<HostSupportResponse>,
    },

    /// Enumerate attached devices
    ListDevices {
        response: oneshot::Sender<crate::Result<Vec<DeviceDescriptor>>>,
    },

    /// Select, authorize and open the printer
    Connect {
        response: oneshot::Sender<ConnectResponse>,
    },

    /// Tear down the session (idempotent)
    Disconnect {
        response: oneshot::Sender<DisconnectResponse>,
    },

    /// Transmit a buffer with retry
    Send {
        /// Bytes to transmit, already decoded
        data: Bytes,
        /// Cancelling this token interrupts the retry loop
        cancel: CancellationToken,
        response: oneshot::Sender<SendResponse>,
    },

    /// Report the current connection status
    Status {
        response: oneshot::Sender<StatusResponse>,
    },

    /// Platform notification (hot-plug or permission outcome)
    Host(HostEvent),

    /// Release the session and stop the worker
    Shutdown,
}

/// Caller side of the bridge
#[derive(Clone)]
pub struct PrinterBridge {
    cmd_tx: Sender<PrinterCommand>,
    event_rx: Receiver<PrinterEvent>,
}

impl PrinterBridge {
    /// Send a command to the printer worker
    pub async fn send_command(&self, cmd: PrinterCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive the next emitted event
    pub async fn recv_event(&self) -> crate::Result<PrinterEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Take an already emitted event without waiting
    pub fn try_recv_event(&self) -> Option<PrinterEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Sink through which the platform delivers its notifications
    pub fn host_sink(&self) -> HostEventSink {
        HostEventSink {
            cmd_tx: self.cmd_tx.clone(),
        }
    }
}

/// Worker side of the bridge
pub struct PrinterWorker {
    cmd_rx: Receiver<PrinterCommand>,
    event_tx: Sender<PrinterEvent>,
    sink: HostEventSink,
}

impl PrinterWorker {
    /// Wait for the next command
    pub async fn recv_command(&self) -> crate::Result<PrinterCommand> {
        self.cmd_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Emit an event to the application without blocking
    ///
    /// A full or closed event channel drops the event.
    pub fn emit(&self, event: PrinterEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Event channel full, dropping {:?}", event);
            }
            Err(TrySendError::Closed(event)) => {
                debug!("No event listener, dropping {:?}", event);
            }
        }
    }

    /// Sink for re-posting platform notifications from inside the worker
    pub fn host_sink(&self) -> HostEventSink {
        self.sink.clone()
    }
}

/// Entry point for platform notifications into the command queue
#[derive(Clone)]
pub struct HostEventSink {
    cmd_tx: Sender<PrinterCommand>,
}

impl HostEventSink {
    /// Deliver a notification, blocking while the queue is full
    ///
    /// For use from the platform's own event thread, never from async code.
    pub fn notify(&self, event: HostEvent) -> crate::Result<()> {
        self.cmd_tx
            .send_blocking(PrinterCommand::Host(event))
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Deliver a notification if there is room in the queue
    pub fn try_notify(&self, event: HostEvent) -> crate::Result<()> {
        self.cmd_tx
            .try_send(PrinterCommand::Host(event))
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between callers and the printer worker
///
/// Returns (PrinterBridge for callers, PrinterWorker for the worker task).
pub fn create_printer_bridge(event_capacity: usize) -> (PrinterBridge, PrinterWorker) {
    let (cmd_tx, cmd_rx) = bounded(COMMAND_CAPACITY);
    let (event_tx, event_rx) = bounded(event_capacity.max(1));

    let sink = HostEventSink {
        cmd_tx: cmd_tx.clone(),
    };

    (
        PrinterBridge { cmd_tx, event_rx },
        PrinterWorker {
            cmd_rx,
            event_tx,
            sink,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_printer;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_printer_bridge(8);

        let (tx, _rx) = oneshot::channel();
        bridge
            .send_command(PrinterCommand::Status { response: tx })
            .await
            .unwrap();

        let cmd = worker.recv_command().await.unwrap();
        assert!(matches!(cmd, PrinterCommand::Status { .. }));
    }

    #[tokio::test]
    async fn test_host_events_share_command_queue() {
        let (bridge, worker) = create_printer_bridge(8);
        let sink = bridge.host_sink();

        sink.try_notify(HostEvent::Detached {
            device_id: "/dev/bus/usb/001/002".to_string(),
        })
        .unwrap();

        match worker.recv_command().await.unwrap() {
            PrinterCommand::Host(HostEvent::Detached { device_id }) => {
                assert_eq!(device_id, "/dev/bus/usb/001/002");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_emit_never_blocks_when_full() {
        let (bridge, worker) = create_printer_bridge(1);
        let device = mock_printer(1);

        worker.emit(PrinterEvent::attached(&device));
        worker.emit(PrinterEvent::attached(&device));

        assert!(bridge.try_recv_event().is_some());
        assert!(bridge.try_recv_event().is_none());
    }

    #[test]
    fn test_emit_without_listener() {
        let (bridge, worker) = create_printer_bridge(4);
        drop(bridge);

        worker.emit(PrinterEvent::Detached {
            device_id: "gone".to_string(),
        });
    }
}

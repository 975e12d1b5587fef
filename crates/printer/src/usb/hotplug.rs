//! Hotplug notifier
//!
//! Routes platform notifications into the session. Attach and detach become
//! application events; a permission result goes through the gate and, when
//! granted, opens the session the earlier `connect` could not.

use crate::usb::connection::ConnectionManager;
use crate::usb::host::UsbHost;
use crate::usb::permission::{PermissionGate, PermissionOutcome};
use common::HostEvent;
use protocol::PrinterEvent;
use tracing::{debug, info, warn};

/// Applies host notifications to the session state
#[derive(Debug, Default)]
pub struct HotplugNotifier;

impl HotplugNotifier {
    pub fn new() -> Self {
        Self
    }

    /// Handle one notification, returning the event to emit (if any)
    ///
    /// A detach of the session's device tears the session down before the
    /// event is produced. Detach of any other device only produces the event.
    pub fn route<H: UsbHost>(
        &self,
        event: HostEvent,
        manager: &mut ConnectionManager<H>,
        gate: &mut PermissionGate,
    ) -> Option<PrinterEvent> {
        match event {
            HostEvent::Attached { device } => {
                info!("USB device attached: {}", device);
                Some(PrinterEvent::attached(&device))
            }

            HostEvent::Detached { device_id } => {
                if manager.disconnect_if(&device_id) {
                    info!("Connected printer {} was detached", device_id);
                } else {
                    debug!("USB device detached: {}", device_id);
                }
                gate.forget(&device_id);
                Some(PrinterEvent::Detached { device_id })
            }

            HostEvent::PermissionResult { device, granted } => {
                match gate.resolve(&device, granted) {
                    PermissionOutcome::Granted(device) => {
                        match manager.acquire_session(&device) {
                            Ok(_) => info!("Connected after permission grant: {}", device),
                            Err(e) => warn!("Connection after permission grant failed: {}", e),
                        }
                    }
                    PermissionOutcome::Denied(_) | PermissionOutcome::Unsolicited => {}
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockHost;
    use common::test_utils::{mock_keyboard, mock_printer};
    use protocol::DeviceDescriptor;

    fn connected(device: &DeviceDescriptor) -> (ConnectionManager<MockHost>, MockHost) {
        let host = MockHost::new();
        host.attach(device.clone(), true);
        let mut manager = ConnectionManager::new(host.clone());
        manager.acquire_session(device).unwrap();
        (manager, host)
    }

    #[test]
    fn test_attach_emits_event_without_state_change() {
        let notifier = HotplugNotifier::new();
        let mut manager = ConnectionManager::new(MockHost::new());
        let mut gate = PermissionGate::new();
        let device = mock_printer(3);

        let event = notifier.route(
            HostEvent::Attached {
                device: device.clone(),
            },
            &mut manager,
            &mut gate,
        );

        assert_eq!(event, Some(PrinterEvent::attached(&device)));
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_detach_of_session_device_tears_down() {
        let notifier = HotplugNotifier::new();
        let device = mock_printer(1);
        let (mut manager, host) = connected(&device);
        let mut gate = PermissionGate::new();

        host.remove(&device.device_id);
        let event = notifier.route(
            HostEvent::Detached {
                device_id: device.device_id.clone(),
            },
            &mut manager,
            &mut gate,
        );

        assert_eq!(
            event,
            Some(PrinterEvent::Detached {
                device_id: device.device_id.clone()
            })
        );
        assert!(!manager.is_connected());
        assert!(manager.last_device().is_none());
        assert_eq!(host.open_handles(), 0);
    }

    #[test]
    fn test_detach_of_unrelated_device_keeps_session() {
        let notifier = HotplugNotifier::new();
        let device = mock_printer(1);
        let (mut manager, host) = connected(&device);
        let mut gate = PermissionGate::new();

        let other = mock_keyboard(2);
        let event = notifier.route(
            HostEvent::Detached {
                device_id: other.device_id.clone(),
            },
            &mut manager,
            &mut gate,
        );

        assert_eq!(event.as_ref().map(|e| e.device_id()), Some(other.device_id.as_str()));
        assert!(manager.is_connected());
        assert_eq!(host.open_handles(), 1);
    }

    #[test]
    fn test_granted_permission_connects_pending_device() {
        let notifier = HotplugNotifier::new();
        let device = mock_printer(1);
        let host = MockHost::new();
        host.attach(device.clone(), false);
        let mut manager = ConnectionManager::new(host.clone());
        let mut gate = PermissionGate::new();
        gate.ensure_authorized(&host, &device).unwrap();

        host.set_permission(&device.device_id, true);
        let event = notifier.route(
            HostEvent::PermissionResult {
                device: device.clone(),
                granted: true,
            },
            &mut manager,
            &mut gate,
        );

        assert!(event.is_none());
        assert!(manager.is_connected());
        assert_eq!(host.opens(), 1);
    }

    #[test]
    fn test_denied_or_unsolicited_permission_does_not_connect() {
        let notifier = HotplugNotifier::new();
        let device = mock_printer(1);
        let host = MockHost::new();
        host.attach(device.clone(), false);
        let mut manager = ConnectionManager::new(host.clone());
        let mut gate = PermissionGate::new();

        // nothing pending yet
        notifier.route(
            HostEvent::PermissionResult {
                device: device.clone(),
                granted: true,
            },
            &mut manager,
            &mut gate,
        );
        assert!(!manager.is_connected());

        gate.ensure_authorized(&host, &device).unwrap();
        notifier.route(
            HostEvent::PermissionResult {
                device: device.clone(),
                granted: false,
            },
            &mut manager,
            &mut gate,
        );
        assert!(!manager.is_connected());
        assert_eq!(host.opens(), 0);
    }

    #[test]
    fn test_detach_clears_pending_permission() {
        let notifier = HotplugNotifier::new();
        let device = mock_printer(1);
        let host = MockHost::new();
        host.attach(device.clone(), false);
        let mut manager = ConnectionManager::new(host.clone());
        let mut gate = PermissionGate::new();
        gate.ensure_authorized(&host, &device).unwrap();

        notifier.route(
            HostEvent::Detached {
                device_id: device.device_id.clone(),
            },
            &mut manager,
            &mut gate,
        );

        assert!(!gate.is_pending());
    }
}

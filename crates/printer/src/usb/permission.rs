//! Permission gate
//!
//! Tracks the asynchronous authorization handshake for one device at a time.
//! A request is issued without waiting; the platform answers later with a
//! permission result, which is what actually leads to a connection attempt.

use crate::usb::host::{HostError, UsbHost};
use protocol::DeviceDescriptor;
use tracing::{debug, info, warn};

/// Authorization state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PermissionState {
    #[default]
    Unrequested,
    Requested(DeviceDescriptor),
    Granted(DeviceDescriptor),
    Denied(DeviceDescriptor),
}

/// Result of [`PermissionGate::ensure_authorized`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// Already authorized; the caller may connect now
    AlreadyGranted,
    /// A request went out; the caller must wait for the result
    RequestIssued,
}

/// What a permission result means for the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// Granted for the pending device; connect to it
    Granted(DeviceDescriptor),
    /// Denied for the pending device
    Denied(DeviceDescriptor),
    /// No request was pending for this device
    Unsolicited,
}

#[derive(Debug, Default)]
pub struct PermissionGate {
    state: PermissionState,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PermissionState {
        &self.state
    }

    /// Whether a request is awaiting an answer
    pub fn is_pending(&self) -> bool {
        matches!(self.state, PermissionState::Requested(_))
    }

    /// Make sure `device` is authorized, requesting it if needed
    pub fn ensure_authorized<H: UsbHost>(
        &mut self,
        host: &H,
        device: &DeviceDescriptor,
    ) -> Result<Authorization, HostError> {
        if host.has_permission(device) {
            debug!("Permission already granted for {}", device.device_id);
            self.state = PermissionState::Granted(device.clone());
            return Ok(Authorization::AlreadyGranted);
        }

        host.request_permission(device)?;
        info!("Requesting USB permission for device: {}", device.device_id);
        self.state = PermissionState::Requested(device.clone());
        Ok(Authorization::RequestIssued)
    }

    /// Apply a permission result delivered by the platform
    ///
    /// Denial is final for this request; nothing is retried automatically.
    pub fn resolve(&mut self, device: &DeviceDescriptor, granted: bool) -> PermissionOutcome {
        let pending = match &self.state {
            PermissionState::Requested(pending) if pending.device_id == device.device_id => {
                pending.clone()
            }
            _ => {
                warn!(
                    "Ignoring permission result for {} (granted: {}), no request pending",
                    device.device_id, granted
                );
                return PermissionOutcome::Unsolicited;
            }
        };

        if granted {
            info!("USB permission granted for {}", pending.device_id);
            self.state = PermissionState::Granted(pending.clone());
            PermissionOutcome::Granted(pending)
        } else {
            warn!("Permission denied for device {}", pending);
            self.state = PermissionState::Denied(pending.clone());
            PermissionOutcome::Denied(pending)
        }
    }

    /// Drop a pending request for a device that went away
    pub fn forget(&mut self, device_id: &str) {
        if let PermissionState::Requested(pending) = &self.state
            && pending.device_id == device_id
        {
            debug!("Pending permission request for {} cleared", device_id);
            self.state = PermissionState::Unrequested;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockHost;
    use common::test_utils::{mock_keyboard, mock_printer};

    #[test]
    fn test_already_granted() {
        let device = mock_printer(1);
        let host = MockHost::new();
        host.attach(device.clone(), true);

        let mut gate = PermissionGate::new();
        assert_eq!(
            gate.ensure_authorized(&host, &device),
            Ok(Authorization::AlreadyGranted)
        );
        assert!(!gate.is_pending());
        assert_eq!(host.permission_requests(), 0);
    }

    #[test]
    fn test_request_issued_then_granted() {
        let device = mock_printer(1);
        let host = MockHost::new();
        host.attach(device.clone(), false);

        let mut gate = PermissionGate::new();
        assert_eq!(
            gate.ensure_authorized(&host, &device),
            Ok(Authorization::RequestIssued)
        );
        assert!(gate.is_pending());
        assert_eq!(host.permission_requests(), 1);

        assert_eq!(
            gate.resolve(&device, true),
            PermissionOutcome::Granted(device.clone())
        );
        assert_eq!(gate.state(), &PermissionState::Granted(device));
    }

    #[test]
    fn test_denied_is_final() {
        let device = mock_printer(1);
        let host = MockHost::new();
        host.attach(device.clone(), false);

        let mut gate = PermissionGate::new();
        gate.ensure_authorized(&host, &device).unwrap();

        assert_eq!(
            gate.resolve(&device, false),
            PermissionOutcome::Denied(device.clone())
        );
        assert!(!gate.is_pending());
        assert_eq!(host.permission_requests(), 1);
    }

    #[test]
    fn test_result_for_other_device_is_ignored() {
        let device = mock_printer(1);
        let host = MockHost::new();
        host.attach(device.clone(), false);

        let mut gate = PermissionGate::new();
        gate.ensure_authorized(&host, &device).unwrap();

        assert_eq!(
            gate.resolve(&mock_keyboard(2), true),
            PermissionOutcome::Unsolicited
        );
        assert!(gate.is_pending());
    }

    #[test]
    fn test_forget_pending_device() {
        let device = mock_printer(1);
        let host = MockHost::new();
        host.attach(device.clone(), false);

        let mut gate = PermissionGate::new();
        gate.ensure_authorized(&host, &device).unwrap();

        gate.forget("/dev/bus/usb/001/099");
        assert!(gate.is_pending());

        gate.forget(&device.device_id);
        assert_eq!(gate.state(), &PermissionState::Unrequested);
    }
}

//! Outbound endpoint resolution

use crate::usb::error::ConnectError;
use protocol::{EndpointDescriptor, InterfaceDescriptor};
use tracing::debug;

/// First bulk OUT endpoint of `interface`, in reported order
///
/// Printer firmware typically exposes a single bulk OUT pipe, so no attempt is
/// made to rank alternatives.
pub fn resolve_outbound_endpoint(
    interface: &InterfaceDescriptor,
) -> Result<EndpointDescriptor, ConnectError> {
    let endpoint = interface
        .endpoints
        .iter()
        .find(|ep| ep.is_bulk_out())
        .copied()
        .ok_or(ConnectError::EndpointNotFound)?;

    debug!(
        "Found BULK OUT endpoint {:#04x} on interface {}",
        endpoint.address, interface.number
    );
    Ok(endpoint)
}

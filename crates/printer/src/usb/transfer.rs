//! Transfer engine
//!
//! Sends a buffer through the active session with bounded retry. Receipt
//! printers stall now and then, and the OS handle can go stale while the
//! device is still present, so a failed attempt is followed by a linear
//! backoff and a full reconnect before the next one.

use crate::usb::connection::{ConnectionManager, WriteError};
use crate::usb::host::UsbHost;
use bytes::Bytes;
use protocol::{ErrorCode, SendResponse};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Retry parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up (at least 1)
    pub max_attempts: u32,
    /// Base delay; attempt `n` backs off `n` times this
    pub retry_delay: Duration,
    /// Timeout of a single bulk transfer
    pub transfer_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
            transfer_timeout: Duration::from_millis(5000),
        }
    }
}

/// Result of [`send_with_retry`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent {
        bytes_sent: usize,
        attempts: u32,
    },
    Failed {
        code: ErrorCode,
        error: String,
        attempts: u32,
    },
}

impl SendOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            SendOutcome::Sent { attempts, .. } | SendOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

impl From<SendOutcome> for SendResponse {
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::Sent {
                bytes_sent,
                attempts,
            } => SendResponse::sent(bytes_sent, attempts),
            SendOutcome::Failed {
                code,
                error,
                attempts,
            } => SendResponse::failed(code, error, attempts),
        }
    }
}

/// Sleep for `delay` unless `cancel` fires first
///
/// Returns `false` when interrupted.
async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Send `data` with bounded retry and reconnection between attempts
///
/// Fails immediately with zero attempts when no session is open. A reconnect
/// that itself fails is only logged; the next attempt then fails fast.
/// Exhausting every attempt tears the session down.
pub async fn send_with_retry<H: UsbHost>(
    manager: &mut ConnectionManager<H>,
    data: Bytes,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> SendOutcome {
    if !manager.is_connected() {
        return SendOutcome::Failed {
            code: ErrorCode::ConnectionClosed,
            error: "Printer not connected".to_string(),
            attempts: 0,
        };
    }

    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    while attempt < max_attempts {
        attempt += 1;
        debug!(
            "Send attempt {}/{} ({} bytes)",
            attempt,
            max_attempts,
            data.len()
        );

        match manager
            .bulk_write(data.clone(), policy.transfer_timeout)
            .await
        {
            Ok(bytes_sent) => {
                info!("Sent {} bytes in {} attempt(s)", bytes_sent, attempt);
                return SendOutcome::Sent {
                    bytes_sent,
                    attempts: attempt,
                };
            }
            Err(WriteError::Fault(e)) => {
                error!("Error in attempt {}: {}", attempt, e);
            }
            Err(e) => {
                warn!("Attempt {} failed: {}", attempt, e);
            }
        }

        if attempt == max_attempts {
            break;
        }

        debug!("Retrying after delay...");
        if !wait(policy.retry_delay * attempt, cancel).await {
            warn!("Retry interrupted after {} attempt(s)", attempt);
            return SendOutcome::Failed {
                code: ErrorCode::BulkTransferFailed,
                error: format!("Transfer interrupted after {} attempts", attempt),
                attempts: attempt,
            };
        }

        debug!("Attempting to reconnect...");
        manager.teardown();
        if !wait(policy.retry_delay, cancel).await {
            warn!("Retry interrupted after {} attempt(s)", attempt);
            return SendOutcome::Failed {
                code: ErrorCode::BulkTransferFailed,
                error: format!("Transfer interrupted after {} attempts", attempt),
                attempts: attempt,
            };
        }
        match manager.reacquire() {
            Ok(()) => debug!("Reconnection successful"),
            Err(e) => warn!("Reconnection failed: {}", e),
        }
    }

    error!("All {} attempts failed", max_attempts);
    manager.disconnect();
    SendOutcome::Failed {
        code: ErrorCode::BulkTransferFailed,
        error: format!("Transfer failed after {} attempts", max_attempts),
        attempts: max_attempts,
    }
}

//! Logging setup and configuration

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crates whose events are shown at the configured level
const PRINTER_TARGETS: [&str; 3] = ["printer", "otg_printer", "common"];

/// Build the filter for `level`, letting `RUST_LOG` override it
///
/// Third-party crates stay at `warn` so libusb chatter does not drown out
/// session transitions.
pub fn build_filter(level: &str) -> crate::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directives = std::iter::once("warn".to_string())
        .chain(PRINTER_TARGETS.iter().map(|t| format!("{}={}", t, level)))
        .collect::<Vec<_>>()
        .join(",");

    EnvFilter::try_new(&directives)
        .map_err(|e| crate::Error::Config(format!("Invalid log filter '{}': {}", level, e)))
}

/// Setup tracing subscriber for the application
pub fn setup_logging(level: &str) -> crate::Result<()> {
    let filter = build_filter(level)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| crate::Error::Config(format!("Logging already initialized: {}", e)))
}

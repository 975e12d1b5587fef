//! Printer configuration management

use crate::usb::{RetryPolicy, WorkerSettings};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfig {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub printer: PrinterSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "ServiceSettings::default_log_level")]
    pub log_level: String,
    /// Capacity of the attached/detached event channel
    #[serde(default = "ServiceSettings::default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            event_buffer: Self::default_event_buffer(),
        }
    }
}

impl ServiceSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_event_buffer() -> usize {
        64
    }
}

/// Printer selection and transfer tuning
///
/// # Example Configuration
/// ```toml
/// [printer]
/// vendor_id = "0x0DD4"
/// max_attempts = 3
/// retry_delay_ms = 500
/// transfer_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterSettings {
    /// Preferred vendor id, hex with `0x` prefix
    #[serde(default = "PrinterSettings::default_vendor_id")]
    pub vendor_id: String,
    #[serde(default = "PrinterSettings::default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff between attempts; attempt n waits n times this
    #[serde(default = "PrinterSettings::default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "PrinterSettings::default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            vendor_id: Self::default_vendor_id(),
            max_attempts: Self::default_max_attempts(),
            retry_delay_ms: Self::default_retry_delay_ms(),
            transfer_timeout_ms: Self::default_transfer_timeout_ms(),
        }
    }
}

impl PrinterSettings {
    fn default_vendor_id() -> String {
        format!("{:#06X}", crate::usb::DEFAULT_VENDOR_ID)
    }

    fn default_max_attempts() -> u32 {
        3
    }

    fn default_retry_delay_ms() -> u64 {
        500
    }

    fn default_transfer_timeout_ms() -> u64 {
        5000
    }

    /// Parsed vendor id
    pub fn vendor_id(&self) -> Result<u16> {
        parse_hex_id(&self.vendor_id, "vendor_id")
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            service: ServiceSettings::default(),
            printer: PrinterSettings::default(),
        }
    }
}

impl PrinterConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/otg-printer/printer.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: PrinterConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("otg-printer").join("printer.toml")
        } else {
            PathBuf::from(".config/otg-printer/printer.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.service.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.service.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.service.event_buffer == 0 {
            return Err(anyhow!("event_buffer must be greater than 0"));
        }

        self.printer.vendor_id()?;

        if self.printer.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }

        if self.printer.transfer_timeout_ms == 0 {
            return Err(anyhow!("transfer_timeout_ms must be greater than 0"));
        }

        Ok(())
    }

    /// Settings for the printer worker
    pub fn worker_settings(&self) -> Result<WorkerSettings> {
        Ok(WorkerSettings {
            vendor_id: self.printer.vendor_id()?,
            retry: RetryPolicy {
                max_attempts: self.printer.max_attempts.max(1),
                retry_delay: Duration::from_millis(self.printer.retry_delay_ms),
                transfer_timeout: Duration::from_millis(self.printer.transfer_timeout_ms),
            },
        })
    }
}

/// Parse a `0x`-prefixed 16-bit hex id
fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    let hex_part = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .ok_or_else(|| {
            anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x0DD4')",
                name,
                id
            )
        })?;

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
}

/// Load a configuration file, expanding `~` in the path
pub fn load_config(path: &str) -> Result<PrinterConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    PrinterConfig::load(Some(path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PrinterConfig::default();
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.printer.vendor_id, "0x0DD4");
        assert_eq!(config.printer.vendor_id().unwrap(), 0x0DD4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_hex_id() {
        assert_eq!(parse_hex_id("0x0dd4", "VID").unwrap(), 0x0dd4);
        assert_eq!(parse_hex_id("0XFFFF", "VID").unwrap(), 0xffff);
        assert!(parse_hex_id("0dd4", "VID").is_err());
        assert!(parse_hex_id("0x", "VID").is_err());
        assert!(parse_hex_id("0x12345", "VID").is_err());
        assert!(parse_hex_id("0xGHIJ", "VID").is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = PrinterConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: PrinterConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.service.log_level, parsed.service.log_level);
        assert_eq!(config.printer.vendor_id, parsed.printer.vendor_id);
        assert_eq!(config.printer.max_attempts, parsed.printer.max_attempts);
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = PrinterConfig::default();
        assert!(config.validate().is_ok());

        config.service.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.service.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_printer_settings() {
        let mut config = PrinterConfig::default();
        config.printer.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = PrinterConfig::default();
        config.printer.transfer_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = PrinterConfig::default();
        config.service.event_buffer = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_settings() {
        let mut config = PrinterConfig::default();
        config.printer.vendor_id = "0x04b8".to_string();
        config.printer.retry_delay_ms = 10;

        let settings = config.worker_settings().unwrap();
        assert_eq!(settings.vendor_id, 0x04b8);
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.retry.retry_delay, Duration::from_millis(10));
        assert_eq!(settings.retry.transfer_timeout, Duration::from_millis(5000));
    }
}

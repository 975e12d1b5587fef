//! otg-printer
//!
//! Command line front end for the USB receipt printer session: checks host
//! support, lists devices, connects and prints raw command bytes.

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use common::{create_printer_bridge, setup_logging};
use printer::config::{self, PrinterConfig};
use printer::usb::{RusbHost, select_printer_candidate};
use printer::{PrinterService, usb::WorkerSettings};
use protocol::{ConnectResponse, SendPayload};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "otg-printer")]
#[command(author, version, about = "USB receipt printer session manager")]
#[command(long_about = "
Connects to a single USB receipt printer and sends raw command bytes
(ESC/POS or anything else the printer understands) to it.

EXAMPLES:
    # Show attached devices and which one would be used
    otg-printer list

    # Print base64-encoded commands
    otg-printer print G0BIZWxsbwo=

    # Print plain text
    otg-printer print 'Hello'

    # Print a prepared binary job
    otg-printer print --file ~/receipt.bin

    # Follow attach/detach events
    otg-printer watch --log-level debug

CONFIGURATION:
    The configuration is looked up in the following order:
    1. Path specified with --config
    2. ~/.config/otg-printer/printer.toml
    3. /etc/otg-printer/printer.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether this host can act as a USB host
    Support,
    /// List USB devices and the printer candidate
    List,
    /// Connect and show the connection status
    Status,
    /// Connect and send data to the printer
    Print {
        /// Base64 command bytes, or plain text sent as UTF-8
        #[arg(required_unless_present = "file")]
        data: Option<String>,

        /// Send the raw contents of a file instead
        #[arg(short, long, value_name = "PATH", conflicts_with = "data")]
        file: Option<String>,
    },
    /// Connect and log attach/detach events until Ctrl+C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = PrinterConfig::default();
        let path = PrinterConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        config::load_config(path).context("Failed to load configuration")?
    } else {
        PrinterConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.service.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("otg-printer v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let Some(command) = args.command else {
        return Err(anyhow!("No command given, see --help"));
    };

    let settings = config
        .worker_settings()
        .context("Invalid printer settings")?;

    let (bridge, worker) = create_printer_bridge(config.service.event_buffer);
    let host = RusbHost::new(bridge.host_sink()).context("Failed to initialize libusb")?;

    let pump_cancel = CancellationToken::new();
    let pump = host
        .spawn_event_pump(pump_cancel.clone())
        .context("Failed to spawn USB event thread")?;

    let service = PrinterService::with_bridge(host, bridge, worker, settings);

    let result = run_command(&service, command, settings).await;

    info!("Shutting down USB subsystem...");
    service.shutdown().await;
    pump_cancel.cancel();
    if let Err(e) = pump.join() {
        error!("USB event thread panicked: {:?}", e);
    }

    result
}

async fn run_command(
    service: &PrinterService,
    command: Command,
    settings: WorkerSettings,
) -> Result<()> {
    match command {
        Command::Support => {
            let response = service.check_host_support().await;
            print_json(&response)
        }
        Command::List => list_devices(service, settings.vendor_id).await,
        Command::Status => {
            connect(service).await?;
            print_json(&service.status().await)
        }
        Command::Print { data, file } => {
            connect(service).await?;

            let response = match (data, file) {
                (_, Some(path)) => {
                    let path = PathBuf::from(shellexpand::tilde(&path).as_ref());
                    let bytes = std::fs::read(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    service
                        .send_bytes(Bytes::from(bytes), CancellationToken::new())
                        .await
                }
                (Some(data), None) => service.send(SendPayload::from(data.as_str())).await,
                (None, None) => return Err(anyhow!("Nothing to print")),
            };

            print_json(&response)?;
            if !response.success {
                return Err(anyhow!(
                    "Print failed after {} attempt(s)",
                    response.attempts
                ));
            }
            Ok(())
        }
        Command::Watch => watch(service).await,
    }
}

/// Connect, failing with the reported error
async fn connect(service: &PrinterService) -> Result<ConnectResponse> {
    let response = service.connect().await;
    if !response.success {
        print_json(&response)?;
        return Err(anyhow!(
            "Connect failed: {}",
            response.error.as_deref().unwrap_or("unknown error")
        ));
    }
    Ok(response)
}

/// List USB devices and the one the selector would pick
async fn list_devices(service: &PrinterService, vendor_id: u16) -> Result<()> {
    let devices = service
        .list_devices()
        .await
        .context("Failed to list USB devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    println!("Found {} USB device(s):\n", devices.len());
    for device in &devices {
        println!(
            "  {} {:04x}:{:04x} class {:#04x}, {} interface(s)",
            device.device_id,
            device.vendor_id,
            device.product_id,
            device.class,
            device.interface_count
        );
    }

    if let Some(candidate) = select_printer_candidate(&devices, vendor_id) {
        println!(
            "\nPrinter candidate: {} ({})",
            candidate.device.device_id, candidate.reason
        );
    }
    Ok(())
}

/// Log attach/detach events until Ctrl+C
async fn watch(service: &PrinterService) -> Result<()> {
    let response = service.connect().await;
    print_json(&response)?;

    info!("Watching USB events, press Ctrl+C to stop");
    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                    Err(e) => error!("Error waiting for Ctrl+C: {}", e),
                }
                break;
            }
            event = service.next_event() => match event {
                Some(event) => print_json(&event)?,
                None => break,
            },
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode response")?
    );
    Ok(())
}

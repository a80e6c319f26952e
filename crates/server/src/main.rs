//! Peripheral server
//!
//! Exposes a USB receipt printer and a USB postal scale over a small JSON
//! HTTP API.

use anyhow::{Context, Result};
use clap::Parser;
use common::{ConfigStore, setup_logging};
use server::config::{self, ServerConfig};
use server::http::{self, AppState};
use server::service::PeripheralService;
use server::usb::RusbBus;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "peripheral-server")]
#[command(
    author,
    version,
    about = "Peripheral server - USB receipt printer and postal scale over HTTP"
)]
#[command(long_about = "
Drives a USB receipt printer and a USB postal scale on behalf of HTTP clients.

EXAMPLES:
    # Run with default config
    peripheral-server

    # Run with custom config
    peripheral-server --config ~/peripherals.toml

    # List USB devices without starting server
    peripheral-server --list-devices

    # Listen on another address with debug logging
    peripheral-server --bind 127.0.0.1:9000 --log-level debug

CONFIGURATION:
    The server looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/peripheral-usb/server.toml
    3. /etc/peripheral-usb/server.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// HTTP listen address, overrides the config file
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ServerConfig::default();
        let path = ServerConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    // Load configuration first (to get log level from config if not specified)
    let config = if let Some(ref path) = args.config {
        ServerConfig::load(Some(config::expand_path(path)))
            .context("Failed to load configuration")?
    } else {
        ServerConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.server.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("Peripheral server v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let bus = RusbBus::new().context("Failed to initialize USB context")?;

    let peripherals = config
        .peripheral_config()
        .context("Invalid peripheral configuration")?;
    if let Some(identity) = peripherals.printer.identity {
        info!("Printer bound to {}", identity);
    }
    if let Some(identity) = peripherals.scale.identity {
        info!("Scale bound to {}", identity);
    }

    let service = PeripheralService::new(
        bus,
        Arc::new(ConfigStore::new(peripherals)),
        config.server.transfer_timeout(),
    );

    if args.list_devices {
        return list_devices_mode(&service);
    }

    let bind = args.bind.as_deref().unwrap_or(&config.server.bind_addr);
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", bind))?;

    let state = AppState::new(Arc::new(service), config.server.request_timeout());

    http::serve(state, addr, shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// List USB devices and exit
fn list_devices_mode(service: &PeripheralService<RusbBus>) -> Result<()> {
    info!("Listing USB devices...");

    let devices = service
        .list_devices()
        .context("Failed to enumerate USB devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
    } else {
        println!("Found {} USB device(s):\n", devices.len());
        for device in devices {
            println!(
                "  {} - {} {}",
                device.identity,
                device
                    .manufacturer
                    .as_deref()
                    .unwrap_or("Unknown Manufacturer"),
                device.product.as_deref().unwrap_or("Unknown Product")
            );
            println!(
                "      Bus {:03} Device {:03}",
                device.bus_number, device.device_address
            );
            println!();
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }
}

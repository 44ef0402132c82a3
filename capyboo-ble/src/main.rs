//! BLE provisioning tool for Capyboo robots
//!
//! Scans for Capyboo robots and sends WiFi credentials or text commands via
//! BLE. Set RUST_LOG=debug to see the BLE lifecycle.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use capyboo_ble_controller::ble::BtleRadio;
use capyboo_ble_controller::{CONFIG_FILE, ControllerConfig, Provisioner, capyboo_home};
use clap::{Parser, Subcommand};
use log::debug;

type BoxError = Box<dyn std::error::Error>;

#[derive(Parser)]
#[command(name = "capyboo-ble")]
#[command(about = "BLE provisioning tool for Capyboo robots")]
struct Cli {
    /// Config file [default: $CAPYBOO_HOME/config.json]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for nearby BLE devices
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Send WiFi credentials to a robot
    Provision {
        /// Advertised device name [default: from config, "Capyboo"]
        #[arg(short, long)]
        device: Option<String>,
        /// WiFi SSID
        #[arg(long, required_unless_present = "file", conflicts_with = "file")]
        ssid: Option<String>,
        /// WiFi password (omit for open networks)
        #[arg(long, conflicts_with = "file")]
        password: Option<String>,
        /// WiFi credentials file (SSID on line 1, password on line 2, taken verbatim)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Stay connected until Ctrl-C instead of disconnecting right away
        #[arg(long)]
        keep_connected: bool,
    },
    /// Send a text command (e.g. weather, animation, timer)
    Send {
        /// Advertised device name [default: from config, "Capyboo"]
        #[arg(short, long)]
        device: Option<String>,
        /// Command text
        text: String,
    },
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective config
    Show,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => capyboo_home()?.join(CONFIG_FILE),
    };
    debug!("Using config {}", config_path.display());

    match cli.command {
        Commands::Config { action } => config_command(&config_path, action)?,
        Commands::Scan { duration } => {
            let config = ControllerConfig::load_or_default(&config_path)?;
            scan_devices(&config, duration).await?;
        }
        Commands::Provision {
            device,
            ssid,
            password,
            file,
            keep_connected,
        } => {
            let config = ControllerConfig::load_or_default(&config_path)?;
            let (ssid, password) = match file {
                Some(file) => read_wifi_credentials(&file)?,
                None => (ssid.unwrap_or_default(), password.unwrap_or_default()),
            };
            let device = device.unwrap_or_else(|| config.device_name.clone());
            provision_device(&config, &device, &ssid, &password, keep_connected).await?;
        }
        Commands::Send { device, text } => {
            let config = ControllerConfig::load_or_default(&config_path)?;
            let device = device.unwrap_or_else(|| config.device_name.clone());
            send_command(&config, &device, &text).await?;
        }
    }

    Ok(())
}

fn config_command(path: &Path, action: ConfigCommands) -> Result<(), BoxError> {
    match action {
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                let path = path.display();
                return Err(format!("{path} already exists, use --force to overwrite").into());
            }
            ControllerConfig::default().save(path)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigCommands::Show => {
            let config = ControllerConfig::load_or_default(path)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn read_wifi_credentials(file: &Path) -> Result<(String, String), BoxError> {
    let content = std::fs::read_to_string(file)?;
    let mut lines = content.lines();
    let ssid = lines.next().ok_or("Missing SSID in credentials file")?.to_string();
    let password = lines.next().unwrap_or_default().to_string();
    Ok((ssid, password))
}

/// Drive `work` to completion, or tear the link down if Ctrl-C comes first.
async fn until_interrupted<T, E>(
    provisioner: &Provisioner<BtleRadio>,
    work: impl Future<Output = Result<T, E>>,
) -> Result<T, BoxError>
where
    E: Into<BoxError>,
{
    tokio::select! {
        result = work => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted, disconnecting...");
            provisioner.teardown().await;
            Err("interrupted".into())
        }
    }
}

async fn scan_devices(config: &ControllerConfig, duration: u64) -> Result<(), BoxError> {
    let provisioner = Provisioner::system(config).await?;
    until_interrupted(&provisioner, provisioner.await_ready()).await?;

    println!("Scanning for BLE devices ({} seconds)...", duration);
    let found = until_interrupted(
        &provisioner,
        provisioner.adapter().discover(Duration::from_secs(duration)),
    )
    .await?;

    println!("\nFound {} devices:", found.len());
    for advertisement in found {
        let name = advertisement.name.as_deref().unwrap_or("Unknown");
        let rssi = advertisement
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "N/A".to_string());
        let marker = if name == config.device_name { " [CAPYBOO]" } else { "" };

        println!("  {} ({}) RSSI: {}{}", name, advertisement.id, rssi, marker);
    }

    Ok(())
}

async fn provision_device(
    config: &ControllerConfig,
    device: &str,
    ssid: &str,
    password: &str,
    keep_connected: bool,
) -> Result<(), BoxError> {
    let provisioner = Provisioner::system(config).await?;

    println!("Provisioning {}...", device);
    println!("  SSID: {}", ssid);
    let result = until_interrupted(&provisioner, provisioner.run(device, ssid, password)).await;
    if let Err(e) = result {
        provisioner.teardown().await;
        return Err(e);
    }

    println!("WiFi credentials sent! {} will now attempt to connect to the WiFi network.", device);

    if keep_connected {
        println!("Staying connected, press Ctrl-C to disconnect.");
        tokio::signal::ctrl_c().await?;
    }

    provisioner.disconnect().await?;
    println!("Disconnected from {}", device);
    Ok(())
}

async fn send_command(config: &ControllerConfig, device: &str, text: &str) -> Result<(), BoxError> {
    let provisioner = Provisioner::system(config).await?;

    let sent = until_interrupted(&provisioner, async {
        provisioner.await_ready().await?;
        let handle = provisioner.scan(device).await?;
        println!("Found device: {}", handle);
        provisioner.connect(&handle).await?;
        println!("Connected!");
        println!("Sending {:?}...", text.trim());
        provisioner.send_text(text).await
    })
    .await;

    provisioner.teardown().await;
    sent?;
    println!("Command sent!");
    Ok(())
}

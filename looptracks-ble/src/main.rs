//! BLE setup tool for Loop Tracks indicators
//!
//! Finds a Loop Tracks device, connects, and walks it through Wi-Fi, transit
//! system and line color setup.

mod settings;

use std::io::{self, BufRead, Write};
use std::time::Duration;

use clap::{Parser, Subcommand};
use looptracks_ble_controller::{
    btle, SessionConfig, SessionHandle, SessionState, Wizard, WizardStep,
};
use looptracks_proto::{Acknowledgement, LineColor, TransitSystem};
use tokio::sync::broadcast;

use settings::Settings;

// Pre-filled answers for the Wi-Fi prompts
const DEFAULT_SSID: &str = "WCL";
const DEFAULT_PASSWORD: &str = "atmega328";

#[derive(Parser)]
#[command(name = "looptracks-ble")]
#[command(about = "BLE setup tool for Loop Tracks indicators")]
struct Cli {
    /// Seconds to wait for a connection, and for the device to answer
    #[arg(short, long, global = true, default_value = "10")]
    wait: u64,

    /// Delay in milliseconds before rescanning after a dropped link
    #[arg(long, global = true, default_value = "0")]
    rescan_backoff_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for Loop Tracks devices
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    #[command(flatten)]
    Device(DeviceCommand),
}

/// Commands that need a connected device
#[derive(Subcommand)]
enum DeviceCommand {
    /// Send WiFi credentials to a device
    Wifi {
        /// WiFi SSID (read from --file when omitted)
        #[arg(long, requires = "password")]
        ssid: Option<String>,
        /// WiFi password
        #[arg(long, requires = "ssid")]
        password: Option<String>,
        /// WiFi credentials file (SSID on line 1, password on line 2)
        #[arg(short, long, default_value = "wifi_credentials.txt")]
        file: String,
    },
    /// Select the transit system (cta or mbta)
    City { system: TransitSystem },
    /// Assign a line color to the line the indicator is flashing
    Color { color: LineColor },
    /// Reset the device's transit setup (WiFi is kept)
    Reset,
    /// Show connection status and saved progress
    Status,
    /// Walk through every setup step interactively
    Wizard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let wait = Duration::from_secs(cli.wait);
    let config = SessionConfig {
        rescan_backoff: Duration::from_millis(cli.rescan_backoff_ms),
        ..SessionConfig::default()
    };

    match cli.command {
        Commands::Scan { duration } => scan_devices(duration).await,
        Commands::Device(command) => run(command, config, wait).await,
    }
}

async fn run(
    command: DeviceCommand,
    config: SessionConfig,
    wait: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings_path = settings::settings_path()?;
    let settings = Settings::load(&settings_path)?;

    let session = connect(config, wait).await?;
    let mut acks = session.acknowledgements();
    let mut wizard = Wizard::with_progress(session, settings.progress());

    match command {
        DeviceCommand::Wifi { ssid, password, file } => {
            let (ssid, password) = match (ssid, password) {
                (Some(ssid), Some(password)) => (ssid, password),
                _ => read_wifi_credentials(&file)?,
            };
            println!("Sending WiFi credentials...");
            println!("  SSID: {}", ssid);
            wizard.set_wifi(&ssid, &password).await?;
            report_ack(&mut acks, wait).await;
        }
        DeviceCommand::City { system } => {
            wizard.set_train_system(system).await?;
            report_ack(&mut acks, wait).await;
        }
        DeviceCommand::Color { color } => {
            if let Some(system) = wizard.progress().train_system {
                if !system.supports(color) {
                    println!("Warning: {} has no {} line", system, color);
                }
            }
            wizard.set_color(color).await?;
            report_ack(&mut acks, wait).await;
        }
        DeviceCommand::Reset => {
            wizard.reset_configuration().await?;
            println!("Reset command sent! The device keeps its WiFi and will restart.");
        }
        DeviceCommand::Status => print_status(&wizard),
        DeviceCommand::Wizard => run_wizard(&mut wizard, &mut acks, wait).await?,
    }

    Settings::from_progress(wizard.progress()).save(&settings_path)?;
    Ok(())
}

fn read_wifi_credentials(file: &str) -> Result<(String, String), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    let mut lines = content.lines();
    let ssid = lines
        .next()
        .ok_or("Missing SSID in credentials file")?
        .trim()
        .to_string();
    let password = lines
        .next()
        .ok_or("Missing password in credentials file")?
        .trim()
        .to_string();
    Ok((ssid, password))
}

async fn scan_devices(duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    println!("Scanning for Loop Tracks devices ({} seconds)...", duration);

    let adapter = btle::first_adapter().await?;
    let devices = btle::scan(&adapter, Duration::from_secs(duration)).await?;

    println!("\nFound {} devices:", devices.len());
    for device in devices {
        let rssi = device
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "N/A".to_string());
        println!("  {} ({}) RSSI: {}", device.name, device.address, rssi);
    }
    Ok(())
}

async fn connect(
    config: SessionConfig,
    wait: Duration,
) -> Result<SessionHandle, Box<dyn std::error::Error>> {
    println!("Scanning for a Loop Tracks device...");
    let session = btle::start(config).await?;

    let status = tokio::time::timeout(wait, session.wait_for(SessionState::Connected))
        .await
        .map_err(|_| "No Loop Tracks device found")??;

    println!(
        "Connected to {}",
        status.peripheral.as_deref().unwrap_or("Unknown device")
    );
    Ok(session)
}

/// Print whatever the device answers first. The protocol carries no request
/// id, so this is simply the next line it sends.
async fn report_ack(acks: &mut broadcast::Receiver<Acknowledgement>, wait: Duration) {
    match tokio::time::timeout(wait, acks.recv()).await {
        Ok(Ok(Acknowledgement::Ok)) => println!("Device: ok"),
        Ok(Ok(Acknowledgement::KnownError(e))) => println!("Device rejected: {}", e),
        Ok(Ok(Acknowledgement::Unknown(line))) => println!("Device: {}", line),
        Ok(Err(e)) => log::debug!("Acknowledgement stream: {e}"),
        Err(_) => println!("No answer from device (command may still have been applied)"),
    }
}

fn print_status(wizard: &Wizard) {
    let status = wizard.session().status();
    println!("Session: {:?}", status.state);
    if let Some(name) = status.peripheral {
        println!("Device: {}", name);
    }

    let progress = wizard.progress();
    println!("WiFi sent: {}", if progress.wifi_done { "yes" } else { "no" });
    match progress.train_system {
        Some(system) => println!("Transit system: {}", system),
        None => println!("Transit system: not set"),
    }
    if progress.colors.is_empty() {
        println!("Line colors: none assigned");
    } else {
        let colors: Vec<&str> = progress.colors.iter().map(|c| c.as_str()).collect();
        println!("Line colors: {}", colors.join(", "));
    }
    println!("Next step: {:?}", wizard.step());
}

async fn run_wizard(
    wizard: &mut Wizard,
    acks: &mut broadcast::Receiver<Acknowledgement>,
    wait: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        match wizard.step() {
            WizardStep::Scanning => {
                println!("Lost the device, scanning...");
                let session = wizard.session().clone();
                tokio::time::timeout(wait, session.wait_for(SessionState::Connected))
                    .await
                    .map_err(|_| "No Loop Tracks device found")??;
            }
            WizardStep::Wifi => {
                let ssid = prompt("WiFi SSID", DEFAULT_SSID)?;
                let password = prompt("WiFi password", DEFAULT_PASSWORD)?;
                match wizard.set_wifi(&ssid, &password).await {
                    Ok(()) => report_ack(acks, wait).await,
                    Err(e) => println!("{}", e),
                }
            }
            WizardStep::TrainSystem => {
                let default = wizard
                    .progress()
                    .train_system
                    .unwrap_or(TransitSystem::Cta);
                let answer = prompt("Transit system (cta/mbta)", default.as_str())?;
                match answer.parse::<TransitSystem>() {
                    Ok(system) => {
                        wizard.set_train_system(system).await?;
                        report_ack(acks, wait).await;
                    }
                    Err(e) => println!("{}", e),
                }
            }
            WizardStep::Color => {
                let colors = wizard.colors();
                if colors.is_empty() {
                    println!("Every line has a color.");
                    return Ok(());
                }
                println!("Select the line color matching the flashing line:");
                for (color, label) in colors {
                    println!("  {:<7} {}", color.as_str(), label);
                }
                let answer = prompt("Line color (blank to finish, 'reset' to start over)", "")?;
                match answer.as_str() {
                    "" => return Ok(()),
                    "reset" => {
                        wizard.reset_configuration().await?;
                        println!("Reset command sent.");
                    }
                    token => match token.parse::<LineColor>() {
                        Ok(color) => {
                            wizard.set_color(color).await?;
                            report_ack(acks, wait).await;
                        }
                        Err(e) => println!("{}", e),
                    },
                }
            }
        }
    }
}

fn prompt(label: &str, default: &str) -> io::Result<String> {
    if default.is_empty() {
        print!("{}: ", label);
    } else {
        print!("{} [{}]: ", label, default);
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let answer = line.trim();
    Ok(if answer.is_empty() { default } else { answer }.to_string())
}

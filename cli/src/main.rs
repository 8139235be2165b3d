// airscout — Operator Console
//
// Desktop front end for the airscout control plane. The `demo` subcommand
// drives a complete session against the in-process simulated peripheral;
// `encode` and `parse` are protocol debugging tools.

mod sim;

use std::sync::Arc;

use airscout_core::{
    parse, Command, ConnectionState, Session, SessionConfig, WifiCatalog, WifiNetwork,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use serde::Serialize;

use sim::{SimFault, SimPeripheral, SimWifiScanner};

#[derive(Parser)]
#[command(name = "airscout")]
#[command(about = "Airscout — BLE control plane for a Wi-Fi auditing peripheral", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a complete session against the simulated peripheral
    Demo {
        /// Emit the final session snapshot as JSON
        #[arg(long)]
        json: bool,
        /// Arm the simulated firmware with a fault to demonstrate the
        /// failure handling
        #[arg(long, value_enum)]
        fault: Option<SimFault>,
    },
    /// Encode an operator command to its wire payload
    Encode {
        #[command(subcommand)]
        command: EncodeCommand,
    },
    /// Parse a notification frame into its typed event
    Parse {
        /// Raw frame, e.g. "MAC|SNIFF|mac=AA:BB:CC:DD:EE:FF|rssi=-42|ch=6"
        frame: String,
    },
}

#[derive(Subcommand)]
enum EncodeCommand {
    /// Start sniffing a target network
    SniffStart {
        #[arg(long)]
        ssid: String,
        #[arg(long)]
        bssid: String,
        #[arg(long)]
        channel: i32,
    },
    /// Stop the active sniff
    SniffStop,
    /// Start deauthenticating a station
    DeauthStart {
        #[arg(long)]
        target: String,
        #[arg(long)]
        ap: String,
        #[arg(long)]
        channel: i32,
    },
    /// Stop the active deauth
    DeauthStop,
    /// Start broadcasting a beacon
    BeaconStart {
        #[arg(long)]
        ssid: String,
        #[arg(long)]
        channel: i32,
    },
    /// Clear the peripheral's MAC table
    ClearMac,
    /// Clear the peripheral's Wi-Fi target state
    ClearWifi,
}

impl From<EncodeCommand> for Command {
    fn from(cmd: EncodeCommand) -> Self {
        match cmd {
            EncodeCommand::SniffStart {
                ssid,
                bssid,
                channel,
            } => Command::SniffStart {
                ssid,
                bssid,
                channel,
            },
            EncodeCommand::SniffStop => Command::SniffStop,
            EncodeCommand::DeauthStart {
                target,
                ap,
                channel,
            } => Command::DeauthStart {
                target_mac: target,
                ap_mac: ap,
                channel,
            },
            EncodeCommand::DeauthStop => Command::DeauthStop,
            EncodeCommand::BeaconStart { ssid, channel } => Command::BeaconStart { ssid, channel },
            EncodeCommand::ClearMac => Command::ClearMac,
            EncodeCommand::ClearWifi => Command::ClearWifi,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo { json, fault } => run_demo(json, fault).await,
        Commands::Encode { command } => {
            println!("{}", Command::from(command).encode());
            Ok(())
        }
        Commands::Parse { frame } => {
            println!("{:#?}", parse(&frame));
            Ok(())
        }
    }
}

/// Everything the demo observed, for `--json` output.
#[derive(Serialize)]
struct DemoSnapshot {
    state: ConnectionState,
    networks: Vec<WifiNetwork>,
    target: Option<WifiNetwork>,
    macs: Vec<airscout_core::MacSighting>,
    sniffer_log: Vec<String>,
    deauth_log: Vec<String>,
    status: Option<String>,
}

fn pump(session: &Session, peripheral: &SimPeripheral) {
    while let Some(event) = peripheral.poll() {
        session.handle_adapter_event(event);
    }
}

async fn run_demo(json: bool, fault: Option<SimFault>) -> Result<()> {
    let mut config = SessionConfig::default();
    if fault == Some(SimFault::Timeout) {
        // Nobody wants to watch a 15-second demo of nothing happening.
        config.connection.connect_timeout = std::time::Duration::from_secs(2);
    }

    let peripheral = Arc::new(SimPeripheral::new(fault));
    let session = Session::new(
        Arc::clone(&peripheral) as Arc<dyn airscout_core::BleAdapter>,
        config,
    )?;
    let mut notices = session.subscribe_notices();

    // 1. Discover the peripheral.
    if !json {
        println!("{}", "Scanning for BLE peripherals...".bold());
    }
    session.start_scan();
    pump(&session, &peripheral);
    session.stop_scan();

    let devices = session.devices();
    let probe = devices
        .iter()
        .find(|d| d.display_name().starts_with("Airscout"))
        .context("no Airscout peripheral found in scan results")?
        .clone();

    if !json {
        for device in &devices {
            let marker = if device.address == probe.address {
                "*".green().bold()
            } else {
                " ".normal()
            };
            println!(
                "  {} {}  {}",
                marker,
                device.address.cyan(),
                device.display_name()
            );
        }
    }

    // 2. Connect and run the handshake.
    session.select_device(probe);
    session.connect()?;
    pump(&session, &peripheral);

    if fault == Some(SimFault::Timeout) {
        // No callbacks are coming; wait out the supervisory timer.
        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
    }

    let state = session.state();
    if state != ConnectionState::Ready {
        println!("{} {}", "Link:".bold(), state.to_string().red().bold());
        while let Ok(notice) = notices.try_recv() {
            println!("{} {}", "Notice:".bold(), notice.yellow());
        }
        session.reset_session();
        println!("{} {}", "Session:".bold(), session.state().to_string().dimmed());
        return Ok(());
    }
    if !json {
        println!("{} {}", "Link:".bold(), "Ready".green().bold());
    }

    // 3. Pick the strongest nearby network as the target.
    let catalog = WifiCatalog::new();
    catalog.scan(&SimWifiScanner);
    let networks = catalog.networks();
    let target = networks
        .iter()
        .max_by_key(|n| n.signal_level)
        .context("Wi-Fi scan returned no networks")?
        .clone();
    catalog.select(target.clone());

    if !json {
        println!("{}", "Wi-Fi networks:".bold());
        for network in &networks {
            println!(
                "    {:<28} {:>4} dBm  ch {}",
                network.display_name(),
                network.signal_level,
                network.channel
            );
        }
        println!("{} {}", "Target:".bold(), target.display_name().yellow());
    }

    // 4. Sniff the target.
    session.set_target_network(Some(target.clone()));
    session.push_local_sniffer_log(format!("sniffing {}", target.display_name()));
    session.send_command(Command::SniffStart {
        ssid: target.ssid.clone(),
        bssid: target.bssid.clone(),
        channel: target.channel,
    });
    pump(&session, &peripheral);
    session.send_command(Command::SniffStop);
    pump(&session, &peripheral);

    // 5. Deauth the loudest station we saw.
    if let Some(station) = session.macs().first().cloned() {
        session.push_local_deauth_log(format!("deauthing {}", station.mac));
        session.send_command(Command::DeauthStart {
            target_mac: station.mac,
            ap_mac: target.bssid.clone(),
            channel: target.channel,
        });
        pump(&session, &peripheral);
        session.send_command(Command::DeauthStop);
        pump(&session, &peripheral);
    }

    if json {
        let snapshot = DemoSnapshot {
            state: session.state(),
            networks,
            target: session.target_network(),
            macs: session.macs(),
            sniffer_log: session.sniffer_log(),
            deauth_log: session.deauth_log(),
            status: session.status(),
        };
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", "Stations seen:".bold());
        for sighting in session.macs() {
            println!(
                "    {}  {:>4} dBm  ch {}",
                sighting.mac.cyan(),
                sighting.rssi,
                sighting.channel
            );
        }
        println!("{}", "Sniffer log:".bold());
        for line in session.sniffer_log() {
            println!("    {line}");
        }
        println!("{}", "Deauth log:".bold());
        for line in session.deauth_log() {
            println!("    {line}");
        }
        if let Some(status) = session.status() {
            println!("{} {}", "Status:".bold(), status);
        }
    }

    // 6. Graceful teardown.
    session.handle_disconnect().await;
    pump(&session, &peripheral);
    if !json {
        println!(
            "{} {}",
            "Session:".bold(),
            format!("{}", session.state()).dimmed()
        );
    }

    Ok(())
}

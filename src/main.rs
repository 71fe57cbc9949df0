//! Command-line front end for SMAPI charge thresholds.
//!
//! Usage:
//!   smapi-charge get                 # print start and stop of BAT0
//!   smapi-charge get --json
//!   smapi-charge set 40 80           # start charging below 40%, stop at 80%
//!   smapi-charge set-one stop 0      # stop threshold back to default (100%)
//!   smapi-charge --battery 1 --port 0xB2 --attempts 3 get
//!
//! Must run as root. Set RUST_LOG to control logging:
//!   RUST_LOG=trace smapi-charge get

use clap::{Parser, Subcommand};
use log::{error, info};
use smapi_charge::config::parse_port;
use smapi_charge::{Battery, PortIo, RetryPolicy, Smapi, SmapiConfig, SmapiError, ThresholdKind};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "smapi-charge")]
#[command(about = "Read and set ThinkPad battery charge thresholds via SMAPI")]
struct Cli {
    /// SMAPI command port
    #[arg(short, long, default_value = "0xB2", value_parser = port_arg)]
    port: u16,

    /// Battery index (0 for BAT0, 1 for BAT1)
    #[arg(short, long, default_value = "0", value_parser = battery_arg)]
    battery: Battery,

    /// Lock file serializing SMAPI access between processes
    #[arg(long, default_value = smapi_charge::constants::DEFAULT_LOCK_PATH)]
    lock_file: PathBuf,

    /// Do not take the lock file
    #[arg(long)]
    no_lock: bool,

    /// Total attempts per call while firmware answers "try again" (1 = no retry)
    #[arg(short, long, default_value = "1")]
    attempts: u32,

    /// Pause between attempts in milliseconds
    #[arg(long, default_value = "100")]
    backoff_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the start and stop thresholds
    Get {
        /// Print a JSON report instead
        #[arg(long)]
        json: bool,
    },
    /// Set the start threshold, then the stop threshold
    Set {
        /// Start charging below this percentage (0 = default, 98%)
        start: u8,
        /// Stop charging at this percentage (0 = default, 100%)
        stop: u8,
    },
    /// Set a single threshold
    SetOne {
        /// start or stop
        #[arg(value_parser = kind_arg)]
        kind: ThresholdKind,
        value: u8,
    },
}

fn port_arg(s: &str) -> std::result::Result<u16, SmapiError> {
    parse_port(s)
}

fn battery_arg(s: &str) -> std::result::Result<Battery, String> {
    let index = s
        .parse::<u8>()
        .map_err(|e| format!("{}: {}", s, e))?;
    Battery::from_index(index).map_err(|e| e.to_string())
}

fn kind_arg(s: &str) -> std::result::Result<ThresholdKind, SmapiError> {
    s.parse()
}

fn retry_policy(cli: &Cli) -> RetryPolicy {
    RetryPolicy::new(cli.attempts, Duration::from_millis(cli.backoff_ms))
}

fn run(cli: Cli) -> std::result::Result<(), Box<dyn Error>> {
    let lock_path = (!cli.no_lock).then_some(cli.lock_file.clone());
    let config = SmapiConfig::default()
        .with_command_port(cli.port)
        .with_lock_path(lock_path);
    let policy = retry_policy(&cli);
    let battery = cli.battery;

    info!("Requesting I/O permissions for port {:#04x}", config.command_port);
    let port_io = PortIo::open(&config)?;
    info!("SMAPI ports open (command port {:#04x})", port_io.command_port());
    let smapi = Smapi::new(port_io);

    match cli.command {
        Commands::Get { json } => {
            info!("Reading {} thresholds", battery);
            let report = policy.run(|| smapi.read_thresholds(battery))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
        }
        Commands::Set { start, stop } => {
            info!("Setting {} start to {}", battery, start);
            policy.run(|| smapi.set_threshold(battery, ThresholdKind::Start, start))?;
            info!("Setting {} stop to {}", battery, stop);
            policy.run(|| smapi.set_threshold(battery, ThresholdKind::Stop, stop))?;
        }
        Commands::SetOne { kind, value } => {
            info!("Setting {} {} to {}", battery, kind, value);
            policy.run(|| smapi.set_threshold(battery, kind, value))?;
        }
    }

    Ok(())
}

fn main() {
    // Initialize logger with default info level if RUST_LOG is not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{}", e);
        if let Some(source) = e.source() {
            error!("  caused by: {}", source);
        }
        std::process::exit(1);
    }
}

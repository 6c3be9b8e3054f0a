//! SPL Meter CLI
//!
//! Polls a USB sound level meter and prints rolling averages.

use clap::{Parser, Subcommand};
use spl_meter_agent::{
    config::Config,
    device::{hid_available, DefaultTransport, DeviceSession, StopToken},
    monitor::{self, ReportFormat, RunOptions},
    MonotonicClock, VERSION,
};
use std::io;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spl-meter")]
#[command(version = VERSION)]
#[command(about = "Rolling sound level averages from a USB HID meter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the meter and print averages once per second
    Run {
        /// Seconds to run before stopping (runs forever if absent or invalid)
        duration: Option<String>,

        /// USB vendor id in hex (e.g. 10c4)
        #[arg(long, value_parser = parse_hex_u16)]
        vendor_id: Option<u16>,

        /// USB product id in hex (e.g. 82cd)
        #[arg(long, value_parser = parse_hex_u16)]
        product_id: Option<u16>,

        /// Exit on the first device error instead of reconnecting
        #[arg(long)]
        no_reconnect: bool,

        /// Report format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Take a single reading without reconnecting
    Read {
        /// USB vendor id in hex (e.g. 10c4)
        #[arg(long, value_parser = parse_hex_u16)]
        vendor_id: Option<u16>,

        /// USB product id in hex (e.g. 82cd)
        #[arg(long, value_parser = parse_hex_u16)]
        product_id: Option<u16>,
    },

    /// Show configuration
    Config,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            duration,
            vendor_id,
            product_id,
            no_reconnect,
            format,
        } => {
            cmd_run(
                duration.as_deref(),
                vendor_id,
                product_id,
                no_reconnect,
                &format,
            );
        }
        Commands::Read {
            vendor_id,
            product_id,
        } => {
            cmd_read(vendor_id, product_id);
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

/// Log to stderr so reports on stdout stay clean.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn cmd_run(
    duration: Option<&str>,
    vendor_id: Option<u16>,
    product_id: Option<u16>,
    no_reconnect: bool,
    format: &str,
) {
    let format: ReportFormat = match format.parse() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    let duration = parse_runtime(duration);
    if duration.is_none() {
        eprintln!("Running forever.");
    }

    let config = load_config(vendor_id, product_id);
    require_hid();

    let stop = StopToken::new();
    ctrlc_handler(stop.clone());

    let mut session = DeviceSession::new(
        DefaultTransport::new(),
        config.device.clone(),
        &config.aggregator,
        MonotonicClock,
    )
    .with_stop_token(stop);

    // Without reconnects nothing else would ever open the device.
    if no_reconnect {
        if let Err(e) = session.open() {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }

    let options = RunOptions {
        duration,
        auto_reconnect: !no_reconnect,
        format,
        ..RunOptions::from_config(&config)
    };

    let stdout = io::stdout();
    let mut sink = stdout.lock();
    let result = monitor::run(&mut session, &options, &mut sink);

    eprintln!();
    eprintln!("{}", session.stats().summary());

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_read(vendor_id: Option<u16>, product_id: Option<u16>) {
    let config = load_config(vendor_id, product_id);
    require_hid();

    let mut session = DeviceSession::new(
        DefaultTransport::new(),
        config.device.clone(),
        &config.aggregator,
        MonotonicClock,
    );

    // The first read needs an open device; a single-shot read never reconnects.
    let result = session.open().and_then(|_| session.value(false));
    match result {
        Ok(value) => println!("{value}dBA"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: {e}; showing defaults");
        Config::default()
    });

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!("Native HID support: {}", if hid_available() { "yes" } else { "no" });
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Load the config file and apply command line overrides.
fn load_config(vendor_id: Option<u16>, product_id: Option<u16>) -> Config {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    };
    if let Some(vid) = vendor_id {
        config.device.vendor_id = vid;
    }
    if let Some(pid) = product_id {
        config.device.product_id = pid;
    }
    config
}

fn require_hid() {
    if !hid_available() {
        eprintln!("Error: built without native HID support.");
        eprintln!();
        eprintln!("Rebuild with `--features hid` to talk to the meter.");
        std::process::exit(1);
    }
}

/// Seconds to run; anything missing or unparsable means forever.
fn parse_runtime(arg: Option<&str>) -> Option<Duration> {
    arg.and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex id '{s}': {e}"))
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(stop: StopToken) {
    ctrlc::set_handler(move || {
        stop.stop();
    })
    .expect("Error setting Ctrl+C handler");
}

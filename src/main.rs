use std::process::exit;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use tripsync::{
    run_session, EngineConfig, GattConfig, GattTransport, JsonLinesExporter, SyncMode,
};

#[derive(Parser, Debug)]
#[command(name = "tripsync", about = "Sync trip tracker records over BLE")]
struct Args {
    /// Advertised BLE name of the tracker (e.g. TripTracker)
    device: String,

    /// Protocol flow to run
    #[arg(long, value_enum, default_value = "sync")]
    mode: Mode,

    /// Output file for the exported records (JSON lines, appended)
    #[arg(long, default_value = "tripsync-log.jsonl")]
    output: String,

    /// Abort the session if no notification arrives for this many seconds
    #[arg(long, default_value_t = 30)]
    stall_timeout_secs: u64,

    /// Give up scanning for the device after this many seconds
    #[arg(long, default_value_t = 30)]
    scan_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Fetch everything recorded for the current day
    Day,
    /// Fetch events past the persisted sync cursor
    Sync,
}

impl From<Mode> for SyncMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Day => SyncMode::DayFetch,
            Mode::Sync => SyncMode::Incremental,
        }
    }
}

fn main() {
    tripsync::logging::init_logging();
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();

    let mut gatt = GattConfig::for_device(&args.device);
    gatt.scan_timeout = Duration::from_secs(args.scan_timeout_secs);

    println!("Connecting to {} ...", args.device);
    let mut transport = GattTransport::connect(&gatt)
        .await
        .context("connecting to tracker")?;
    let mut notifications = transport
        .subscribe()
        .await
        .context("subscribing to notifications")?;

    let config = EngineConfig {
        stall_timeout: Duration::from_secs(args.stall_timeout_secs),
        ..Default::default()
    };
    let mut sink = JsonLinesExporter::new(&args.output);

    match run_session(
        args.mode.into(),
        &mut transport,
        &mut notifications,
        &mut sink,
        &config,
    )
    .await
    .context("synchronization failed")?
    {
        Some(report) => {
            println!(
                "Done: {} records written to {}",
                report.timeline.len(),
                args.output
            );
        }
        None => println!("Nothing to sync."),
    }
    Ok(())
}

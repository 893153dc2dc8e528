//! # Drone Telemetry
//!
//! Samples the drone's onboard sensors and publishes their readings.
//!
//! Proximity and accelerometer readings are written to stdout as JSON records.
//! Camera frames are streamed to a single TCP client as length-prefixed frames.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use drone_telemetry::config::Config;
use drone_telemetry::protocol::decoder::read_frame;
use drone_telemetry::protocol::frame::{FrameEvent, DEFAULT_DECODER_MAX_PAYLOAD};
use drone_telemetry::sampler::LoopReport;
use drone_telemetry::sensor::SampleSource;
use drone_telemetry::session::{
    simulated_source, start_multiplexed, Devices, RecordOutput, SensorKind, SensorSession,
};
use drone_telemetry::sink::{record_channel, spawn_record_writer};

#[derive(Parser, Debug)]
#[command(name = "drone-telemetry", version)]
#[command(about = "Sample drone sensors and publish telemetry", long_about = None)]
struct Args {
    /// Configuration file (TOML); built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use simulated sensors instead of hardware
    #[arg(short, long, global = true)]
    simulate: bool,

    /// Camera stream port (overrides the configuration file)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Stop after this many readings per sensor
    #[arg(short = 'n', long, global = true)]
    count: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ultrasonic distance records on stdout
    Proximity,

    /// Accelerometer records on stdout
    Accelerometer,

    /// Camera frames to one TCP client, timing metadata on stdout
    Camera,

    /// Proximity and accelerometer records multiplexed on stdout
    All,

    /// Connect to a camera stream and count frames until the terminator
    Receive {
        /// Host running the camera stream
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
    },
}

/// Main entry point for Drone Telemetry
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging to stderr (stdout carries records only)
///    - Load configuration and apply command line overrides
///    - Install the Ctrl+C handler that cancels every session
///
/// 2. **Sampling**
///    - Run the selected sensor session(s) until cancelled, exhausted or failed
///
/// 3. **Shutdown**
///    - Sessions release their devices and sockets
///    - Camera clients receive the terminator frame on graceful exit
///
/// # Errors
///
/// Returns error if configuration cannot be loaded, a device cannot be opened,
/// the stream cannot be bound, or a sink write fails
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let (log_writer, _log_guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(log_writer)
        .init();

    info!("Drone Telemetry v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            signal_cancel.cancel();
        }
    });

    match args.command {
        Command::Proximity => run_sensor(SensorKind::Proximity, config, &args, cancel).await,
        Command::Accelerometer => {
            run_sensor(SensorKind::Accelerometer, config, &args, cancel).await
        }
        Command::Camera => run_sensor(SensorKind::Camera, config, &args, cancel).await,
        Command::All => run_all(config, &args, cancel).await,
        Command::Receive { host } => {
            receive(SocketAddr::new(host, config.server.port), cancel).await
        }
    }
}

fn open_source(
    kind: SensorKind,
    config: &Config,
    simulate: bool,
    devices: &mut Option<Devices>,
) -> Result<Box<dyn SampleSource>> {
    if simulate {
        info!("Using simulated {} sensor", kind);
        return Ok(simulated_source(kind, config)?);
    }

    let devices = devices.get_or_insert_with(|| Devices::detect(config));
    devices
        .take_source(kind, config)
        .with_context(|| format!("Failed to open {} sensor", kind))
}

fn log_report(kind: SensorKind, report: &LoopReport) {
    info!(
        "{} finished ({:?}): {} readings, {} cycles skipped",
        kind, report.exit, report.emitted, report.skipped
    );
}

async fn run_sensor(
    kind: SensorKind,
    config: Config,
    args: &Args,
    cancel: CancellationToken,
) -> Result<()> {
    let source = open_source(kind, &config, args.simulate, &mut None)?;

    let mut session = SensorSession::with_cancel(config, cancel).with_max_readings(args.count);
    session.start(kind, source, RecordOutput::Stdout).await?;
    if let Some(addr) = session.stream_addr() {
        info!("Camera stream ready on {}", addr);
    }

    let report = session.wait().await?;
    log_report(kind, &report);
    Ok(())
}

async fn run_all(config: Config, args: &Args, cancel: CancellationToken) -> Result<()> {
    let (sender, receiver) = record_channel();
    let writer = spawn_record_writer(tokio::io::stdout(), receiver);

    // Sessions own the only senders, so the writer stops once they all end
    let mut devices = None;
    let sessions = start_multiplexed(
        &[SensorKind::Proximity, SensorKind::Accelerometer],
        &config,
        &cancel,
        args.count,
        sender,
        |kind| open_source(kind, &config, args.simulate, &mut devices),
    )
    .await?;

    let results = wait_all(sessions, &cancel).await;

    let written = writer.await.context("record writer panicked")??;
    debug!("Record writer wrote {} records", written);

    for (kind, result) in results {
        log_report(kind, &result?);
    }
    Ok(())
}

/// Wait for every session concurrently; a failure stops the others too
async fn wait_all(
    sessions: Vec<(SensorKind, SensorSession)>,
    cancel: &CancellationToken,
) -> Vec<(SensorKind, drone_telemetry::error::Result<LoopReport>)> {
    let mut waiters = JoinSet::new();
    for (kind, mut session) in sessions {
        let cancel = cancel.clone();
        waiters.spawn(async move {
            let result = session.wait().await;
            if let Err(e) = &result {
                warn!("{} session failed, stopping all sensors: {}", kind, e);
                cancel.cancel();
            }
            (kind, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = waiters.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!("Session waiter failed: {}", e),
        }
    }
    results
}

async fn receive(addr: SocketAddr, cancel: CancellationToken) -> Result<()> {
    let mut stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to camera stream at {}", addr))?;
    info!("Connected to camera stream at {}", addr);

    let mut frames: u64 = 0;
    let mut bytes: u64 = 0;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Stopped before the end of stream");
                break;
            }
            event = read_frame(&mut stream, DEFAULT_DECODER_MAX_PAYLOAD) => event?,
        };

        match event {
            FrameEvent::Data(frame) => {
                frames += 1;
                bytes += frame.wire_size() as u64;
                debug!("Frame {}: {} bytes", frames, frame.length());
            }
            FrameEvent::End => {
                info!("End of stream");
                break;
            }
        }
    }

    info!("Received {} frames ({} bytes on the wire)", frames, bytes);
    Ok(())
}

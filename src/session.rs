//! # Sensor Session
//!
//! One run of one sensor: open the device (and the stream listener for the
//! camera), drive the sample loop, release everything on the single exit path.
//!
//! Each session starts its index at 0 and binds a fresh listener. Sessions
//! share nothing except an optional record channel and cancellation token.

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, TelemetryError};
use crate::hal::i2c::LinuxI2cBus;
use crate::hal::sysfs::SysfsGpio;
use crate::hal::{Camera, Gpio, I2cBus};
use crate::sampler::{IndexCounter, LoopExit, LoopReport, SampleLoop, CAMERA_INDEX_MODULUS};
use crate::sensor::accelerometer::{AccelerometerSource, Mpu6050};
use crate::sensor::camera::CameraSource;
use crate::sensor::proximity::{ProximityPins, UltrasonicSource};
use crate::sensor::simulator::{ProximitySweep, SimulatedCamera, SimulatedImu};
use crate::sensor::SampleSource;
use crate::sink::{ChannelSink, FrameSink, TextSink};
use crate::stream::{FrameTransport, StreamServer};

/// Sensor driven by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Proximity,
    Accelerometer,
    Camera,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Proximity => "proximity",
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Camera => "camera",
        };
        f.write_str(name)
    }
}

/// Hardware handles available to sessions
///
/// Each handle is moved into the first session that needs it.
#[derive(Default)]
pub struct Devices {
    pub gpio: Option<Box<dyn Gpio>>,
    pub bus: Option<Box<dyn I2cBus>>,
    pub camera: Option<Box<dyn Camera>>,
}

impl Devices {
    /// Open the hardware interfaces this platform exposes
    ///
    /// GPIO comes from sysfs and the I2C bus from `/dev/i2c-N`. No camera
    /// driver ships, so one must be supplied by the caller.
    pub fn detect(config: &Config) -> Self {
        let gpio = match SysfsGpio::with_root(&config.proximity.gpio_root) {
            Ok(gpio) => Some(Box::new(gpio) as Box<dyn Gpio>),
            Err(e) => {
                warn!("GPIO unavailable: {}", e);
                None
            }
        };

        let bus = match LinuxI2cBus::open(config.accelerometer.bus) {
            Ok(bus) => Some(Box::new(bus) as Box<dyn I2cBus>),
            Err(e) => {
                warn!("I2C bus unavailable: {}", e);
                None
            }
        };

        Self {
            gpio,
            bus,
            camera: None,
        }
    }

    /// Build the hardware sample source for `kind`
    ///
    /// # Errors
    ///
    /// Returns `Device` error if no driver for the sensor is available
    pub fn take_source(&mut self, kind: SensorKind, config: &Config) -> Result<Box<dyn SampleSource>> {
        match kind {
            SensorKind::Proximity => {
                let gpio = self.gpio.take().ok_or_else(|| missing_driver("GPIO"))?;
                let pins = ProximityPins {
                    trigger: config.proximity.trigger_pin,
                    echo: config.proximity.echo_pin,
                };
                Ok(Box::new(UltrasonicSource::new(gpio, pins, config.proximity.settle())))
            }
            SensorKind::Accelerometer => {
                let bus = self.bus.take().ok_or_else(|| missing_driver("I2C bus"))?;
                let device = Mpu6050::new(bus, config.accelerometer.address);
                Ok(Box::new(AccelerometerSource::new(device)))
            }
            SensorKind::Camera => {
                let camera = self.camera.take().ok_or_else(|| missing_driver("camera"))?;
                Ok(Box::new(CameraSource::new(camera)))
            }
        }
    }
}

fn missing_driver(what: &str) -> TelemetryError {
    TelemetryError::Device(format!("no {} driver available; run with --simulate", what))
}

/// Build the simulated sample source for `kind`
///
/// # Errors
///
/// Returns error if the simulator configuration is invalid
pub fn simulated_source(kind: SensorKind, config: &Config) -> Result<Box<dyn SampleSource>> {
    let sim = &config.simulator;
    match kind {
        SensorKind::Proximity => Ok(Box::new(ProximitySweep::new())),
        SensorKind::Accelerometer => {
            let address = config.accelerometer.address;
            let [x, y, z] = sim.acceleration;
            let mut imu = SimulatedImu::new(address, sim.accel_range)?.with_acceleration(x, y, z);
            imu.set_temperature(sim.temperature);
            Ok(Box::new(AccelerometerSource::new(Mpu6050::new(imu, address))))
        }
        SensorKind::Camera => {
            let camera = match sim.camera_frames {
                0 => SimulatedCamera::unlimited(),
                frames => SimulatedCamera::with_limit(frames),
            };
            Ok(Box::new(CameraSource::new(camera)))
        }
    }
}

/// Where telemetry records go
#[derive(Debug, Clone)]
pub enum RecordOutput {
    /// Written directly to standard output
    Stdout,

    /// Handed to a shared record writer task
    Channel(mpsc::Sender<Vec<u8>>),
}

/// Lifecycle of one sensor run
pub struct SensorSession {
    config: Config,
    cancel: CancellationToken,
    max_readings: Option<u64>,
    stream_addr: Option<SocketAddr>,
    task: Option<JoinHandle<Result<LoopReport>>>,
}

impl SensorSession {
    pub fn new(config: Config) -> Self {
        Self::with_cancel(config, CancellationToken::new())
    }

    /// Create a session stopped by an externally owned token
    pub fn with_cancel(config: Config, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            max_readings: None,
            stream_addr: None,
            task: None,
        }
    }

    /// Stop after `limit` emitted readings
    pub fn with_max_readings(mut self, limit: Option<u64>) -> Self {
        self.max_readings = limit;
        self
    }

    /// Token that stops this session
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Address of the camera stream listener, once started
    pub fn stream_addr(&self) -> Option<SocketAddr> {
        self.stream_addr
    }

    /// Start sampling `source` as sensor `kind`
    ///
    /// For the camera the listener is bound before this returns; the spawned
    /// task then waits for the client and streams frames to it.
    ///
    /// # Errors
    ///
    /// Returns error if the session is already running or the listener cannot
    /// be bound
    pub async fn start(
        &mut self,
        kind: SensorKind,
        source: Box<dyn SampleSource>,
        output: RecordOutput,
    ) -> Result<()> {
        if self.task.is_some() {
            return Err(TelemetryError::Task(format!("{} session already started", kind)));
        }

        let cancel = self.cancel.clone();
        let limit = self.max_readings;

        let task = match kind {
            SensorKind::Proximity | SensorKind::Accelerometer => {
                let period = match kind {
                    SensorKind::Proximity => self.config.proximity.period(),
                    _ => self.config.accelerometer.period(),
                };
                match output {
                    RecordOutput::Stdout => tokio::spawn(
                        SampleLoop::new(source, TextSink::stdout(), period, cancel)
                            .with_max_readings(limit)
                            .run(),
                    ),
                    RecordOutput::Channel(sender) => tokio::spawn(
                        SampleLoop::new(source, ChannelSink::new(sender), period, cancel)
                            .with_max_readings(limit)
                            .run(),
                    ),
                }
            }
            SensorKind::Camera => {
                let server = StreamServer::bind(self.config.server.socket_addr()?).await?;
                self.stream_addr = Some(server.local_addr());

                let camera = self.config.camera.clone();
                let metadata = match output {
                    RecordOutput::Stdout => camera.print_metadata,
                    RecordOutput::Channel(_) => {
                        if camera.print_metadata {
                            warn!("Frame metadata disabled while stdout is shared");
                        }
                        false
                    }
                };
                let counter = if camera.wrap_index {
                    IndexCounter::wrapping(CAMERA_INDEX_MODULUS)
                } else {
                    IndexCounter::unbounded()
                };

                tokio::spawn(async move {
                    let mut server = server;
                    if let Err(e) = server.accept(&cancel).await {
                        server.close().await;
                        return match e {
                            TelemetryError::Cancelled => Ok(LoopReport {
                                exit: LoopExit::Cancelled,
                                emitted: 0,
                                skipped: 0,
                            }),
                            e => Err(e),
                        };
                    }

                    if metadata {
                        let sink = FrameSink::with_metadata(server, tokio::io::stdout());
                        SampleLoop::new(source, sink, camera.period(), cancel)
                            .with_counter(counter)
                            .with_max_readings(limit)
                            .run()
                            .await
                    } else {
                        SampleLoop::new(source, FrameSink::new(server), camera.period(), cancel)
                            .with_counter(counter)
                            .with_max_readings(limit)
                            .run()
                            .await
                    }
                })
            }
        };

        info!("{} session started", kind);
        self.task = Some(task);
        Ok(())
    }

    /// Wait for the session to end on its own
    ///
    /// # Errors
    ///
    /// Returns the loop's error, or `Task` error if the session was never
    /// started or its task panicked
    pub async fn wait(&mut self) -> Result<LoopReport> {
        let task = self
            .task
            .take()
            .ok_or_else(|| TelemetryError::Task("session not started".to_string()))?;

        task.await.map_err(|e| TelemetryError::Task(e.to_string()))?
    }

    /// Cancel the session and wait for it to release its resources
    ///
    /// # Errors
    ///
    /// Same as [`wait`](Self::wait)
    pub async fn stop(&mut self) -> Result<LoopReport> {
        self.cancel.cancel();
        self.wait().await
    }
}

/// Start one session per sensor in `kinds`, all writing to `sender`
///
/// Every source is opened before any session starts, so a sensor that fails to
/// open leaves nothing running. Sessions share `cancel`; if a later start
/// fails, the sessions already running are stopped before returning.
///
/// # Errors
///
/// Returns the first open or start failure
pub async fn start_multiplexed<F, E>(
    kinds: &[SensorKind],
    config: &Config,
    cancel: &CancellationToken,
    max_readings: Option<u64>,
    sender: mpsc::Sender<Vec<u8>>,
    mut open: F,
) -> std::result::Result<Vec<(SensorKind, SensorSession)>, E>
where
    F: FnMut(SensorKind) -> std::result::Result<Box<dyn SampleSource>, E>,
    E: From<TelemetryError>,
{
    let sources = kinds
        .iter()
        .map(|&kind| open(kind).map(|source| (kind, source)))
        .collect::<std::result::Result<Vec<_>, E>>()?;

    let mut sessions: Vec<(SensorKind, SensorSession)> = Vec::with_capacity(sources.len());
    for (kind, source) in sources {
        let mut session = SensorSession::with_cancel(config.clone(), cancel.clone())
            .with_max_readings(max_readings);
        if let Err(e) = session
            .start(kind, source, RecordOutput::Channel(sender.clone()))
            .await
        {
            cancel.cancel();
            for (running_kind, mut running) in sessions {
                if let Err(stop_error) = running.wait().await {
                    warn!("{} session failed while stopping: {}", running_kind, stop_error);
                }
            }
            return Err(e.into());
        }
        sessions.push((kind, session));
    }
    Ok(sessions)
}

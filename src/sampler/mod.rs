//! # Sampler Module
//!
//! Fixed-cadence sampling loop driving one source into one sink.
//!
//! Each iteration:
//! 1. Checks cancellation and the optional reading limit
//! 2. Polls the source on the blocking pool
//! 3. Stamps an emitted reading with the wall-clock time and the loop index
//! 4. Sleeps for the configured period, waking early on cancellation
//!
//! Skipped cycles emit nothing and leave the index unchanged.

pub mod index;

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryError};
use crate::sensor::{SampleOutcome, SampleSource, StampedReading};
use crate::sink::Sink;

pub use index::{IndexCounter, CAMERA_INDEX_MODULUS};

/// Why a loop stopped without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The cancellation token fired
    Cancelled,

    /// The source ran out of readings or the reading limit was reached
    Exhausted,
}

/// Summary of a finished loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopReport {
    pub exit: LoopExit,

    /// Readings handed to the sink
    pub emitted: u64,

    /// Cycles that produced no reading
    pub skipped: u64,
}

/// Sampling loop for one source and one sink
pub struct SampleLoop<S, K> {
    source: Option<S>,
    sink: K,
    period: Duration,
    counter: IndexCounter,
    cancel: CancellationToken,
    max_readings: Option<u64>,
}

impl<S: SampleSource, K: Sink> SampleLoop<S, K> {
    /// Create a loop with an unbounded index and no reading limit
    pub fn new(source: S, sink: K, period: Duration, cancel: CancellationToken) -> Self {
        Self {
            source: Some(source),
            sink,
            period,
            counter: IndexCounter::unbounded(),
            cancel,
            max_readings: None,
        }
    }

    /// Use a different index counter
    pub fn with_counter(mut self, counter: IndexCounter) -> Self {
        self.counter = counter;
        self
    }

    /// Stop after `limit` emitted readings
    pub fn with_max_readings(mut self, limit: Option<u64>) -> Self {
        self.max_readings = limit;
        self
    }

    /// Run until cancellation, exhaustion or a fatal error
    ///
    /// On a clean exit the sink is finished, which for a frame sink sends the
    /// terminator. On error the sink is aborted and the error returned.
    ///
    /// # Errors
    ///
    /// Returns the first source, sink or task error encountered
    pub async fn run(mut self) -> Result<LoopReport> {
        let name = self.source.as_ref().map(|s| s.name()).unwrap_or("unknown");
        info!("Starting {} loop (period {:?})", name, self.period);

        let mut report = LoopReport {
            exit: LoopExit::Exhausted,
            emitted: 0,
            skipped: 0,
        };

        match self.drive(&mut report).await {
            Ok(exit) => {
                report.exit = exit;
                self.sink.finish().await?;
                info!(
                    "{} loop stopped ({:?}): {} readings, {} skipped",
                    name, exit, report.emitted, report.skipped
                );
                Ok(report)
            }
            Err(e) => {
                warn!("{} loop failed after {} readings: {}", name, report.emitted, e);
                self.sink.abort().await;
                Err(e)
            }
        }
    }

    async fn drive(&mut self, report: &mut LoopReport) -> Result<LoopExit> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(LoopExit::Cancelled);
            }
            if self.max_readings.is_some_and(|limit| report.emitted >= limit) {
                return Ok(LoopExit::Exhausted);
            }

            match self.poll_source().await? {
                SampleOutcome::Ready(reading) => {
                    let stamped = StampedReading {
                        reading,
                        timestamp_ms: chrono::Utc::now().timestamp_millis(),
                        index: self.counter.current(),
                    };
                    self.sink.emit(stamped).await?;
                    self.counter.advance();
                    report.emitted += 1;
                }
                SampleOutcome::Skipped => {
                    report.skipped += 1;
                    debug!("No reading this cycle");
                }
                SampleOutcome::Exhausted => return Ok(LoopExit::Exhausted),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(LoopExit::Cancelled),
                _ = tokio::time::sleep(self.period) => {}
            }
        }
    }

    /// Poll the source once on the blocking pool
    async fn poll_source(&mut self) -> Result<SampleOutcome> {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| TelemetryError::Task("sample source lost".to_string()))?;

        let (source, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = source.sample();
            (source, outcome)
        })
        .await
        .map_err(|e| TelemetryError::Task(e.to_string()))?;

        self.source = Some(source);
        outcome
    }
}

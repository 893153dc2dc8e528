//! # Ultrasonic Proximity Sensor
//!
//! Time-of-flight distance measurement with an HC-SR04 style sensor.
//!
//! ## Measurement Cycle
//!
//! 1. Drive the trigger pin high for ~10 µs, then low
//! 2. Wait up to 5000 µs for the echo pin to go high
//! 3. Wait up to 60000 µs for the echo pin to return low, timing the pulse
//! 4. `distance_cm = 0.034 * elapsed_us / 2.0`
//!
//! A pulse of 38000 µs or more (~6.5 m) is out of range. Timeouts and
//! out-of-range pulses drop the cycle silently; they are not errors.
//!
//! Edges are detected by polling the pin against a monotonic deadline.

use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::{Reading, SampleOutcome, SampleSource};
use crate::error::Result;
use crate::hal::{Gpio, Level, PinMode};

/// Width of the trigger pulse in microseconds
pub const TRIGGER_PULSE_US: u64 = 10;

/// Maximum wait for the echo rising edge
pub const ECHO_START_TIMEOUT_US: u64 = 5_000;

/// Maximum wait for the echo falling edge
pub const ECHO_RETURN_TIMEOUT_US: u64 = 60_000;

/// Pulses at or above this width are out of range
pub const MAX_VALID_ECHO_US: f64 = 38_000.0;

/// Speed of sound in centimetres per microsecond
pub const SPEED_OF_SOUND_CM_PER_US: f64 = 0.034;

/// Default pins (wiringPi numbering)
pub const DEFAULT_TRIGGER_PIN: u8 = 0;
pub const DEFAULT_ECHO_PIN: u8 = 2;

/// Convert an echo pulse width to a distance
///
/// The pulse covers the round trip, hence the division by two.
pub fn distance_cm(elapsed_us: f64) -> f64 {
    SPEED_OF_SOUND_CM_PER_US * elapsed_us / 2.0
}

/// Convert an echo pulse width to a distance if it is within range
///
/// # Examples
///
/// ```
/// use drone_telemetry::sensor::proximity::echo_to_distance;
///
/// assert!(echo_to_distance(37_999.0).is_some());
/// assert!(echo_to_distance(38_000.0).is_none());
/// ```
pub fn echo_to_distance(elapsed_us: f64) -> Option<f64> {
    if elapsed_us < MAX_VALID_ECHO_US {
        Some(distance_cm(elapsed_us))
    } else {
        None
    }
}

/// Trigger and echo pin numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProximityPins {
    pub trigger: u8,
    pub echo: u8,
}

impl Default for ProximityPins {
    fn default() -> Self {
        Self {
            trigger: DEFAULT_TRIGGER_PIN,
            echo: DEFAULT_ECHO_PIN,
        }
    }
}

/// Poll `pin` until it reads `level` or `timeout_us` elapses
///
/// Returns the elapsed microseconds when the level was observed in time.
pub fn wait_pin_level<G: Gpio + ?Sized>(
    gpio: &mut G,
    pin: u8,
    level: Level,
    timeout_us: u64,
) -> Result<Option<f64>> {
    let start = Instant::now();
    let deadline = start + Duration::from_micros(timeout_us);

    loop {
        if gpio.digital_read(pin)? == level {
            return Ok(Some(start.elapsed().as_nanos() as f64 / 1_000.0));
        }
        if Instant::now() > deadline {
            return Ok(None);
        }
        std::hint::spin_loop();
    }
}

/// Spin for `micros` microseconds
fn delay_micros(micros: u64) {
    let deadline = Instant::now() + Duration::from_micros(micros);
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

/// Sample source measuring distance with an ultrasonic sensor
pub struct UltrasonicSource<G: Gpio> {
    gpio: G,
    pins: ProximityPins,
    settle: Duration,
    initialized: bool,
}

impl<G: Gpio> UltrasonicSource<G> {
    /// Create a source; pins are configured on the first sample
    ///
    /// # Arguments
    ///
    /// * `gpio` - GPIO backend
    /// * `pins` - Trigger and echo pins
    /// * `settle` - Time to hold the trigger low before the first measurement
    pub fn new(gpio: G, pins: ProximityPins, settle: Duration) -> Self {
        Self {
            gpio,
            pins,
            settle,
            initialized: false,
        }
    }

    fn setup(&mut self) -> Result<()> {
        self.gpio.pin_mode(self.pins.echo, PinMode::Input)?;
        self.gpio.pin_mode(self.pins.trigger, PinMode::Output)?;
        self.gpio.digital_write(self.pins.trigger, Level::Low)?;
        std::thread::sleep(self.settle);

        debug!(
            "Ultrasonic sensor ready (trigger pin {}, echo pin {})",
            self.pins.trigger, self.pins.echo
        );
        self.initialized = true;
        Ok(())
    }

    /// Run one trigger/echo cycle
    ///
    /// # Returns
    ///
    /// * `Ok(Some(elapsed_us))` - Width of the echo pulse
    /// * `Ok(None)` - Echo never started or never returned
    pub fn measure_echo(&mut self) -> Result<Option<f64>> {
        self.gpio.digital_write(self.pins.trigger, Level::High)?;
        delay_micros(TRIGGER_PULSE_US);
        self.gpio.digital_write(self.pins.trigger, Level::Low)?;

        if wait_pin_level(&mut self.gpio, self.pins.echo, Level::High, ECHO_START_TIMEOUT_US)?
            .is_none()
        {
            trace!("No echo within {} µs", ECHO_START_TIMEOUT_US);
            return Ok(None);
        }

        let elapsed =
            wait_pin_level(&mut self.gpio, self.pins.echo, Level::Low, ECHO_RETURN_TIMEOUT_US)?;
        if elapsed.is_none() {
            trace!("Echo did not return within {} µs", ECHO_RETURN_TIMEOUT_US);
        }
        Ok(elapsed)
    }
}

impl<G: Gpio + 'static> SampleSource for UltrasonicSource<G> {
    fn name(&self) -> &'static str {
        "proximity"
    }

    fn sample(&mut self) -> Result<SampleOutcome> {
        if !self.initialized {
            self.setup()?;
        }

        let outcome = match self.measure_echo()? {
            Some(elapsed) => match echo_to_distance(elapsed) {
                Some(distance_cm) => SampleOutcome::Ready(Reading::Proximity { distance_cm }),
                None => {
                    trace!("Echo of {:.0} µs out of range", elapsed);
                    SampleOutcome::Skipped
                }
            },
            None => SampleOutcome::Skipped,
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryError;
    use crate::hal::mocks::ScriptedGpio;

    fn source(gpio: ScriptedGpio) -> UltrasonicSource<ScriptedGpio> {
        UltrasonicSource::new(gpio, ProximityPins::default(), Duration::ZERO)
    }

    #[test]
    fn test_distance_formula() {
        assert_eq!(distance_cm(0.0), 0.0);
        assert!((distance_cm(1000.0) - 17.0).abs() < 1e-9);
        assert!((distance_cm(2000.0) - 34.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_monotonic() {
        let mut previous = distance_cm(0.0);
        for elapsed in (1..40_000).step_by(97) {
            let current = distance_cm(elapsed as f64);
            assert!(current > previous);
            previous = current;
        }
    }

    #[test]
    fn test_range_cutoff_boundary() {
        assert_eq!(echo_to_distance(37_999.0), Some(0.034 * 37_999.0 / 2.0));
        assert_eq!(echo_to_distance(38_000.0), None);
        assert_eq!(echo_to_distance(59_000.0), None);
    }

    #[test]
    fn test_timing_constants() {
        assert_eq!(TRIGGER_PULSE_US, 10);
        assert_eq!(ECHO_START_TIMEOUT_US, 5_000);
        assert_eq!(ECHO_RETURN_TIMEOUT_US, 60_000);
        assert_eq!(MAX_VALID_ECHO_US, 38_000.0);
    }

    #[test]
    fn test_setup_configures_pins_once() {
        let gpio = ScriptedGpio::new().script(DEFAULT_ECHO_PIN, &[Level::High, Level::Low]);
        let mut src = source(gpio.clone());

        src.sample().unwrap();
        src.sample().unwrap();

        assert_eq!(
            gpio.get_modes(),
            vec![(DEFAULT_ECHO_PIN, PinMode::Input), (DEFAULT_TRIGGER_PIN, PinMode::Output)]
        );
    }

    #[test]
    fn test_trigger_pulse_sequence() {
        let gpio = ScriptedGpio::new().script(DEFAULT_ECHO_PIN, &[Level::Low]);
        let mut src = source(gpio.clone());

        src.sample().unwrap();

        // Setup drives low, then the pulse goes high and low again
        assert_eq!(
            gpio.get_writes(),
            vec![
                (DEFAULT_TRIGGER_PIN, Level::Low),
                (DEFAULT_TRIGGER_PIN, Level::High),
                (DEFAULT_TRIGGER_PIN, Level::Low),
            ]
        );
    }

    #[test]
    fn test_echo_produces_reading() {
        let gpio = ScriptedGpio::new().script(
            DEFAULT_ECHO_PIN,
            &[Level::Low, Level::Low, Level::High, Level::High, Level::High, Level::Low],
        );
        let mut src = source(gpio);

        match src.sample().unwrap() {
            SampleOutcome::Ready(Reading::Proximity { distance_cm }) => {
                // A pulse of a few polls is far below the range cutoff
                assert!(distance_cm >= 0.0);
                assert!(distance_cm < distance_cm_at_cutoff());
            }
            other => panic!("Expected proximity reading, got: {:?}", other),
        }
    }

    fn distance_cm_at_cutoff() -> f64 {
        distance_cm(MAX_VALID_ECHO_US)
    }

    #[test]
    fn test_echo_never_starts_is_skipped() {
        let gpio = ScriptedGpio::new().script(DEFAULT_ECHO_PIN, &[Level::Low]);
        let mut src = source(gpio);

        let start = Instant::now();
        assert_eq!(src.sample().unwrap(), SampleOutcome::Skipped);
        assert!(start.elapsed() >= Duration::from_micros(ECHO_START_TIMEOUT_US));
    }

    #[test]
    fn test_echo_never_returns_is_skipped() {
        let gpio = ScriptedGpio::new().script(DEFAULT_ECHO_PIN, &[Level::High]);
        let mut src = source(gpio);

        let start = Instant::now();
        assert_eq!(src.sample().unwrap(), SampleOutcome::Skipped);
        assert!(start.elapsed() >= Duration::from_micros(ECHO_RETURN_TIMEOUT_US));
    }

    #[test]
    fn test_gpio_error_propagates() {
        let gpio = ScriptedGpio::new();
        gpio.set_read_error();
        let mut src = source(gpio);

        assert!(matches!(src.sample(), Err(TelemetryError::Device(_))));
    }
}

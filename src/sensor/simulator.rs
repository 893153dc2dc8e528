//! # Simulated Sensors
//!
//! Deterministic stand-ins for the hardware, used with `--simulate` and in tests.
//!
//! - [`ProximitySweep`]: triangular distance sweep in 1.5 cm steps
//! - [`SimulatedCamera`]: constant 4-byte placeholder image
//! - [`SimulatedImu`]: MPU6050 register map behind the [`I2cBus`] trait, so the
//!   real decoding path runs unchanged

use tracing::trace;

use super::accelerometer::{
    RANGE_MASK, REG_ACCEL_CONFIG, REG_ACCEL_XOUT_H, REG_ACCEL_YOUT_H, REG_ACCEL_ZOUT_H,
    REG_TEMP_OUT_H, SCALE_FACTOR,
};
use super::{Reading, SampleOutcome, SampleSource};
use crate::error::{Result, TelemetryError};
use crate::hal::{Camera, I2cBus};

/// Step between successive sweep values in centimetres
pub const SWEEP_STEP_CM: f64 = 1.5;

/// Highest sweep multiplier (first value, 72.0 cm)
pub const SWEEP_TOP: u32 = 48;

/// Lowest multiplier reached on the way down (19.5 cm)
pub const SWEEP_BOTTOM: u32 = 13;

/// Placeholder payload sent instead of a real JPEG
pub const PLACEHOLDER_IMAGE: &[u8] = b"abcd";

/// Multipliers of one full sweep period
///
/// Descends 48..=13, then ascends 12..=47; the next period starts again at 48.
pub fn sweep_multipliers() -> Vec<u32> {
    (SWEEP_BOTTOM..=SWEEP_TOP)
        .rev()
        .chain((SWEEP_BOTTOM - 1)..SWEEP_TOP)
        .collect()
}

/// Simulated proximity sensor producing a triangular sweep
#[derive(Debug, Clone)]
pub struct ProximitySweep {
    multipliers: Vec<u32>,
    position: usize,
}

impl Default for ProximitySweep {
    fn default() -> Self {
        Self::new()
    }
}

impl ProximitySweep {
    pub fn new() -> Self {
        Self {
            multipliers: sweep_multipliers(),
            position: 0,
        }
    }

    /// Length of one sweep period
    pub fn period(&self) -> usize {
        self.multipliers.len()
    }

    /// Next distance in centimetres
    pub fn next_distance(&mut self) -> f64 {
        let multiplier = self.multipliers[self.position];
        self.position = (self.position + 1) % self.multipliers.len();
        multiplier as f64 * SWEEP_STEP_CM
    }
}

impl SampleSource for ProximitySweep {
    fn name(&self) -> &'static str {
        "proximity-simulator"
    }

    fn sample(&mut self) -> Result<SampleOutcome> {
        let distance_cm = self.next_distance();
        trace!("Simulated distance {} cm", distance_cm);
        Ok(SampleOutcome::Ready(Reading::Proximity { distance_cm }))
    }
}

/// Simulated camera emitting the placeholder image
#[derive(Debug, Clone, Default)]
pub struct SimulatedCamera {
    limit: Option<u64>,
    captured: u64,
}

impl SimulatedCamera {
    /// Camera that never runs out of frames
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Camera that ends after `frames` captures
    pub fn with_limit(frames: u64) -> Self {
        Self {
            limit: Some(frames),
            captured: 0,
        }
    }
}

impl Camera for SimulatedCamera {
    fn capture(&mut self) -> Result<Option<Vec<u8>>> {
        if let Some(limit) = self.limit {
            if self.captured >= limit {
                return Ok(None);
            }
        }
        self.captured += 1;
        Ok(Some(PLACEHOLDER_IMAGE.to_vec()))
    }
}

/// Encode a signed value as the register word the device would store
pub fn twos_complement_encode(value: i16) -> u16 {
    value as u16
}

/// Simulated MPU6050 register map
#[derive(Debug, Clone)]
pub struct SimulatedImu {
    address: u8,
    registers: [u8; 256],
}

impl SimulatedImu {
    /// Create a device at `address` using range selector `range` (0..=3)
    ///
    /// # Errors
    ///
    /// Returns error if `range` is not a valid selector
    pub fn new(address: u8, range: u8) -> Result<Self> {
        if range as usize >= SCALE_FACTOR.len() {
            return Err(TelemetryError::Device(format!(
                "invalid accelerometer range selector {}",
                range
            )));
        }

        let mut imu = Self {
            address,
            registers: [0u8; 256],
        };
        imu.registers[REG_ACCEL_CONFIG as usize] = (range << 3) & RANGE_MASK;
        Ok(imu)
    }

    fn store_word(&mut self, register: u8, value: i16) {
        let [high, low] = twos_complement_encode(value).to_be_bytes();
        self.registers[register as usize] = high;
        self.registers[register as usize + 1] = low;
    }

    fn scale(&self) -> f64 {
        let selector = (self.registers[REG_ACCEL_CONFIG as usize] & RANGE_MASK) >> 3;
        SCALE_FACTOR[selector as usize]
    }

    /// Set the acceleration reported on each axis, in g
    ///
    /// Values beyond the configured range saturate like the real sensor.
    pub fn set_acceleration(&mut self, x: f64, y: f64, z: f64) {
        let scale = self.scale();
        for (register, g) in [(REG_ACCEL_XOUT_H, x), (REG_ACCEL_YOUT_H, y), (REG_ACCEL_ZOUT_H, z)] {
            let raw = (g * scale).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
            self.store_word(register, raw);
        }
    }

    /// Builder form of [`set_acceleration`](Self::set_acceleration)
    pub fn with_acceleration(mut self, x: f64, y: f64, z: f64) -> Self {
        self.set_acceleration(x, y, z);
        self
    }

    /// Set the die temperature in degrees Celsius
    pub fn set_temperature(&mut self, celsius: f64) {
        let raw = ((celsius - 36.53) * 340.0).round() as i16;
        self.store_word(REG_TEMP_OUT_H, raw);
    }

    fn check_address(&self, address: u8) -> Result<()> {
        if address != self.address {
            return Err(TelemetryError::Device(format!(
                "no device at address 0x{:02X}",
                address
            )));
        }
        Ok(())
    }
}

impl I2cBus for SimulatedImu {
    fn read_byte(&mut self, address: u8, register: u8) -> Result<u8> {
        self.check_address(address)?;
        Ok(self.registers[register as usize])
    }

    fn write_byte(&mut self, address: u8, register: u8, value: u8) -> Result<()> {
        self.check_address(address)?;
        self.registers[register as usize] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::accelerometer::{twos_complement, Mpu6050, MPU6050_ADDRESS};

    #[test]
    fn test_sweep_starts_at_72() {
        let mut sweep = ProximitySweep::new();
        assert_eq!(sweep.next_distance(), 72.0);
        assert_eq!(sweep.next_distance(), 70.5);
    }

    #[test]
    fn test_sweep_full_period() {
        let mut sweep = ProximitySweep::new();
        let values: Vec<f64> = (0..sweep.period()).map(|_| sweep.next_distance()).collect();

        assert_eq!(values.len(), 72);

        // Descending half: 48..=13
        let expected_down: Vec<f64> = (13..=48).rev().map(|x| x as f64 * 1.5).collect();
        assert_eq!(&values[..36], &expected_down[..]);
        assert_eq!(values[35], 19.5);

        // Ascending half: 12..=47
        let expected_up: Vec<f64> = (12..48).map(|x| x as f64 * 1.5).collect();
        assert_eq!(&values[36..], &expected_up[..]);
        assert_eq!(values[36], 18.0);
        assert_eq!(values[71], 70.5);
    }

    #[test]
    fn test_sweep_repeats_forever() {
        let mut sweep = ProximitySweep::new();
        let first: Vec<f64> = (0..72).map(|_| sweep.next_distance()).collect();
        let second: Vec<f64> = (0..72).map(|_| sweep.next_distance()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sweep_sample_source() {
        let mut sweep = ProximitySweep::new();
        assert_eq!(
            sweep.sample().unwrap(),
            SampleOutcome::Ready(Reading::Proximity { distance_cm: 72.0 })
        );
    }

    #[test]
    fn test_simulated_camera_placeholder() {
        let mut camera = SimulatedCamera::unlimited();
        for _ in 0..5 {
            assert_eq!(camera.capture().unwrap(), Some(b"abcd".to_vec()));
        }
    }

    #[test]
    fn test_simulated_camera_limit() {
        let mut camera = SimulatedCamera::with_limit(2);
        assert!(camera.capture().unwrap().is_some());
        assert!(camera.capture().unwrap().is_some());
        assert_eq!(camera.capture().unwrap(), None);
    }

    #[test]
    fn test_encode_inverse_of_decode() {
        for value in [i16::MIN, -16384, -1, 0, 1, 16384, i16::MAX] {
            assert_eq!(twos_complement(twos_complement_encode(value)), value);
        }
    }

    #[test]
    fn test_simulated_imu_through_driver() {
        let imu = SimulatedImu::new(MPU6050_ADDRESS, 1)
            .unwrap()
            .with_acceleration(0.5, -1.0, 1.0);
        let mut device = Mpu6050::new(imu, MPU6050_ADDRESS);

        assert_eq!(device.read_range().unwrap(), 1);
        assert_eq!(device.read_acceleration().unwrap(), (0.5, -1.0, 1.0));
    }

    #[test]
    fn test_simulated_imu_saturates() {
        let imu = SimulatedImu::new(MPU6050_ADDRESS, 0)
            .unwrap()
            .with_acceleration(5.0, -5.0, 0.0);
        let mut device = Mpu6050::new(imu, MPU6050_ADDRESS);

        let (x, y, _) = device.read_acceleration().unwrap();
        assert_eq!(x, 32767.0 / 16384.0);
        assert_eq!(y, -2.0);
    }

    #[test]
    fn test_simulated_imu_temperature() {
        let mut imu = SimulatedImu::new(MPU6050_ADDRESS, 0).unwrap();
        imu.set_temperature(37.53);
        let mut device = Mpu6050::new(imu, MPU6050_ADDRESS);

        assert!((device.read_temperature().unwrap() - 37.53).abs() < 1e-9);
    }

    #[test]
    fn test_simulated_imu_wrong_address() {
        let mut imu = SimulatedImu::new(MPU6050_ADDRESS, 0).unwrap();
        assert!(imu.read_byte(0x69, REG_ACCEL_CONFIG).is_err());
    }

    #[test]
    fn test_simulated_imu_invalid_range() {
        assert!(SimulatedImu::new(MPU6050_ADDRESS, 4).is_err());
    }
}

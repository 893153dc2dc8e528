//! # MPU6050 Accelerometer
//!
//! Register-level decoding of the MPU6050 over an I2C bus.
//!
//! ## Register Words
//!
//! Each measurement is a 16-bit two's complement word split over two
//! registers, high byte first:
//!
//! ```text
//! value = (reg[n] << 8) | reg[n + 1]
//! ```
//!
//! ## Full-Scale Range
//!
//! Bits 3..4 of `ACCEL_CONFIG` (0x1C) select the range. The selector indexes
//! the LSB-per-g table:
//!
//! | AFS_SEL | Range | LSB/g |
//! |---------|-------|-------|
//! | 0       | ±2g   | 16384 |
//! | 1       | ±4g   | 8192  |
//! | 2       | ±8g   | 4096  |
//! | 3       | ±16g  | 2048  |

use tracing::{debug, enabled, trace, Level};

use super::{Reading, SampleOutcome, SampleSource};
use crate::error::Result;
use crate::hal::I2cBus;

/// Default MPU6050 I2C address
pub const MPU6050_ADDRESS: u8 = 0x68;

/// Power management register; writing 0 wakes the device
pub const REG_PWR_MGMT_1: u8 = 0x6B;

/// Accelerometer configuration register
pub const REG_ACCEL_CONFIG: u8 = 0x1C;

/// Accelerometer X/Y/Z high-byte registers
pub const REG_ACCEL_XOUT_H: u8 = 0x3B;
pub const REG_ACCEL_YOUT_H: u8 = 0x3D;
pub const REG_ACCEL_ZOUT_H: u8 = 0x3F;

/// Temperature high-byte register
pub const REG_TEMP_OUT_H: u8 = 0x41;

/// Gyroscope X/Y/Z high-byte registers
pub const REG_GYRO_XOUT_H: u8 = 0x43;
pub const REG_GYRO_YOUT_H: u8 = 0x45;
pub const REG_GYRO_ZOUT_H: u8 = 0x47;

/// AFS_SEL bits of ACCEL_CONFIG
pub const RANGE_MASK: u8 = 0b0001_1000;

/// LSB per g for each range selector
pub const SCALE_FACTOR: [f64; 4] = [16384.0, 8192.0, 4096.0, 2048.0];

/// Decode a 16-bit two's complement register word
///
/// # Examples
///
/// ```
/// use drone_telemetry::sensor::accelerometer::twos_complement;
///
/// assert_eq!(twos_complement(0x0001), 1);
/// assert_eq!(twos_complement(0xFFFF), -1);
/// assert_eq!(twos_complement(0x8000), -32768);
/// ```
pub fn twos_complement(value: u16) -> i16 {
    if value >= 0x8000 {
        (-((0xFFFF - value as i32) + 1)) as i16
    } else {
        value as i16
    }
}

/// Extract the 2-bit range selector from an ACCEL_CONFIG byte
pub fn range_selector(config: u8) -> usize {
    ((config & RANGE_MASK) >> 3) as usize
}

/// Scale a raw acceleration word to g for the given ACCEL_CONFIG byte
///
/// # Examples
///
/// ```
/// use drone_telemetry::sensor::accelerometer::scale_acceleration;
///
/// assert_eq!(scale_acceleration(16384, 0b0000_0000), 1.0);
/// assert_eq!(scale_acceleration(16384, 0b0001_1000), 8.0);
/// ```
pub fn scale_acceleration(raw: i16, config: u8) -> f64 {
    raw as f64 / SCALE_FACTOR[range_selector(config)]
}

/// Convert a raw temperature word to degrees Celsius
pub fn temperature_celsius(raw: i16) -> f64 {
    raw as f64 / 340.0 + 36.53
}

/// MPU6050 driver over any [`I2cBus`]
pub struct Mpu6050<B: I2cBus> {
    bus: B,
    address: u8,
}

impl<B: I2cBus> Mpu6050<B> {
    /// Create a driver for the device at `address`
    pub fn new(bus: B, address: u8) -> Self {
        Self { bus, address }
    }

    /// Device address on the bus
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Wake the device by clearing the power management register
    pub fn wake(&mut self) -> Result<()> {
        self.bus.write_byte(self.address, REG_PWR_MGMT_1, 0)
    }

    fn read_byte(&mut self, register: u8) -> Result<u8> {
        self.bus.read_byte(self.address, register)
    }

    /// Read the unsigned word stored at `register` and `register + 1`
    ///
    /// The low byte of register 0xFF is read from 0x00.
    pub fn read_word(&mut self, register: u8) -> Result<u16> {
        let high = self.read_byte(register)?;
        let low = self.read_byte(register.wrapping_add(1))?;
        Ok(((high as u16) << 8) | low as u16)
    }

    /// Read a signed word
    pub fn read_word_signed(&mut self, register: u8) -> Result<i16> {
        Ok(twos_complement(self.read_word(register)?))
    }

    /// Read the configured range selector
    pub fn read_range(&mut self) -> Result<usize> {
        Ok(range_selector(self.read_byte(REG_ACCEL_CONFIG)?))
    }

    /// Read one acceleration axis in g
    ///
    /// The range is re-read for every axis so a reconfigured device is picked
    /// up immediately.
    pub fn read_scaled(&mut self, register: u8) -> Result<f64> {
        let config = self.read_byte(REG_ACCEL_CONFIG)?;
        let raw = self.read_word_signed(register)?;
        Ok(scale_acceleration(raw, config))
    }

    /// Read all three acceleration axes in g
    pub fn read_acceleration(&mut self) -> Result<(f64, f64, f64)> {
        Ok((
            self.read_scaled(REG_ACCEL_XOUT_H)?,
            self.read_scaled(REG_ACCEL_YOUT_H)?,
            self.read_scaled(REG_ACCEL_ZOUT_H)?,
        ))
    }

    /// Read the die temperature in degrees Celsius
    pub fn read_temperature(&mut self) -> Result<f64> {
        Ok(temperature_celsius(self.read_word_signed(REG_TEMP_OUT_H)?))
    }

    /// Read raw gyroscope words (X, Y, Z)
    pub fn read_gyro_raw(&mut self) -> Result<(i16, i16, i16)> {
        Ok((
            self.read_word_signed(REG_GYRO_XOUT_H)?,
            self.read_word_signed(REG_GYRO_YOUT_H)?,
            self.read_word_signed(REG_GYRO_ZOUT_H)?,
        ))
    }
}

/// Sample source producing acceleration readings
pub struct AccelerometerSource<B: I2cBus> {
    device: Mpu6050<B>,
}

impl<B: I2cBus> AccelerometerSource<B> {
    pub fn new(device: Mpu6050<B>) -> Self {
        debug!("Accelerometer source at address 0x{:02X}", device.address());
        Self { device }
    }
}

impl<B: I2cBus + 'static> SampleSource for AccelerometerSource<B> {
    fn name(&self) -> &'static str {
        "accelerometer"
    }

    fn sample(&mut self) -> Result<SampleOutcome> {
        // Woken every cycle; the device may have been reset in between
        self.device.wake()?;

        let (x, y, z) = self.device.read_acceleration()?;
        trace!("Acceleration x={} y={} z={}", x, y, z);

        // Extra bus traffic only when someone is listening
        if enabled!(Level::TRACE) {
            let celsius = self.device.read_temperature()?;
            let (gx, gy, gz) = self.device.read_gyro_raw()?;
            trace!("Die temperature {:.2} C, gyro raw x={} y={} z={}", celsius, gx, gy, gz);
        }

        Ok(SampleOutcome::Ready(Reading::Acceleration { x, y, z }))
    }
}

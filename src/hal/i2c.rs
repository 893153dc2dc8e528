//! # Linux I2C Backend
//!
//! Register access through the `/dev/i2c-N` character devices using SMBus
//! byte-data transfers.
//!
//! One device handle is opened per slave address on first use and kept for
//! the lifetime of the bus.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use tracing::{debug, info};

use super::I2cBus;
use crate::error::{Result, TelemetryError};

/// Bus the MPU6050 sits on for a Raspberry Pi header
pub const DEFAULT_I2C_BUS: u8 = 1;

/// Character device path for bus number `bus`
pub fn bus_path(bus: u8) -> PathBuf {
    PathBuf::from(format!("/dev/i2c-{}", bus))
}

/// I2C adapter exposed by the kernel `i2c-dev` driver
pub struct LinuxI2cBus {
    path: PathBuf,
    devices: HashMap<u8, LinuxI2CDevice>,
}

impl std::fmt::Debug for LinuxI2cBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxI2cBus")
            .field("path", &self.path)
            .field("open_devices", &self.devices.len())
            .finish()
    }
}

impl LinuxI2cBus {
    /// Open bus number `bus`
    ///
    /// # Errors
    ///
    /// Returns `Device` error if the adapter does not exist
    pub fn open(bus: u8) -> Result<Self> {
        Self::with_path(bus_path(bus))
    }

    /// Open an adapter at a custom device path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(TelemetryError::Device(format!(
                "I2C adapter {} not found",
                path.display()
            )));
        }

        info!("Using I2C adapter {}", path.display());
        Ok(Self {
            path,
            devices: HashMap::new(),
        })
    }

    fn device(&mut self, address: u8) -> Result<&mut LinuxI2CDevice> {
        if !self.devices.contains_key(&address) {
            let device = LinuxI2CDevice::new(&self.path, u16::from(address)).map_err(|e| {
                TelemetryError::Device(format!(
                    "Failed to open device 0x{:02X} on {}: {}",
                    address,
                    self.path.display(),
                    e
                ))
            })?;
            debug!("Opened I2C device 0x{:02X} on {}", address, self.path.display());
            self.devices.insert(address, device);
        }

        self.devices
            .get_mut(&address)
            .ok_or_else(|| TelemetryError::Device(format!("I2C device 0x{:02X} not open", address)))
    }
}

impl I2cBus for LinuxI2cBus {
    fn read_byte(&mut self, address: u8, register: u8) -> Result<u8> {
        self.device(address)?.smbus_read_byte_data(register).map_err(|e| {
            TelemetryError::Device(format!(
                "Failed to read register 0x{:02X} of device 0x{:02X}: {}",
                register, address, e
            ))
        })
    }

    fn write_byte(&mut self, address: u8, register: u8, value: u8) -> Result<()> {
        self.device(address)?
            .smbus_write_byte_data(register, value)
            .map_err(|e| {
                TelemetryError::Device(format!(
                    "Failed to write register 0x{:02X} of device 0x{:02X}: {}",
                    register, address, e
                ))
            })
    }
}

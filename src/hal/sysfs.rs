//! # Sysfs GPIO Backend
//!
//! Drives pins through the Linux `/sys/class/gpio` interface.
//!
//! Pins are exported on first use and their `value` files are kept open so
//! that echo polling only costs a seek and a one-byte read.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Gpio, Level, PinMode};
use crate::error::{Result, TelemetryError};

/// Default sysfs GPIO root
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// GPIO access through sysfs
pub struct SysfsGpio {
    root: PathBuf,
    values: HashMap<u8, File>,
}

impl std::fmt::Debug for SysfsGpio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysfsGpio")
            .field("root", &self.root)
            .field("open_pins", &self.values.len())
            .finish()
    }
}

impl SysfsGpio {
    /// Open the GPIO root at `root` (normally [`SYSFS_GPIO_ROOT`])
    ///
    /// # Errors
    ///
    /// Returns `Device` error if the sysfs GPIO interface is not available
    pub fn with_root<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(TelemetryError::Device(format!(
                "GPIO root {} not found",
                root.display()
            )));
        }

        info!("Using sysfs GPIO at {}", root.display());
        Ok(Self {
            root,
            values: HashMap::new(),
        })
    }

    fn pin_dir(&self, pin: u8) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    fn export(&self, pin: u8) -> Result<()> {
        if self.pin_dir(pin).exists() {
            return Ok(());
        }

        debug!("Exporting GPIO {}", pin);
        fs::write(self.root.join("export"), pin.to_string()).map_err(|e| {
            TelemetryError::Device(format!("Failed to export GPIO {}: {}", pin, e))
        })
    }

    fn value_file(&mut self, pin: u8) -> Result<&mut File> {
        if !self.values.contains_key(&pin) {
            let path = self.pin_dir(pin).join("value");
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|e| {
                    TelemetryError::Device(format!("Failed to open {}: {}", path.display(), e))
                })?;
            self.values.insert(pin, file);
        }

        self.values
            .get_mut(&pin)
            .ok_or_else(|| TelemetryError::Device(format!("GPIO {} not configured", pin)))
    }
}

impl Gpio for SysfsGpio {
    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        self.export(pin)?;

        let direction = match mode {
            PinMode::Input => "in",
            PinMode::Output => "out",
        };
        let path = self.pin_dir(pin).join("direction");
        fs::write(&path, direction).map_err(|e| {
            TelemetryError::Device(format!("Failed to set {} to {}: {}", path.display(), direction, e))
        })?;

        debug!("GPIO {} configured as {}", pin, direction);
        Ok(())
    }

    fn digital_read(&mut self, pin: u8) -> Result<Level> {
        let file = self.value_file(pin)?;
        let mut byte = [0u8; 1];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut byte)?;

        match byte[0] {
            b'0' => Ok(Level::Low),
            b'1' => Ok(Level::High),
            other => Err(TelemetryError::Device(format!(
                "Unexpected GPIO {} value byte 0x{:02X}",
                pin, other
            ))),
        }
    }

    fn digital_write(&mut self, pin: u8, level: Level) -> Result<()> {
        let file = self.value_file(pin)?;
        let byte = match level {
            Level::Low => b"0",
            Level::High => b"1",
        };
        file.seek(SeekFrom::Start(0))?;
        file.write_all(byte)?;
        Ok(())
    }
}

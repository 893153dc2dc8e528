//! Trait abstraction for sensor hardware to enable testing and simulation
//!
//! The sampling code depends only on these capabilities, never on a vendor SDK.

pub mod i2c;
pub mod sysfs;

use crate::error::Result;

/// Logic level of a GPIO pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Direction of a GPIO pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// Register access on an I2C-like bus
#[cfg_attr(test, mockall::automock)]
pub trait I2cBus: Send {
    /// Read one register of the device at `address`
    fn read_byte(&mut self, address: u8, register: u8) -> Result<u8>;

    /// Write one register of the device at `address`
    fn write_byte(&mut self, address: u8, register: u8, value: u8) -> Result<()>;
}

/// Digital pin access
pub trait Gpio: Send {
    /// Configure a pin as input or output
    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()>;

    /// Sample the current level of a pin
    fn digital_read(&mut self, pin: u8) -> Result<Level>;

    /// Drive an output pin
    fn digital_write(&mut self, pin: u8, level: Level) -> Result<()>;
}

/// Continuous-capture camera driver
pub trait Camera: Send {
    /// Capture the next JPEG frame
    ///
    /// Returns `Ok(None)` once the capture sequence has ended.
    fn capture(&mut self) -> Result<Option<Vec<u8>>>;
}

impl<B: I2cBus + ?Sized> I2cBus for Box<B> {
    fn read_byte(&mut self, address: u8, register: u8) -> Result<u8> {
        (**self).read_byte(address, register)
    }

    fn write_byte(&mut self, address: u8, register: u8, value: u8) -> Result<()> {
        (**self).write_byte(address, register, value)
    }
}

impl<G: Gpio + ?Sized> Gpio for Box<G> {
    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        (**self).pin_mode(pin, mode)
    }

    fn digital_read(&mut self, pin: u8) -> Result<Level> {
        (**self).digital_read(pin)
    }

    fn digital_write(&mut self, pin: u8, level: Level) -> Result<()> {
        (**self).digital_write(pin, level)
    }
}

impl<C: Camera + ?Sized> Camera for Box<C> {
    fn capture(&mut self) -> Result<Option<Vec<u8>>> {
        (**self).capture()
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::error::TelemetryError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Mock GPIO with a scripted level sequence per input pin
    ///
    /// Once a pin's script is exhausted the last level repeats forever.
    #[derive(Clone, Default)]
    pub struct ScriptedGpio {
        pub scripts: Arc<Mutex<Vec<(u8, VecDeque<Level>, Level)>>>,
        pub writes: Arc<Mutex<Vec<(u8, Level)>>>,
        pub modes: Arc<Mutex<Vec<(u8, PinMode)>>>,
        pub fail_reads: Arc<Mutex<bool>>,
    }

    impl ScriptedGpio {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(self, pin: u8, levels: &[Level]) -> Self {
            let last = levels.last().copied().unwrap_or(Level::Low);
            self.scripts
                .lock()
                .unwrap()
                .push((pin, levels.iter().copied().collect(), last));
            self
        }

        pub fn get_writes(&self) -> Vec<(u8, Level)> {
            self.writes.lock().unwrap().clone()
        }

        pub fn get_modes(&self) -> Vec<(u8, PinMode)> {
            self.modes.lock().unwrap().clone()
        }

        pub fn set_read_error(&self) {
            *self.fail_reads.lock().unwrap() = true;
        }
    }

    impl Gpio for ScriptedGpio {
        fn pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
            self.modes.lock().unwrap().push((pin, mode));
            Ok(())
        }

        fn digital_read(&mut self, pin: u8) -> Result<Level> {
            if *self.fail_reads.lock().unwrap() {
                return Err(TelemetryError::Device("Mock read error".to_string()));
            }
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.iter_mut().find(|(p, _, _)| *p == pin) {
                Some((_, levels, last)) => Ok(levels.pop_front().unwrap_or(*last)),
                None => Ok(Level::Low),
            }
        }

        fn digital_write(&mut self, pin: u8, level: Level) -> Result<()> {
            self.writes.lock().unwrap().push((pin, level));
            Ok(())
        }
    }
}

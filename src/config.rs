//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; missing values fall back to the
//! built-in defaults, so an empty file is a valid configuration.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TelemetryError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub proximity: ProximityConfig,

    #[serde(default)]
    pub accelerometer: AccelerometerConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Camera stream listener configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port 0 lets the OS pick a free port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Ultrasonic proximity sensor configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProximityConfig {
    #[serde(default = "default_trigger_pin")]
    pub trigger_pin: u8,

    #[serde(default = "default_echo_pin")]
    pub echo_pin: u8,

    #[serde(default = "default_proximity_period_ms")]
    pub period_ms: u64,

    /// Time the trigger is held low after setup before the first pulse
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_gpio_root")]
    pub gpio_root: String,
}

/// MPU6050 accelerometer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AccelerometerConfig {
    /// I2C bus number, opened as `/dev/i2c-<bus>`
    #[serde(default = "default_i2c_bus")]
    pub bus: u8,

    #[serde(default = "default_accel_address")]
    pub address: u8,

    #[serde(default = "default_accel_period_ms")]
    pub period_ms: u64,
}

/// Camera capture configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default = "default_camera_period_ms")]
    pub period_ms: u64,

    /// Cycle the frame index through 0..=99
    #[serde(default = "default_wrap_index")]
    pub wrap_index: bool,

    /// Print `{timestamp, index}` to stdout for every frame sent
    #[serde(default = "default_print_metadata")]
    pub print_metadata: bool,
}

/// Simulated device configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SimulatorConfig {
    /// Accelerometer range selector (0..=3 for ±2g/±4g/±8g/±16g)
    #[serde(default)]
    pub accel_range: u8,

    /// Constant acceleration reported by the simulated IMU, in g
    #[serde(default = "default_acceleration")]
    pub acceleration: [f64; 3],

    /// Die temperature reported by the simulated IMU, in degrees Celsius
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Frames captured by the simulated camera before it ends (0 = unlimited)
    #[serde(default)]
    pub camera_frames: u64,
}

// Default value functions
fn default_bind_address() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { crate::stream::DEFAULT_STREAM_PORT }

fn default_trigger_pin() -> u8 { crate::sensor::proximity::DEFAULT_TRIGGER_PIN }
fn default_echo_pin() -> u8 { crate::sensor::proximity::DEFAULT_ECHO_PIN }
fn default_proximity_period_ms() -> u64 { 28 }
fn default_settle_ms() -> u64 { 500 }
fn default_gpio_root() -> String { crate::hal::sysfs::SYSFS_GPIO_ROOT.to_string() }

fn default_i2c_bus() -> u8 { crate::hal::i2c::DEFAULT_I2C_BUS }
fn default_accel_address() -> u8 { crate::sensor::accelerometer::MPU6050_ADDRESS }
fn default_accel_period_ms() -> u64 { 33 }

fn default_camera_period_ms() -> u64 { 40 }
fn default_wrap_index() -> bool { true }
fn default_print_metadata() -> bool { true }

fn default_acceleration() -> [f64; 3] { [0.0, 0.0, 1.0] }
fn default_temperature() -> f64 { 25.0 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            trigger_pin: default_trigger_pin(),
            echo_pin: default_echo_pin(),
            period_ms: default_proximity_period_ms(),
            settle_ms: default_settle_ms(),
            gpio_root: default_gpio_root(),
        }
    }
}

impl Default for AccelerometerConfig {
    fn default() -> Self {
        Self {
            bus: default_i2c_bus(),
            address: default_accel_address(),
            period_ms: default_accel_period_ms(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            period_ms: default_camera_period_ms(),
            wrap_index: default_wrap_index(),
            print_metadata: default_print_metadata(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            accel_range: 0,
            acceleration: default_acceleration(),
            temperature: default_temperature(),
            camera_frames: 0,
        }
    }
}

impl ServerConfig {
    /// Address the stream listener binds to
    ///
    /// # Errors
    ///
    /// Returns error if `bind_address` is not an IP address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.bind_address.parse().map_err(|_| {
            TelemetryError::Config(toml::de::Error::custom(format!(
                "bind_address '{}' is not a valid IP address",
                self.bind_address
            )))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl ProximityConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl AccelerometerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl CameraConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use drone_telemetry::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns error if TOML parsing or validation fails
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;

        // Validate sampling periods
        for (name, period_ms) in [
            ("proximity.period_ms", self.proximity.period_ms),
            ("accelerometer.period_ms", self.accelerometer.period_ms),
            ("camera.period_ms", self.camera.period_ms),
        ] {
            if period_ms == 0 || period_ms > 10000 {
                return Err(invalid(format!("{} must be between 1 and 10000", name)));
            }
        }

        if self.proximity.settle_ms > 10000 {
            return Err(invalid("proximity.settle_ms must be at most 10000"));
        }

        if self.proximity.trigger_pin == self.proximity.echo_pin {
            return Err(invalid("proximity trigger_pin and echo_pin must differ"));
        }

        if self.proximity.gpio_root.is_empty() {
            return Err(invalid("proximity.gpio_root cannot be empty"));
        }

        // 7-bit addresses outside the reserved blocks
        if !(0x08..=0x77).contains(&self.accelerometer.address) {
            return Err(invalid("accelerometer.address must be between 0x08 and 0x77"));
        }

        if self.simulator.accel_range > 3 {
            return Err(invalid("simulator.accel_range must be between 0 and 3"));
        }

        if self.simulator.acceleration.iter().any(|a| !a.is_finite()) {
            return Err(invalid("simulator.acceleration values must be finite"));
        }

        // Operating range of the MPU6050 temperature sensor
        if !(-40.0..=85.0).contains(&self.simulator.temperature) {
            return Err(invalid("simulator.temperature must be between -40 and 85"));
        }

        Ok(())
    }
}

fn invalid(message: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 10000);
        assert_eq!(config.proximity.trigger_pin, 0);
        assert_eq!(config.proximity.echo_pin, 2);
        assert_eq!(config.proximity.period(), Duration::from_millis(28));
        assert_eq!(config.proximity.settle(), Duration::from_millis(500));
        assert_eq!(config.accelerometer.bus, 1);
        assert_eq!(config.accelerometer.address, 0x68);
        assert_eq!(config.accelerometer.period(), Duration::from_millis(33));
        assert!(config.camera.wrap_index);
        assert!(config.camera.print_metadata);
        assert_eq!(config.simulator.acceleration, [0.0, 0.0, 1.0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 10000);
        assert_eq!(config.camera.period_ms, 40);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[server]
bind_address = "127.0.0.1"
port = 10001

[proximity]
trigger_pin = 4
echo_pin = 5

[accelerometer]
bus = 3

[camera]
wrap_index = false

[simulator]
accel_range = 2
acceleration = [0.5, -0.5, 1.0]
camera_frames = 10
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.server.socket_addr().unwrap(), "127.0.0.1:10001".parse().unwrap());
        assert_eq!(config.proximity.trigger_pin, 4);
        assert_eq!(config.proximity.period_ms, 28);
        assert_eq!(config.accelerometer.bus, 3);
        assert_eq!(config.accelerometer.address, 0x68);
        assert!(!config.camera.wrap_index);
        assert_eq!(config.simulator.accel_range, 2);
        assert_eq!(config.simulator.camera_frames, 10);
    }

    #[test]
    fn test_shipped_default_file_matches_builtin() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let config = Config::load(path).unwrap();
        let builtin = Config::default();

        assert_eq!(config.server.port, builtin.server.port);
        assert_eq!(config.proximity.echo_pin, builtin.proximity.echo_pin);
        assert_eq!(config.accelerometer.bus, builtin.accelerometer.bus);
        assert_eq!(config.accelerometer.address, builtin.accelerometer.address);
        assert_eq!(config.camera.period_ms, builtin.camera.period_ms);
        assert_eq!(config.simulator.acceleration, builtin.simulator.acceleration);
        assert_eq!(config.simulator.temperature, builtin.simulator.temperature);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load("/nonexistent/telemetry.toml");
        assert!(matches!(result, Err(TelemetryError::Io(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = Config::from_toml_str("[server\nport = 1");
        assert!(matches!(result, Err(TelemetryError::Config(_))));
    }

    #[test]
    fn test_invalid_bind_address() {
        let mut config = Config::default();
        config.server.bind_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ephemeral_port_allowed() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_period_zero() {
        let mut config = Config::default();
        config.proximity.period_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_period_too_high() {
        let mut config = Config::default();
        config.camera.period_ms = 10001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settle_too_high() {
        let mut config = Config::default();
        config.proximity.settle_ms = 20000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_trigger_and_echo_pin() {
        let mut config = Config::default();
        config.proximity.echo_pin = config.proximity.trigger_pin;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_gpio_root() {
        let mut config = Config::default();
        config.proximity.gpio_root = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reserved_accelerometer_address() {
        let mut config = Config::default();
        config.accelerometer.address = 0x78;
        assert!(config.validate().is_err());

        config.accelerometer.address = 0x69;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_accel_range_out_of_bounds() {
        let mut config = Config::default();
        config.simulator.accel_range = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_acceleration() {
        let mut config = Config::default();
        config.simulator.acceleration = [0.0, f64::NAN, 1.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_simulated_temperature_out_of_range() {
        let mut config = Config::default();
        config.simulator.temperature = 120.0;
        assert!(config.validate().is_err());

        config.simulator.temperature = f64::NAN;
        assert!(config.validate().is_err());

        config.simulator.temperature = -40.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_bind_address(), "0.0.0.0");
        assert_eq!(default_port(), 10000);
        assert_eq!(default_proximity_period_ms(), 28);
        assert_eq!(default_accel_period_ms(), 33);
        assert_eq!(default_camera_period_ms(), 40);
        assert_eq!(default_gpio_root(), "/sys/class/gpio");
        assert_eq!(default_i2c_bus(), 1);
        assert_eq!(default_temperature(), 25.0);
    }
}

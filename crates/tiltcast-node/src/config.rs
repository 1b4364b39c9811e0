//! Configuration loading for the Tiltcast node.
//!
//! Values are layered, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. a YAML file (`--config <path>`, else `tiltcast.yaml` if present)
//! 3. `TILTCAST_*` environment variables
//! 4. command-line flags (applied by [`crate::cli`])
//!
//! [`TelemetryConfig::validate`] runs once all layers are in.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tiltcast_sensor::mpu6050::DEFAULT_ADDRESS;
use tiltcast_stream::server::MAX_HZ;
use tiltcast_stream::{Keepalive, ServerConfig};

/// File picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "tiltcast.yaml";

/// Highest 7-bit I2C address.
const MAX_I2C_ADDRESS: u16 = 0x7F;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment variable held an unusable value.
    #[error("invalid {var}: {message}")]
    Env {
        /// Variable name.
        var: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// A value is out of range after all layers were applied.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level node configuration.
///
/// Mirrors the structure of `tiltcast.yaml`:
///
/// ```yaml
/// server:
///   host: 0.0.0.0
///   port: 8765
/// broadcast:
///   hz: 20
/// sensor:
///   force_synthetic: false
///   bus: 1
///   address: 0x68
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TelemetryConfig {
    /// Listening socket.
    #[serde(default)]
    pub server: ServerSection,

    /// Broadcast rate.
    #[serde(default)]
    pub broadcast: BroadcastSection,

    /// Orientation sensor.
    #[serde(default)]
    pub sensor: SensorSection,
}

/// Listening socket settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Broadcast loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BroadcastSection {
    /// Samples (and frames) per second.
    #[serde(default = "default_hz")]
    pub hz: u32,
}

impl Default for BroadcastSection {
    fn default() -> Self {
        Self { hz: default_hz() }
    }
}

/// Sensor settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SensorSection {
    /// Skip the hardware entirely and broadcast synthetic data.
    #[serde(default)]
    pub force_synthetic: bool,

    /// I2C adapter number (`/dev/i2c-<bus>`).
    #[serde(default = "default_bus")]
    pub bus: u8,

    /// Device address; YAML accepts `0x68`, `"0x68"`, or `104`.
    #[serde(default = "default_address", deserialize_with = "deserialize_address")]
    pub address: u16,
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            force_synthetic: false,
            bus: default_bus(),
            address: default_address(),
        }
    }
}

impl TelemetryConfig {
    /// Load defaults, then the YAML file at `path` (or
    /// [`DEFAULT_CONFIG_FILE`] if it exists), then environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit file cannot be read, any
    /// file fails to parse, or an environment variable is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty file means "all defaults".
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply `TILTCAST_*` variables from the process environment.
    ///
    /// - `TILTCAST_HOST` overrides `server.host`
    /// - `TILTCAST_PORT` overrides `server.port`
    /// - `TILTCAST_HZ` overrides `broadcast.hz`
    /// - `TILTCAST_MOCK` overrides `sensor.force_synthetic`
    /// - `TILTCAST_I2C_BUS` overrides `sensor.bus`
    /// - `TILTCAST_I2C_ADDR` overrides `sensor.address`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if a set variable cannot be parsed.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if a present variable cannot be parsed.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("TILTCAST_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("TILTCAST_PORT") {
            self.server.port = parse_env("TILTCAST_PORT", &port)?;
        }
        if let Some(hz) = lookup("TILTCAST_HZ") {
            self.broadcast.hz = parse_env("TILTCAST_HZ", &hz)?;
        }
        if let Some(mock) = lookup("TILTCAST_MOCK") {
            self.sensor.force_synthetic = parse_flag("TILTCAST_MOCK", &mock)?;
        }
        if let Some(bus) = lookup("TILTCAST_I2C_BUS") {
            self.sensor.bus = parse_env("TILTCAST_I2C_BUS", &bus)?;
        }
        if let Some(address) = lookup("TILTCAST_I2C_ADDR") {
            self.sensor.address = parse_address(&address).map_err(|message| ConfigError::Env {
                var: "TILTCAST_I2C_ADDR",
                message,
            })?;
        }
        Ok(())
    }

    /// Check ranges that only make sense once every layer is applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a rate outside `1..=1000` Hz,
    /// an empty host, or an address that does not fit in 7 bits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast.hz == 0 || self.broadcast.hz > MAX_HZ {
            return Err(ConfigError::Invalid(format!(
                "broadcast.hz must be between 1 and {MAX_HZ}, got {}",
                self.broadcast.hz
            )));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "server.host must not be empty",
            )));
        }
        if self.sensor.address > MAX_I2C_ADDRESS {
            return Err(ConfigError::Invalid(format!(
                "sensor.address 0x{:X} does not fit in 7 bits",
                self.sensor.address
            )));
        }
        Ok(())
    }

    /// Server settings for [`tiltcast_stream::TelemetryServer::bind`].
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            hz: self.broadcast.hz,
            keepalive: Keepalive::default(),
        }
    }

    /// Broadcast period implied by `broadcast.hz`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the rate is out of range.
    pub fn period(&self) -> Result<Duration, ConfigError> {
        self.server_config()
            .period()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Parse an integer the way `--addr` accepts it: `0x`/`0o`/`0b`
/// prefixes select the radix, anything else is decimal.
///
/// # Errors
///
/// Returns a message suitable for a CLI or config error.
pub fn parse_address(raw: &str) -> Result<u16, String> {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    let (digits, radix) = if let Some(hex) = lower.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (oct, 8)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (bin, 2)
    } else {
        (lower.as_str(), 10)
    };
    u16::from_str_radix(digits, radix).map_err(|e| format!("invalid address {trimmed:?}: {e}"))
}

fn parse_env<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        message: format!("{raw:?}: {e}"),
    })
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Env {
            var,
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn deserialize_address<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u16),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => parse_address(&s).map_err(serde::de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8765
}

const fn default_hz() -> u32 {
    20
}

const fn default_bus() -> u8 {
    1
}

const fn default_address() -> u16 {
    DEFAULT_ADDRESS
}

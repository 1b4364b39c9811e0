//! Command-line flags.
//!
//! Every flag is optional; a flag that is given wins over the YAML file
//! and the environment.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{parse_address, TelemetryConfig};

/// Stream accelerometer roll/pitch to `WebSocket` clients.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "tiltcast", version, about)]
pub struct Cli {
    /// YAML configuration file (default: ./tiltcast.yaml if present).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Bind host.
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Broadcast rate in Hz (1-1000).
    #[arg(long)]
    pub hz: Option<u32>,

    /// Broadcast synthetic data without touching the sensor.
    #[arg(long)]
    pub mock: bool,

    /// I2C adapter number (`/dev/i2c-<N>`).
    #[arg(long = "i2c", value_name = "BUS")]
    pub i2c_bus: Option<u8>,

    /// Sensor address, hex (`0x68`) or decimal.
    #[arg(long, value_name = "ADDR", value_parser = parse_address)]
    pub addr: Option<u16>,
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut TelemetryConfig) {
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(hz) = self.hz {
            config.broadcast.hz = hz;
        }
        if self.mock {
            config.sensor.force_synthetic = true;
        }
        if let Some(bus) = self.i2c_bus {
            config.sensor.bus = bus;
        }
        if let Some(address) = self.addr {
            config.sensor.address = address;
        }
    }
}

//! Tiltcast node: streams accelerometer roll/pitch over `WebSocket`.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Parse flags and load configuration (defaults, YAML, env, flags)
//! 3. Bring up the MPU-60x0, or fall back to synthetic data
//! 4. Bind the telemetry server
//! 5. Serve and broadcast until SIGINT or SIGTERM
//!
//! Shutdown does not drain: the server future is dropped, which closes
//! every connection and releases the sensor bus.

mod cli;
mod config;
mod error;

use clap::Parser;
use tiltcast_sensor::i2c::open_mpu6050;
use tiltcast_sensor::{FailoverSampler, OrientationSource};
use tiltcast_stream::TelemetryServer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::{SensorSection, TelemetryConfig};
use crate::error::NodeError;

/// Application entry point for the Tiltcast node.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the server cannot
/// bind. Sensor problems are never fatal.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // 2. Load configuration.
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(
        host = config.server.host,
        port = config.server.port,
        hz = config.broadcast.hz,
        force_synthetic = config.sensor.force_synthetic,
        i2c_bus = config.sensor.bus,
        i2c_addr = format_args!("0x{:02X}", config.sensor.address),
        "Configuration loaded"
    );

    // 3. Bring up the sensor.
    let period = config.period().map_err(NodeError::from)?;
    let source = open_sensor(&config.sensor);
    let sampler = FailoverSampler::new(source, config.sensor.force_synthetic, period);

    // 4. Bind.
    let server = TelemetryServer::bind(&config.server_config(), sampler)
        .await
        .map_err(NodeError::from)?;
    info!(addr = %server.local_addr(), "tiltcast-node started");

    // 5. Run until a signal arrives.
    tokio::select! {
        result = server.run() => result.map_err(NodeError::from)?,
        () = shutdown_signal() => info!("shutting down"),
    }

    Ok(())
}

/// Merge every configuration layer and validate the result.
fn load_config(cli: &Cli) -> Result<TelemetryConfig, NodeError> {
    let mut config = TelemetryConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Open and initialize the MPU-60x0, or `None` to run synthetic.
fn open_sensor(sensor: &SensorSection) -> Option<Box<dyn OrientationSource>> {
    if sensor.force_synthetic {
        info!("synthetic data forced, sensor not opened");
        return None;
    }

    match open_mpu6050(sensor.bus, sensor.address) {
        Ok((mpu, report)) => {
            let warnings = report.warnings().count();
            info!(
                bus = sensor.bus,
                addr = format_args!("0x{:02X}", sensor.address),
                who_am_i = ?report.who_am_i,
                init_warnings = warnings,
                "MPU-60x0 initialized"
            );
            let source: Box<dyn OrientationSource> = Box::new(mpu);
            Some(source)
        }
        Err(e) => {
            warn!(
                bus = sensor.bus,
                addr = format_args!("0x{:02X}", sensor.address),
                error = %e,
                "sensor unavailable, broadcasting synthetic data"
            );
            None
        }
    }
}

/// Resolve on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!(signal = "SIGINT", "signal received"),
        () = terminate => info!(signal = "SIGTERM", "signal received"),
    }
}

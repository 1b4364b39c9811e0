//! Telemetry server lifecycle.
//!
//! [`TelemetryServer::bind`] claims the listening socket up front so
//! bind errors surface before anything else starts, and so callers
//! binding port 0 can learn the real address. [`TelemetryServer::run`]
//! then drives the HTTP/`WebSocket` server and the broadcast loop
//! together; dropping that future stops both and releases the sampler
//! (and with it the sensor bus).

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tiltcast_sensor::FailoverSampler;
use tokio::net::TcpListener;
use tracing::info;

use crate::broadcast::BroadcastLoop;
use crate::connection::Keepalive;
use crate::router::build_router;
use crate::state::AppState;

/// Highest accepted broadcast rate.
pub const MAX_HZ: u32 = 1_000;

/// Configuration for the telemetry server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host or address to bind (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port; 0 picks a free one.
    pub port: u16,
    /// Broadcast rate, Hz.
    pub hz: u32,
    /// Liveness probing for every connection.
    pub keepalive: Keepalive,
}

impl ServerConfig {
    /// Tick period for the configured rate.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidRate`] unless `1 <= hz <= MAX_HZ`.
    pub fn period(&self) -> Result<Duration, ServerError> {
        if self.hz == 0 || self.hz > MAX_HZ {
            return Err(ServerError::InvalidRate(self.hz));
        }
        Ok(Duration::from_secs_f64(1.0 / f64::from(self.hz)))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8765,
            hz: 20,
            keepalive: Keepalive::default(),
        }
    }
}

/// A bound, not yet running, telemetry server.
#[derive(Debug)]
pub struct TelemetryServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<AppState>,
    broadcaster: BroadcastLoop,
}

impl TelemetryServer {
    /// Bind the listening socket and assemble the broadcast loop.
    ///
    /// The sampler should have been created with [`ServerConfig::period`]
    /// so its synthetic phase advances in step with the ticks.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidRate`] for an out-of-range rate and
    /// [`ServerError::Bind`] if the socket cannot be bound.
    pub async fn bind(config: &ServerConfig, sampler: FailoverSampler) -> Result<Self, ServerError> {
        let period = config.period()?;

        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| {
                ServerError::Bind(format!("bind failed on {}:{}: {e}", config.host, config.port))
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(format!("no local address: {e}")))?;

        let state =
            Arc::new(AppState::new(config.hz, sampler.mode()).with_keepalive(config.keepalive));
        let broadcaster = BroadcastLoop::new(
            sampler,
            Arc::clone(&state.registry),
            Arc::clone(&state.stats),
            period,
        );

        Ok(Self {
            listener,
            local_addr,
            state,
            broadcaster,
        })
    }

    /// The address actually bound.
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared state (registry, counters) of this server.
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Serve connections and broadcast until the future is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Serve`] if the accept loop fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self {
            listener,
            local_addr,
            state,
            broadcaster,
        } = self;

        let router = build_router(state);
        info!(
            addr = %local_addr,
            period_ms = broadcaster.period().as_millis(),
            "telemetry server listening"
        );

        let serve = axum::serve(listener, router).into_future();
        tokio::select! {
            result = serve => {
                result.map_err(|e| ServerError::Serve(format!("serve error: {e}")))
            }
            () = broadcaster.run() => Ok(()),
        }
    }
}

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The broadcast rate is outside `1..=MAX_HZ`.
    #[error("invalid broadcast rate: {0} Hz")]
    InvalidRate(u32),

    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

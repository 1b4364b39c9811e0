//! Shared application state for the telemetry server.
//!
//! [`AppState`] is wrapped in [`Arc`] and injected into handlers via
//! Axum's `State` extractor. The registry is the only structure both
//! kinds of task mutate; [`TelemetryStats`] is written by the broadcast
//! loop alone and read by the status endpoint.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tiltcast_sensor::SamplerMode;

use crate::connection::Keepalive;
use crate::protocol::SERVER_ID;
use crate::registry::{ClientRegistry, DEFAULT_OUTBOUND_CAPACITY};

/// Counters published by the broadcast loop.
#[derive(Debug)]
pub struct TelemetryStats {
    ticks: AtomicU64,
    synthetic: AtomicBool,
}

impl TelemetryStats {
    /// Create counters for a sampler starting in `mode`.
    pub const fn new(mode: SamplerMode) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            synthetic: AtomicBool::new(matches!(mode, SamplerMode::Synthetic)),
        }
    }

    /// Record a completed tick and return its 1-based number.
    pub fn record_tick(&self, mode: SamplerMode) -> u64 {
        self.synthetic
            .store(matches!(mode, SamplerMode::Synthetic), Ordering::Release);
        self.ticks.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Sampler mode as of the last tick.
    pub fn mode(&self) -> SamplerMode {
        if self.synthetic.load(Ordering::Acquire) {
            SamplerMode::Synthetic
        } else {
            SamplerMode::Real
        }
    }
}

/// Shared state for the Axum application.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Connected clients.
    pub registry: Arc<ClientRegistry>,
    /// Broadcast counters.
    pub stats: Arc<TelemetryStats>,
    /// Identifier sent in `hello_ack`.
    pub server_id: String,
    /// Broadcast rate, Hz.
    pub hz: u32,
    /// Per-connection liveness probing.
    pub keepalive: Keepalive,
    /// Frames buffered per client before sends start waiting.
    pub outbound_capacity: usize,
}

impl AppState {
    /// Create state for a server broadcasting at `hz` with a sampler
    /// starting in `mode`.
    pub fn new(hz: u32, mode: SamplerMode) -> Self {
        Self {
            registry: Arc::new(ClientRegistry::new()),
            stats: Arc::new(TelemetryStats::new(mode)),
            server_id: SERVER_ID.to_owned(),
            hz,
            keepalive: Keepalive::default(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }

    /// Replace the keepalive settings.
    #[must_use]
    pub fn with_keepalive(mut self, keepalive: Keepalive) -> Self {
        self.keepalive = keepalive;
        self
    }
}

//! Fixed-rate broadcast loop.
//!
//! Every tick the loop takes exactly one sample from the
//! [`FailoverSampler`], serializes it once, and queues the same bytes
//! for every client in a registry snapshot. Sends run concurrently and
//! each one is bounded by the tick period, so a stuck client costs at
//! most one period and never delays delivery to the others.
//!
//! A client whose send fails is asked to tear down. The loop never
//! removes registry entries itself; the connection task does that when
//! it exits.
//!
//! Ticks are scheduled at a fixed rate. A tick that runs late delays
//! the following ones instead of being skipped.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use futures::future::join_all;
use tiltcast_sensor::{FailoverSampler, OrientationSample};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::protocol::ServerMessage;
use crate::registry::ClientRegistry;
use crate::state::TelemetryStats;

/// Outcome of one broadcast tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// 1-based tick number.
    pub tick: u64,
    /// The sample produced for this tick.
    pub sample: OrientationSample,
    /// Clients in the snapshot.
    pub attempted: usize,
    /// Clients whose queue accepted the frame.
    pub delivered: usize,
    /// Clients that failed and were asked to tear down.
    pub failed: usize,
}

/// Samples and fans out orientation frames at a fixed rate.
#[derive(Debug)]
pub struct BroadcastLoop {
    sampler: FailoverSampler,
    registry: Arc<ClientRegistry>,
    stats: Arc<TelemetryStats>,
    period: Duration,
    send_timeout: Duration,
}

impl BroadcastLoop {
    /// Create a loop ticking every `period`. Sends are bounded by the
    /// same period.
    pub const fn new(
        sampler: FailoverSampler,
        registry: Arc<ClientRegistry>,
        stats: Arc<TelemetryStats>,
        period: Duration,
    ) -> Self {
        Self {
            sampler,
            registry,
            stats,
            period,
            send_timeout: period,
        }
    }

    /// Tick period.
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// The sampler driven by this loop.
    pub const fn sampler(&self) -> &FailoverSampler {
        &self.sampler
    }

    /// Run one tick immediately: sample, serialize, fan out.
    pub async fn tick(&mut self) -> TickReport {
        // In real mode this is six blocking SMBus byte reads (well under
        // a millisecond at 400 kHz), done inline on the runtime thread.
        let sample = self.sampler.sample();
        let tick = self.stats.record_tick(self.sampler.mode());

        let mut report = TickReport {
            tick,
            sample,
            attempted: 0,
            delivered: 0,
            failed: 0,
        };

        let frame: Utf8Bytes = match ServerMessage::imu(&sample).to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(tick, error = %e, "failed to serialize orientation sample");
                return report;
            }
        };

        let clients = self.registry.snapshot();
        if clients.is_empty() {
            return report;
        }

        let timeout = self.send_timeout;
        let results = join_all(clients.iter().map(|client| {
            let frame = frame.clone();
            async move { (client, client.send(frame, timeout).await) }
        }))
        .await;

        report.attempted = results.len();
        for (client, result) in results {
            match result {
                Ok(()) => report.delivered = report.delivered.saturating_add(1),
                Err(e) => {
                    debug!(tick, client = %client.id(), error = %e, "broadcast send failed, tearing down client");
                    client.close();
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }

        trace!(
            tick,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "tick broadcast"
        );
        report
    }

    /// Tick forever at the configured rate. The first tick fires one
    /// period after the call.
    pub async fn run(mut self) {
        info!(
            period_ms = self.period.as_millis(),
            mode = ?self.sampler.mode(),
            "broadcast loop starting"
        );
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}

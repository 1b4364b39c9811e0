//! Failover sampler: one sample per call, never fails.
//!
//! The sampler starts in [`SamplerMode::Real`] when it is given a
//! source and is not forced into synthetic mode. The first read error
//! (or non-finite reading) is logged, the source is dropped, and the
//! sampler stays in [`SamplerMode::Synthetic`] for the rest of the run.
//! It never goes back, even if the device would start answering again,
//! so clients never see the `mock` flag flip back and forth.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::HardwareError;
use crate::sample::{Orientation, OrientationSample};
use crate::source::OrientationSource;
use crate::synthetic::SyntheticGenerator;

/// Where the sampler's values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerMode {
    /// Values are read from the orientation source.
    Real,
    /// Values come from the synthetic generator.
    Synthetic,
}

/// Point-in-time view of the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplerState {
    /// Current mode.
    pub mode: SamplerMode,
    /// Synthetic phase accumulated so far, seconds.
    pub phase: f64,
}

/// Wraps an orientation source and falls back to synthetic data.
pub struct FailoverSampler {
    source: Option<Box<dyn OrientationSource>>,
    synthetic: SyntheticGenerator,
    failovers: u64,
}

impl FailoverSampler {
    /// Create a sampler.
    ///
    /// `tick` is the broadcast period; the synthetic phase advances by it
    /// on every synthetic sample. When `force_synthetic` is set the
    /// source, if any, is released immediately.
    pub fn new(
        source: Option<Box<dyn OrientationSource>>,
        force_synthetic: bool,
        tick: Duration,
    ) -> Self {
        let source = if force_synthetic { None } else { source };
        match &source {
            Some(s) => info!(source = %s.describe(), "sampler starting in real mode"),
            None => info!("sampler starting in synthetic mode"),
        }
        Self {
            source,
            synthetic: SyntheticGenerator::new(tick),
            failovers: 0,
        }
    }

    /// Create a sampler that only ever produces synthetic values.
    pub fn synthetic(tick: Duration) -> Self {
        Self::new(None, true, tick)
    }

    /// Current mode.
    pub const fn mode(&self) -> SamplerMode {
        if self.source.is_some() {
            SamplerMode::Real
        } else {
            SamplerMode::Synthetic
        }
    }

    /// Current mode and synthetic phase.
    pub const fn state(&self) -> SamplerState {
        SamplerState {
            mode: self.mode(),
            phase: self.synthetic.phase(),
        }
    }

    /// Number of real-to-synthetic transitions so far (0 or 1).
    pub const fn failovers(&self) -> u64 {
        self.failovers
    }

    /// Produce the sample for this tick, stamped with the current time.
    pub fn sample(&mut self) -> OrientationSample {
        self.sample_at(Utc::now().timestamp_millis())
    }

    /// Produce the sample for this tick with an explicit timestamp.
    pub fn sample_at(&mut self, timestamp_ms: i64) -> OrientationSample {
        if let Some(source) = self.source.as_mut() {
            match source.read().and_then(check_finite) {
                Ok(orientation) => return OrientationSample::new(orientation, false, timestamp_ms),
                Err(e) => {
                    warn!(
                        source = %source.describe(),
                        error = %e,
                        "orientation read failed, switching to synthetic for the rest of the run"
                    );
                    self.source = None;
                    self.failovers = self.failovers.saturating_add(1);
                }
            }
        }

        OrientationSample::new(self.synthetic.next_orientation(), true, timestamp_ms)
    }
}

impl std::fmt::Debug for FailoverSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverSampler")
            .field("mode", &self.mode())
            .field("phase", &self.synthetic.phase())
            .field("failovers", &self.failovers)
            .finish_non_exhaustive()
    }
}

fn check_finite(orientation: Orientation) -> Result<Orientation, HardwareError> {
    if orientation.is_finite() {
        Ok(orientation)
    } else {
        Err(HardwareError::InvalidReading(format!(
            "roll={} pitch={}",
            orientation.roll_deg, orientation.pitch_deg
        )))
    }
}

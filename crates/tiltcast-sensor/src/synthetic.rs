//! Deterministic synthetic orientation generator.
//!
//! Produces a smooth, bounded, obviously non-physical motion so that
//! clients and tests can tell it apart from a real sensor:
//!
//! ```text
//! roll  =  8.0 * sin(phase * 0.7)
//! pitch = -5.0 * cos(phase * 1.1)
//! ```
//!
//! The phase advances by the tick interval (in seconds) before every
//! value is computed.

use std::time::Duration;

use crate::sample::Orientation;

/// Roll amplitude, degrees.
pub const ROLL_AMPLITUDE_DEG: f64 = 8.0;
/// Roll angular frequency, radians per second of phase.
pub const ROLL_FREQUENCY: f64 = 0.7;
/// Pitch amplitude, degrees. Negative so phase 0 starts nose-down.
pub const PITCH_AMPLITUDE_DEG: f64 = -5.0;
/// Pitch angular frequency, radians per second of phase.
pub const PITCH_FREQUENCY: f64 = 1.1;

/// Phase-accumulating sine/cosine generator.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticGenerator {
    phase: f64,
    step: f64,
}

impl SyntheticGenerator {
    /// Create a generator at phase 0 that advances by `tick` per value.
    pub const fn new(tick: Duration) -> Self {
        Self::with_phase(tick, 0.0)
    }

    /// Create a generator starting from an arbitrary phase.
    pub const fn with_phase(tick: Duration, phase: f64) -> Self {
        Self {
            phase,
            step: tick.as_secs_f64(),
        }
    }

    /// Accumulated phase, seconds.
    pub const fn phase(&self) -> f64 {
        self.phase
    }

    /// Orientation at a given phase without touching any state.
    pub fn at_phase(phase: f64) -> Orientation {
        Orientation::new(
            ROLL_AMPLITUDE_DEG * (phase * ROLL_FREQUENCY).sin(),
            PITCH_AMPLITUDE_DEG * (phase * PITCH_FREQUENCY).cos(),
        )
    }

    /// Advance by one tick and return the orientation at the new phase.
    pub fn next_orientation(&mut self) -> Orientation {
        self.phase += self.step;
        Self::at_phase(self.phase)
    }
}

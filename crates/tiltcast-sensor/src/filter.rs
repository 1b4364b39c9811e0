//! Exponential low-pass filter for accelerometer-derived angles.
//!
//! `new = alpha * prev + (1 - alpha) * raw`. An alpha close to 1.0 keeps
//! more of the previous value, so 0.70 gives a fairly smooth output
//! without gyro fusion.

use crate::sample::Orientation;

/// Smoothing factor used by the MPU-60x0 source.
pub const DEFAULT_SMOOTHING: f64 = 0.70;

/// Two-axis exponential low-pass filter.
#[derive(Debug, Clone, PartialEq)]
pub struct LowPassFilter {
    alpha: f64,
    state: Option<Orientation>,
}

impl LowPassFilter {
    /// Create a filter with the given smoothing factor, clamped to `0.0..=1.0`.
    pub const fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: None,
        }
    }

    /// The smoothing factor in use.
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Current filtered value, if the filter has been seeded.
    pub const fn value(&self) -> Option<Orientation> {
        self.state
    }

    /// Reset the filter state to `initial`.
    pub const fn seed(&mut self, initial: Orientation) {
        self.state = Some(initial);
    }

    /// Feed one raw reading and return the filtered value.
    ///
    /// An unseeded filter adopts the first reading as-is.
    pub fn apply(&mut self, raw: Orientation) -> Orientation {
        let next = match self.state {
            Some(prev) => {
                let keep = self.alpha;
                let take = 1.0 - self.alpha;
                Orientation::new(
                    keep.mul_add(prev.roll_deg, take * raw.roll_deg),
                    keep.mul_add(prev.pitch_deg, take * raw.pitch_deg),
                )
            }
            None => raw,
        };
        self.state = Some(next);
        next
    }
}

impl Default for LowPassFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING)
    }
}

//! Orientation value types.

use serde::{Deserialize, Serialize};

/// A roll/pitch pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    /// Rotation about the longitudinal axis, degrees.
    pub roll_deg: f64,
    /// Rotation about the lateral axis, degrees.
    pub pitch_deg: f64,
}

impl Orientation {
    /// Create an orientation from degree values.
    pub const fn new(roll_deg: f64, pitch_deg: f64) -> Self {
        Self {
            roll_deg,
            pitch_deg,
        }
    }

    /// Whether both angles are finite numbers.
    pub const fn is_finite(&self) -> bool {
        self.roll_deg.is_finite() && self.pitch_deg.is_finite()
    }
}

/// One tick's reading, immutable once produced.
///
/// Exactly one sample is produced per broadcast tick and every client
/// receives the same serialized form of it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    /// Roll in degrees.
    pub roll_deg: f64,
    /// Pitch in degrees.
    pub pitch_deg: f64,
    /// `true` when the value came from the synthetic generator.
    pub is_synthetic: bool,
    /// Wall-clock time of the sample, Unix epoch milliseconds.
    pub timestamp_ms: i64,
}

impl OrientationSample {
    /// Build a sample from an orientation reading.
    pub const fn new(orientation: Orientation, is_synthetic: bool, timestamp_ms: i64) -> Self {
        Self {
            roll_deg: orientation.roll_deg,
            pitch_deg: orientation.pitch_deg,
            is_synthetic,
            timestamp_ms,
        }
    }

    /// The roll/pitch pair carried by this sample.
    pub const fn orientation(&self) -> Orientation {
        Orientation::new(self.roll_deg, self.pitch_deg)
    }
}

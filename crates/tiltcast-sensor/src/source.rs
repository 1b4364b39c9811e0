//! The orientation source abstraction.
//!
//! A source produces roll/pitch in degrees or fails with a
//! [`HardwareError`]. The [`FailoverSampler`] calls [`read`] once per
//! tick while the source is healthy and drops it after the first
//! failure, which releases whatever bus handle the source owns.
//!
//! Bring-up (opening the bus, configuring registers) is specific to
//! each backend and happens before the source is handed to the
//! sampler; see [`Mpu6050::init`].
//!
//! [`FailoverSampler`]: crate::sampler::FailoverSampler
//! [`read`]: OrientationSource::read
//! [`Mpu6050::init`]: crate::mpu6050::Mpu6050::init

use crate::error::HardwareError;
use crate::sample::Orientation;

/// Something that can report the current roll and pitch.
pub trait OrientationSource: Send {
    /// Read the current orientation in degrees.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError`] when the underlying device cannot be
    /// read. Any error is treated as fatal for the session by the
    /// sampler.
    fn read(&mut self) -> Result<Orientation, HardwareError>;

    /// Short human-readable description used in log fields.
    fn describe(&self) -> String {
        String::from("orientation source")
    }
}

impl<S: OrientationSource + ?Sized> OrientationSource for Box<S> {
    fn read(&mut self) -> Result<Orientation, HardwareError> {
        (**self).read()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

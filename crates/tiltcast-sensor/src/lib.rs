//! Orientation sampling for the Tiltcast telemetry service.
//!
//! This crate owns everything between the sensor and the broadcast loop:
//!
//! - [`source`] -- the [`OrientationSource`] trait every backend implements.
//! - [`mpu6050`] -- MPU-60x0 accelerometer driver over a [`RegisterBus`].
//! - [`i2c`] -- Linux I2C register bus (real access needs the `hardware`
//!   feature).
//! - [`filter`] -- exponential low-pass filter applied inside real sources.
//! - [`synthetic`] -- deterministic sine/cosine generator used as fallback.
//! - [`sampler`] -- [`FailoverSampler`], which never fails and demotes to
//!   synthetic data for the rest of the run after the first read error.
//!
//! All angles leaving this crate are in degrees.
//!
//! [`OrientationSource`]: source::OrientationSource
//! [`RegisterBus`]: mpu6050::RegisterBus
//! [`FailoverSampler`]: sampler::FailoverSampler

pub mod error;
pub mod filter;
pub mod i2c;
pub mod mpu6050;
pub mod sample;
pub mod sampler;
pub mod source;
pub mod synthetic;

pub use error::HardwareError;
pub use sample::{Orientation, OrientationSample};
pub use sampler::{FailoverSampler, SamplerMode, SamplerState};
pub use source::OrientationSource;
pub use synthetic::SyntheticGenerator;

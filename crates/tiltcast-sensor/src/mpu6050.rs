//! MPU-60x0 accelerometer-only orientation source.
//!
//! The driver talks to the chip through a [`RegisterBus`], so the same
//! code runs against the Linux I2C bus in production and an in-memory
//! register file in tests.
//!
//! # Initialization
//!
//! [`Mpu6050::init`] runs a fixed sequence of configuration steps and
//! records the outcome of each one in an [`InitReport`]. Configuration
//! writes that fail are warnings: the chip usually still produces
//! usable accelerometer data with its power-on defaults. The only hard
//! failure is the final read that seeds the low-pass filter, since a
//! device that cannot be read at startup will not be read later either.
//!
//! # Angles
//!
//! Roll and pitch come from the gravity vector only:
//!
//! ```text
//! roll  = atan2(ay, az)
//! pitch = atan2(-ax, sqrt(ay^2 + az^2))
//! ```
//!
//! and are smoothed with a [`LowPassFilter`] (alpha 0.70).

use std::fmt;

use tracing::{debug, warn};

use crate::error::HardwareError;
use crate::filter::LowPassFilter;
use crate::sample::Orientation;
use crate::source::OrientationSource;

/// Register map subset used by the driver.
pub mod registers {
    /// Sample rate divider.
    pub const SMPLRT_DIV: u8 = 0x19;
    /// DLPF configuration.
    pub const CONFIG: u8 = 0x1A;
    /// Gyroscope full-scale range.
    pub const GYRO_CONFIG: u8 = 0x1B;
    /// Accelerometer full-scale range.
    pub const ACCEL_CONFIG: u8 = 0x1C;
    /// First accelerometer output register (X high byte).
    pub const ACCEL_XOUT_H: u8 = 0x3B;
    /// Power management 1.
    pub const PWR_MGMT_1: u8 = 0x6B;
    /// Device identity.
    pub const WHO_AM_I: u8 = 0x75;
}

/// Default 7-bit I2C address (AD0 low).
pub const DEFAULT_ADDRESS: u16 = 0x68;

/// LSB per g at the +/-2 g full-scale setting.
pub const ACCEL_LSB_PER_G: f64 = 16_384.0;

/// Byte-wide register access to a single device.
pub trait RegisterBus: Send {
    /// Read one register.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Bus`] if the transfer fails.
    fn read_register(&mut self, register: u8) -> Result<u8, HardwareError>;

    /// Write one register.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Bus`] if the transfer fails.
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), HardwareError>;

    /// Description of the bus and device address for log fields.
    fn describe(&self) -> String {
        String::from("register bus")
    }
}

/// One configuration step performed by [`Mpu6050::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    /// Read `WHO_AM_I`.
    ProbeIdentity,
    /// Clear sleep, internal clock.
    Wake,
    /// Digital low-pass filter at 44 Hz.
    DigitalLowPass,
    /// 1 kHz / (19 + 1) = 50 Hz output rate.
    SampleRate,
    /// Gyro +/-250 dps.
    GyroRange,
    /// Accelerometer +/-2 g.
    AccelRange,
}

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ProbeIdentity => "probe_identity",
            Self::Wake => "wake",
            Self::DigitalLowPass => "digital_low_pass",
            Self::SampleRate => "sample_rate",
            Self::GyroRange => "gyro_range",
            Self::AccelRange => "accel_range",
        };
        f.write_str(name)
    }
}

/// Outcome of a single initialization step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// The step.
    pub step: InitStep,
    /// `Ok` if every register transfer in the step succeeded.
    pub result: Result<(), HardwareError>,
}

/// Per-step record of an initialization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    /// `WHO_AM_I` value, if the probe succeeded.
    pub who_am_i: Option<u8>,
    /// Every step in execution order.
    pub steps: Vec<StepOutcome>,
}

impl InitReport {
    /// Steps that failed (non-fatal).
    pub fn warnings(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.result.is_err())
    }

    /// Whether every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.warnings().next().is_none()
    }
}

/// Accelerometer-based roll/pitch source for the MPU-6050/6000.
pub struct Mpu6050<B> {
    bus: B,
    filter: LowPassFilter,
    initialized: bool,
}

impl<B: RegisterBus> Mpu6050<B> {
    /// Wrap a register bus. The device is not touched until [`init`](Self::init).
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            filter: LowPassFilter::default(),
            initialized: false,
        }
    }

    /// Whether [`init`](Self::init) has completed.
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Configure the device and seed the filter with a first reading.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError`] if the seeding accelerometer read fails.
    /// Failed configuration writes are reported in the [`InitReport`]
    /// and logged, but do not fail initialization.
    pub fn init(&mut self) -> Result<InitReport, HardwareError> {
        let mut report = InitReport::default();

        let probe = self.bus.read_register(registers::WHO_AM_I);
        if let Ok(who) = &probe {
            debug!(who_am_i = format!("0x{who:02X}"), "MPU-60x0 probed");
        }
        report.who_am_i = probe.as_ref().ok().copied();
        report.steps.push(StepOutcome {
            step: InitStep::ProbeIdentity,
            result: probe.map(|_| ()),
        });

        let writes = [
            (InitStep::Wake, registers::PWR_MGMT_1, 0x00),
            (InitStep::DigitalLowPass, registers::CONFIG, 0x03),
            (InitStep::SampleRate, registers::SMPLRT_DIV, 19),
            (InitStep::GyroRange, registers::GYRO_CONFIG, 0x00),
            (InitStep::AccelRange, registers::ACCEL_CONFIG, 0x00),
        ];
        for (step, register, value) in writes {
            let result = self.bus.write_register(register, value);
            report.steps.push(StepOutcome { step, result });
        }

        for warning in report.warnings() {
            if let Err(e) = &warning.result {
                warn!(bus = %self.bus.describe(), step = %warning.step, error = %e, "MPU-60x0 init step failed, continuing");
            }
        }

        let [ax, ay, az] = self.read_accel_g()?;
        self.filter.seed(accel_to_orientation(ax, ay, az));
        self.initialized = true;

        Ok(report)
    }

    /// Read the three accelerometer axes in g.
    fn read_accel_g(&mut self) -> Result<[f64; 3], HardwareError> {
        let mut axes = [0.0; 3];
        for (register, axis) in [
            registers::ACCEL_XOUT_H,
            registers::ACCEL_XOUT_H.wrapping_add(2),
            registers::ACCEL_XOUT_H.wrapping_add(4),
        ]
        .into_iter()
        .zip(axes.iter_mut())
        {
            *axis = f64::from(self.read_word(register)?) / ACCEL_LSB_PER_G;
        }
        Ok(axes)
    }

    /// Read a big-endian two's complement word starting at `register_high`.
    fn read_word(&mut self, register_high: u8) -> Result<i16, HardwareError> {
        let hi = self.bus.read_register(register_high)?;
        let lo = self.bus.read_register(register_high.wrapping_add(1))?;
        Ok(i16::from_be_bytes([hi, lo]))
    }
}

impl<B: RegisterBus> OrientationSource for Mpu6050<B> {
    fn read(&mut self) -> Result<Orientation, HardwareError> {
        if !self.initialized {
            return Err(HardwareError::NotInitialized);
        }
        let [ax, ay, az] = self.read_accel_g()?;
        Ok(self.filter.apply(accel_to_orientation(ax, ay, az)))
    }

    fn describe(&self) -> String {
        format!("mpu6050 on {}", self.bus.describe())
    }
}

/// Roll and pitch in degrees from a gravity vector in g.
pub fn accel_to_orientation(ax: f64, ay: f64, az: f64) -> Orientation {
    let roll = ay.atan2(az).to_degrees();
    let pitch = (-ax).atan2(ay.hypot(az)).to_degrees();
    Orientation::new(roll, pitch)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;

    /// In-memory register file with optional failing registers.
    #[derive(Default)]
    struct FakeBus {
        registers: BTreeMap<u8, u8>,
        failing_reads: BTreeSet<u8>,
        failing_writes: BTreeSet<u8>,
        writes: Vec<(u8, u8)>,
    }

    impl FakeBus {
        fn with_accel(ax: i16, ay: i16, az: i16) -> Self {
            let mut bus = Self::default();
            bus.registers.insert(registers::WHO_AM_I, 0x68);
            bus.set_accel(ax, ay, az);
            bus
        }

        fn set_accel(&mut self, ax: i16, ay: i16, az: i16) {
            for (offset, value) in [(0u8, ax), (2, ay), (4, az)] {
                let [hi, lo] = value.to_be_bytes();
                self.registers.insert(registers::ACCEL_XOUT_H + offset, hi);
                self.registers.insert(registers::ACCEL_XOUT_H + offset + 1, lo);
            }
        }
    }

    impl RegisterBus for FakeBus {
        fn read_register(&mut self, register: u8) -> Result<u8, HardwareError> {
            if self.failing_reads.contains(&register) {
                return Err(HardwareError::Bus {
                    register,
                    message: String::from("nack"),
                });
            }
            Ok(self.registers.get(&register).copied().unwrap_or(0))
        }

        fn write_register(&mut self, register: u8, value: u8) -> Result<(), HardwareError> {
            if self.failing_writes.contains(&register) {
                return Err(HardwareError::Bus {
                    register,
                    message: String::from("nack"),
                });
            }
            self.writes.push((register, value));
            self.registers.insert(register, value);
            Ok(())
        }
    }

    const ONE_G: i16 = 16_384;

    #[test]
    fn flat_device_reads_level() {
        let o = accel_to_orientation(0.0, 0.0, 1.0);
        assert!(o.roll_deg.abs() < 1e-9);
        assert!(o.pitch_deg.abs() < 1e-9);
    }

    #[test]
    fn rolled_ninety_degrees() {
        let o = accel_to_orientation(0.0, 1.0, 0.0);
        assert!((o.roll_deg - 90.0).abs() < 1e-9);
    }

    #[test]
    fn nose_up_gives_positive_pitch() {
        let o = accel_to_orientation(-1.0, 0.0, 0.0);
        assert!((o.pitch_deg - 90.0).abs() < 1e-9);
    }

    #[test]
    fn read_before_init_fails() {
        let mut mpu = Mpu6050::new(FakeBus::with_accel(0, 0, ONE_G));
        assert_eq!(mpu.read(), Err(HardwareError::NotInitialized));
    }

    #[test]
    fn init_writes_configuration_in_order() {
        let mut mpu = Mpu6050::new(FakeBus::with_accel(0, 0, ONE_G));
        let report = mpu.init();
        assert!(report.is_ok());
        let report = report.unwrap_or_default();
        assert!(report.is_clean());
        assert_eq!(report.who_am_i, Some(0x68));
        assert_eq!(
            mpu.bus.writes,
            vec![
                (registers::PWR_MGMT_1, 0x00),
                (registers::CONFIG, 0x03),
                (registers::SMPLRT_DIV, 19),
                (registers::GYRO_CONFIG, 0x00),
                (registers::ACCEL_CONFIG, 0x00),
            ]
        );
        assert!(mpu.is_initialized());
    }

    #[test]
    fn failed_config_writes_are_warnings() {
        let mut bus = FakeBus::with_accel(0, 0, ONE_G);
        bus.failing_writes.insert(registers::CONFIG);
        bus.failing_reads.insert(registers::WHO_AM_I);
        let mut mpu = Mpu6050::new(bus);

        let report = mpu.init().unwrap_or_default();
        assert!(mpu.is_initialized());
        let failed: Vec<InitStep> = report.warnings().map(|s| s.step).collect();
        assert_eq!(failed, vec![InitStep::ProbeIdentity, InitStep::DigitalLowPass]);
        assert_eq!(report.who_am_i, None);
    }

    #[test]
    fn unreadable_accelerometer_fails_init() {
        let mut bus = FakeBus::with_accel(0, 0, ONE_G);
        bus.failing_reads.insert(registers::ACCEL_XOUT_H);
        let mut mpu = Mpu6050::new(bus);
        assert!(mpu.init().is_err());
        assert!(!mpu.is_initialized());
    }

    #[test]
    fn negative_words_decode_as_twos_complement() {
        let mut mpu = Mpu6050::new(FakeBus::with_accel(0, -ONE_G, 0));
        assert!(mpu.init().is_ok());
        let o = mpu.read();
        assert!(o.is_ok());
        let o = o.unwrap_or_default();
        assert!((o.roll_deg + 90.0).abs() < 1e-6);
    }

    #[test]
    fn readings_are_low_pass_filtered() {
        let mut mpu = Mpu6050::new(FakeBus::with_accel(0, 0, ONE_G));
        assert!(mpu.init().is_ok());

        // Tilt to 90 degrees roll; the first filtered value moves 30% of the way.
        mpu.bus.set_accel(0, ONE_G, 0);
        let o = mpu.read().unwrap_or_default();
        assert!((o.roll_deg - 27.0).abs() < 1e-6);

        let o = mpu.read().unwrap_or_default();
        assert!((o.roll_deg - 45.9).abs() < 1e-6);
    }

    #[test]
    fn bus_errors_surface_from_read() {
        let mut mpu = Mpu6050::new(FakeBus::with_accel(0, 0, ONE_G));
        assert!(mpu.init().is_ok());
        mpu.bus.failing_reads.insert(registers::ACCEL_XOUT_H + 4);
        assert!(matches!(
            mpu.read(),
            Err(HardwareError::Bus { register, .. }) if register == registers::ACCEL_XOUT_H + 4
        ));
    }
}

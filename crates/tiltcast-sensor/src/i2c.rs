//! Linux I2C register bus.
//!
//! With the `hardware` feature on Linux this opens `/dev/i2c-<bus>`
//! through `rppal` and performs SMBus byte transfers. Without it,
//! [`LinuxI2cBus::open`] always fails with
//! [`HardwareError::Unavailable`], which the node treats like a missing
//! sensor and falls back to synthetic data.
//!
//! Dropping the bus closes the device file.

use crate::error::HardwareError;
use crate::mpu6050::{InitReport, Mpu6050, RegisterBus};

/// SMBus access to one device on a Linux I2C adapter.
pub struct LinuxI2cBus {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    i2c: rppal::i2c::I2c,
    bus: u8,
    address: u16,
}

impl LinuxI2cBus {
    /// Open adapter `bus` and select the device at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Unavailable`] if the adapter cannot be
    /// opened or the address cannot be selected.
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    pub fn open(bus: u8, address: u16) -> Result<Self, HardwareError> {
        let mut i2c = rppal::i2c::I2c::with_bus(bus)
            .map_err(|e| HardwareError::Unavailable(format!("/dev/i2c-{bus}: {e}")))?;
        i2c.set_slave_address(address).map_err(|e| {
            HardwareError::Unavailable(format!("/dev/i2c-{bus} address 0x{address:02X}: {e}"))
        })?;
        Ok(Self { i2c, bus, address })
    }

    /// Open adapter `bus` and select the device at `address`.
    ///
    /// # Errors
    ///
    /// Always returns [`HardwareError::Unavailable`]: this build has no
    /// I2C support.
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    pub fn open(bus: u8, address: u16) -> Result<Self, HardwareError> {
        Err(HardwareError::Unavailable(format!(
            "/dev/i2c-{bus} address 0x{address:02X}: built without the `hardware` feature"
        )))
    }

    /// Adapter number.
    pub const fn bus(&self) -> u8 {
        self.bus
    }

    /// 7-bit device address.
    pub const fn address(&self) -> u16 {
        self.address
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
impl RegisterBus for LinuxI2cBus {
    fn read_register(&mut self, register: u8) -> Result<u8, HardwareError> {
        self.i2c
            .smbus_read_byte(register)
            .map_err(|e| HardwareError::Bus {
                register,
                message: e.to_string(),
            })
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), HardwareError> {
        self.i2c
            .smbus_write_byte(register, value)
            .map_err(|e| HardwareError::Bus {
                register,
                message: e.to_string(),
            })
    }

    fn describe(&self) -> String {
        format!("i2c-{} @ 0x{:02X}", self.bus, self.address)
    }
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
impl RegisterBus for LinuxI2cBus {
    fn read_register(&mut self, register: u8) -> Result<u8, HardwareError> {
        Err(HardwareError::Bus {
            register,
            message: String::from("no I2C support in this build"),
        })
    }

    fn write_register(&mut self, register: u8, _value: u8) -> Result<(), HardwareError> {
        Err(HardwareError::Bus {
            register,
            message: String::from("no I2C support in this build"),
        })
    }

    fn describe(&self) -> String {
        format!("i2c-{} @ 0x{:02X}", self.bus, self.address)
    }
}

/// Open the bus, initialize an MPU-60x0 on it, and return the ready source.
///
/// Non-fatal step failures are logged by [`Mpu6050::init`]; the report is
/// returned alongside the source for callers that want to inspect it.
///
/// # Errors
///
/// Returns [`HardwareError`] if the bus cannot be opened or the device
/// cannot be read during initialization.
pub fn open_mpu6050(
    bus: u8,
    address: u16,
) -> Result<(Mpu6050<LinuxI2cBus>, InitReport), HardwareError> {
    let mut mpu = Mpu6050::new(LinuxI2cBus::open(bus, address)?);
    let report = mpu.init()?;
    Ok((mpu, report))
}

#[cfg(all(test, not(all(feature = "hardware", target_os = "linux"))))]
mod tests {
    use super::*;

    #[test]
    fn open_without_hardware_support_is_unavailable() {
        let result = LinuxI2cBus::open(1, 0x68);
        assert!(matches!(result, Err(HardwareError::Unavailable(_))));
        assert!(matches!(
            open_mpu6050(1, 0x68),
            Err(HardwareError::Unavailable(_))
        ));
    }
}

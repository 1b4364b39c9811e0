//! Hardware error type shared by every orientation source.
//!
//! The same enum covers initialization and mid-session reads; callers
//! decide what a failure means from where it happened (startup falls
//! back to synthetic mode, a read failure triggers permanent failover).

/// Errors reported by sensor buses and orientation sources.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HardwareError {
    /// The bus or device could not be opened at all.
    #[error("sensor unavailable: {0}")]
    Unavailable(String),

    /// A register transfer failed.
    #[error("bus error at register 0x{register:02X}: {message}")]
    Bus {
        /// Register being read or written.
        register: u8,
        /// Description from the bus driver.
        message: String,
    },

    /// The source was read before a successful initialization.
    #[error("sensor not initialized")]
    NotInitialized,

    /// The source produced a value that cannot be broadcast (NaN, infinite).
    #[error("invalid reading: {0}")]
    InvalidReading(String),
}

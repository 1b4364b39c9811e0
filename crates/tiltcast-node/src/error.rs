//! Error types for the Tiltcast node binary.

use tiltcast_stream::ServerError;

use crate::config::ConfigError;

/// Top-level error for the node binary.
///
/// Only startup failures end up here; sensor and per-connection errors
/// are handled where they occur.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The telemetry server failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: ServerError,
    },
}

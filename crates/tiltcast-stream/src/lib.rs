//! WebSocket telemetry server for Tiltcast.
//!
//! This crate provides an Axum server that:
//!
//! - upgrades connections on any path but `/api/status` to `WebSocket` and answers the small
//!   control protocol (`ping`, `hello`) on each one
//! - samples orientation at a fixed rate and pushes one `imu` frame per
//!   tick to every connected client
//! - serves `GET /api/status` with client count, sampler mode, and tick
//!   counters
//!
//! # Architecture
//!
//! Two kinds of task run concurrently: one per connection
//! ([`connection`]) and a single [`BroadcastLoop`]. They only share the
//! [`ClientRegistry`], which maps each client to a bounded outbound
//! queue drained by that client's own task. A slow or dead client fails
//! its own send and is torn down; nobody else waits for it.
//!
//! [`BroadcastLoop`]: broadcast::BroadcastLoop
//! [`ClientRegistry`]: registry::ClientRegistry

pub mod broadcast;
pub mod connection;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod state;

// Re-export primary types for convenience.
pub use broadcast::{BroadcastLoop, TickReport};
pub use connection::Keepalive;
pub use registry::{ClientHandle, ClientId, ClientRegistry};
pub use router::build_router;
pub use server::{ServerConfig, ServerError, TelemetryServer};
pub use state::{AppState, TelemetryStats};

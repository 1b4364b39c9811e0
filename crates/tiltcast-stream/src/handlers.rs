//! REST endpoint handlers.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/status` | Client count, sampler mode, tick counter |

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tiltcast_sensor::SamplerMode;

use crate::state::AppState;

/// Body of `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    /// Server identifier (same as in `hello_ack`).
    pub server: String,
    /// Connected `WebSocket` clients.
    pub clients: usize,
    /// Where orientation values currently come from.
    pub mode: SamplerMode,
    /// Broadcast ticks completed since startup.
    pub ticks: u64,
    /// Configured broadcast rate.
    pub hz: u32,
}

/// Report the live state of the broadcaster.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        server: state.server_id.clone(),
        clients: state.registry.len(),
        mode: state.stats.mode(),
        ticks: state.stats.ticks(),
        hz: state.hz,
    })
}

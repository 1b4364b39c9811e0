//! Axum router construction.
//!
//! The telemetry `WebSocket` is served on every path except
//! `/api/status`: dashboard clients connect to `ws://<host>:<port>`
//! with whatever path they were configured with, usually none.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::connection;
use crate::handlers;
use crate::state::AppState;

/// Build the complete router.
///
/// - `GET /api/status` -- JSON status
/// - `GET /` and any other path -- `WebSocket` telemetry stream
///
/// CORS allows any origin so browser dashboards served elsewhere can
/// poll the status endpoint.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(connection::ws_telemetry))
        .route("/api/status", get(handlers::status))
        .fallback(get(connection::ws_telemetry))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Per-connection `WebSocket` handler.
//!
//! Clients connect to `GET /` (or any path other than `/api/status`) and
//! from then on receive one `imu` frame per broadcast tick. The
//! connection task owns the socket and waits on four things at once:
//!
//! - frames queued by the broadcast loop, written to the socket in order
//! - inbound frames, answered in order (`ping` -> `pong`,
//!   `hello` -> `hello_ack`, everything else ignored)
//! - a teardown request from the broadcast loop after a failed send
//! - the keepalive timer: a protocol ping every [`PING_INTERVAL`], and a
//!   teardown if no pong arrives within [`PING_TIMEOUT`]
//!
//! The task registers itself on entry and holds the
//! [`Registration`](crate::registry::Registration) guard for its whole
//! lifetime, so it is unregistered however it ends.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::protocol::{decode_binary, decode_control, reply_to};
use crate::registry::{self, ClientId};
use crate::state::AppState;

/// Interval between server-initiated protocol pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long a ping may go unanswered before the connection is dropped.
pub const PING_TIMEOUT: Duration = Duration::from_secs(30);

/// Liveness probe settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    /// Time between pings.
    pub interval: Duration,
    /// Round-trip budget for each ping.
    pub timeout: Duration,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            interval: PING_INTERVAL,
            timeout: PING_TIMEOUT,
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent a close frame or the stream ended.
    PeerClosed {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason, if the peer sent one.
        reason: String,
    },
    /// Reading from the socket failed.
    Protocol(String),
    /// Writing to the socket failed.
    SendFailed(String),
    /// The broadcast loop asked for teardown after a failed send.
    TornDown,
    /// No pong within the keepalive timeout.
    KeepaliveTimeout,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed {
                code: Some(code),
                reason,
            } => write!(f, "peer closed ({code} {reason})"),
            Self::PeerClosed { code: None, .. } => f.write_str("peer closed"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::SendFailed(e) => write!(f, "send failed: {e}"),
            Self::TornDown => f.write_str("torn down after failed broadcast"),
            Self::KeepaliveTimeout => f.write_str("keepalive timeout"),
        }
    }
}

/// Upgrade an HTTP request to a telemetry `WebSocket`.
///
/// # Route
///
/// `GET /` and every unrouted path
pub async fn ws_telemetry(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        handle_connection(socket, state).await;
    })
}

/// Run one connection until it ends, returning the reason.
pub async fn handle_connection(mut socket: WebSocket, state: Arc<AppState>) -> DisconnectReason {
    let (handle, mut mailbox) = registry::channel(state.outbound_capacity);
    let client_id = handle.id();
    let registration = state.registry.register(handle);
    info!(client = %client_id, clients = state.registry.len(), "client connected");

    let teardown = mailbox.teardown_signal();
    let keepalive = state.keepalive;
    let mut ping_ticker = interval_at(Instant::now() + keepalive.interval, keepalive.interval);
    ping_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pong_deadline: Option<Instant> = None;

    let reason = loop {
        let outcome = tokio::select! {
            frame = mailbox.recv() => match frame {
                Some(text) => socket
                    .send(Message::Text(text))
                    .await
                    .err()
                    .map(|e| DisconnectReason::SendFailed(e.to_string())),
                // Only reachable once the registry has dropped our handle.
                None => Some(DisconnectReason::TornDown),
            },
            () = teardown.notified() => Some(DisconnectReason::TornDown),
            _ = ping_ticker.tick() => {
                if pong_deadline.is_some() {
                    None
                } else {
                    pong_deadline = Some(Instant::now() + keepalive.timeout);
                    socket
                        .send(Message::Ping(Bytes::new()))
                        .await
                        .err()
                        .map(|e| DisconnectReason::SendFailed(e.to_string()))
                }
            }
            () = keepalive_expired(pong_deadline) => Some(DisconnectReason::KeepaliveTimeout),
            inbound = socket.recv() => match inbound {
                None => Some(DisconnectReason::PeerClosed { code: None, reason: String::new() }),
                Some(Err(e)) => Some(DisconnectReason::Protocol(e.to_string())),
                Some(Ok(Message::Close(frame))) => Some(peer_closed(frame)),
                Some(Ok(Message::Pong(_))) => {
                    pong_deadline = None;
                    None
                }
                // Pongs for client pings are queued by the protocol layer.
                Some(Ok(Message::Ping(_))) => None,
                Some(Ok(Message::Text(text))) => {
                    answer(&mut socket, &state, client_id, text.as_str()).await
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let text = decode_binary(&bytes);
                    answer(&mut socket, &state, client_id, &text).await
                }
            },
        };

        if let Some(reason) = outcome {
            break reason;
        }
    };

    if matches!(
        reason,
        DisconnectReason::TornDown | DisconnectReason::KeepaliveTimeout
    ) {
        // Best effort; the peer may already be gone.
        let _ = socket.send(Message::Close(None)).await;
    }

    drop(registration);
    info!(
        client = %client_id,
        reason = %reason,
        clients = state.registry.len(),
        "client disconnected"
    );
    reason
}

/// Reply to a control message, if `text` is one.
async fn answer(
    socket: &mut WebSocket,
    state: &AppState,
    client_id: ClientId,
    text: &str,
) -> Option<DisconnectReason> {
    let Some(message) = decode_control(text) else {
        debug!(client = %client_id, "ignoring unrecognized frame");
        return None;
    };

    let reply = reply_to(message, &state.server_id, epoch_seconds());
    let json = match reply.to_json() {
        Ok(json) => json,
        Err(e) => {
            debug!(client = %client_id, error = %e, "failed to serialize reply");
            return None;
        }
    };

    socket
        .send(Message::Text(json.into()))
        .await
        .err()
        .map(|e| DisconnectReason::SendFailed(e.to_string()))
}

fn peer_closed(frame: Option<CloseFrame>) -> DisconnectReason {
    match frame {
        Some(frame) => DisconnectReason::PeerClosed {
            code: Some(frame.code),
            reason: frame.reason.as_str().to_owned(),
        },
        None => DisconnectReason::PeerClosed {
            code: None,
            reason: String::new(),
        },
    }
}

async fn keepalive_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Current wall-clock time as fractional Unix seconds.
#[allow(clippy::cast_precision_loss)]
fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

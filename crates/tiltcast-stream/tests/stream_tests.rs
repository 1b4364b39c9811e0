//! End-to-end tests for the telemetry server.
//!
//! Each test binds a real server on an ephemeral localhost port, runs it
//! on a background task, and talks to it with a `tokio-tungstenite`
//! client. The status endpoint is exercised through the router directly
//! via `tower::ServiceExt`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tiltcast_sensor::{FailoverSampler, SamplerMode};
use tiltcast_stream::{build_router, AppState, Keepalive, ServerConfig, TelemetryServer};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Running {
    addr: SocketAddr,
    state: Arc<AppState>,
    task: JoinHandle<()>,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn start(hz: u32, keepalive: Keepalive) -> Running {
    let config = ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
        hz,
        keepalive,
    };
    let sampler = FailoverSampler::synthetic(config.period().unwrap());
    let server = TelemetryServer::bind(&config, sampler).await.unwrap();
    let addr = server.local_addr();
    let state = server.state();
    let task = tokio::spawn(async move {
        let _ = server.run().await;
    });
    Running { addr, state, task }
}

async fn connect(addr: SocketAddr) -> Client {
    connect_path(addr, "/").await
}

async fn connect_path(addr: SocketAddr, path: &str) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
    client
}

async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Next text frame that is not an `imu` broadcast.
async fn next_reply(client: &mut Client) -> String {
    timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => {
                    let json: Value = serde_json::from_str(text.as_str()).unwrap();
                    if json["action"] != "imu" {
                        return text.as_str().to_owned();
                    }
                }
                Some(Ok(_)) => {}
                other => panic!("connection ended: {other:?}"),
            }
        }
    })
    .await
    .expect("no reply within 2s")
}

#[tokio::test]
async fn forced_synthetic_client_receives_twenty_hz_stream() {
    let server = start(20, Keepalive::default()).await;
    let mut client = connect(server.addr).await;

    let mut imu_frames = 0;
    let window = tokio::time::sleep(Duration::from_secs(1));
    tokio::pin!(window);
    loop {
        tokio::select! {
            () = &mut window => break,
            msg = client.next() => {
                let Some(Ok(Message::Text(text))) = msg else { continue };
                let json: Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(json["action"], "imu");
                assert_eq!(json["mock"], true);
                assert!(json["roll"].is_f64());
                assert!(json["pitch"].is_f64());
                assert!(json["ts"].is_i64());
                imu_frames += 1;
            }
        }
    }

    assert!(imu_frames >= 18, "only {imu_frames} imu frames in 1s");
}

#[tokio::test]
async fn stream_is_served_on_any_path() {
    let server = start(20, Keepalive::default()).await;

    for path in ["/imu", "/ws", "/telemetry/live"] {
        let mut client = connect_path(server.addr, path).await;
        let msg = timeout(Duration::from_secs(1), async {
            loop {
                if let Some(Ok(Message::Text(text))) = client.next().await {
                    return text.as_str().to_owned();
                }
            }
        })
        .await
        .unwrap();
        let json: Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(json["action"], "imu", "path {path}");
    }
}

#[tokio::test]
async fn ping_is_answered_with_exact_pong() {
    let server = start(20, Keepalive::default()).await;
    let mut client = connect(server.addr).await;

    client
        .send(Message::text(r#"{"action":"ping","t":42}"#))
        .await
        .unwrap();
    assert_eq!(next_reply(&mut client).await, r#"{"action":"pong","t":42}"#);
}

#[tokio::test]
async fn ping_without_token_gets_server_time() {
    let server = start(20, Keepalive::default()).await;
    let mut client = connect(server.addr).await;

    client
        .send(Message::text(r#"{"action":"ping"}"#))
        .await
        .unwrap();
    let reply: Value = serde_json::from_str(&next_reply(&mut client).await).unwrap();
    assert_eq!(reply["action"], "pong");
    assert!(reply["t"].as_f64().unwrap() > 1_600_000_000.0);
}

#[tokio::test]
async fn hello_is_acknowledged_with_server_id() {
    let server = start(20, Keepalive::default()).await;
    let mut client = connect(server.addr).await;

    client
        .send(Message::text(r#"{"action":"hello"}"#))
        .await
        .unwrap();
    let reply: Value = serde_json::from_str(&next_reply(&mut client).await).unwrap();
    assert_eq!(reply["action"], "hello_ack");
    assert_eq!(reply["server"], server.state.server_id.as_str());
}

#[tokio::test]
async fn unknown_and_malformed_frames_get_no_reply() {
    let server = start(20, Keepalive::default()).await;
    let mut client = connect(server.addr).await;

    for frame in [r#"{"action":"subscribe"}"#, "not json", r#"{"t":1}"#] {
        client.send(Message::text(frame)).await.unwrap();
    }
    client
        .send(Message::binary(r#"{"action":"ping","t":"bin"}"#.as_bytes().to_vec()))
        .await
        .unwrap();

    // The binary ping is the first thing answered; the junk produced nothing.
    assert_eq!(next_reply(&mut client).await, r#"{"action":"pong","t":"bin"}"#);
    assert_eq!(server.state.registry.len(), 1);
}

#[tokio::test]
async fn binary_frame_with_stray_bytes_is_still_answered() {
    let server = start(20, Keepalive::default()).await;
    let mut client = connect(server.addr).await;

    let mut frame = vec![0xFF];
    frame.extend_from_slice(br#"{"action":"hello"}"#);
    client.send(Message::binary(frame)).await.unwrap();

    let reply: Value = serde_json::from_str(&next_reply(&mut client).await).unwrap();
    assert_eq!(reply["action"], "hello_ack");
}

#[tokio::test]
async fn replies_follow_request_order() {
    let server = start(20, Keepalive::default()).await;
    let mut client = connect(server.addr).await;

    for t in 1..=5 {
        client
            .send(Message::text(format!(r#"{{"action":"ping","t":{t}}}"#)))
            .await
            .unwrap();
    }
    for t in 1..=5 {
        assert_eq!(
            next_reply(&mut client).await,
            format!(r#"{{"action":"pong","t":{t}}}"#)
        );
    }
}

#[tokio::test]
async fn abrupt_disconnect_is_removed_and_others_keep_receiving() {
    let server = start(20, Keepalive::default()).await;
    let mut survivor = connect(server.addr).await;
    let leaver = connect(server.addr).await;

    let state = Arc::clone(&server.state);
    assert!(wait_until(Duration::from_secs(1), || state.registry.len() == 2).await);

    // Drop the TCP connection without a close handshake.
    drop(leaver);

    // Gone within two broadcast periods (50 ms each at 20 Hz).
    let state = Arc::clone(&server.state);
    assert!(wait_until(Duration::from_millis(100), || state.registry.len() == 1).await);

    // The survivor still gets fresh ticks afterwards.
    let ticks_before = server.state.stats.ticks();
    let mut received = 0;
    while received < 3 {
        let msg = timeout(Duration::from_secs(1), survivor.next()).await.unwrap();
        if let Some(Ok(Message::Text(text))) = msg {
            let json: Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(json["action"], "imu");
            received += 1;
        }
    }
    assert!(server.state.stats.ticks() > ticks_before);
}

#[tokio::test]
async fn clean_close_unregisters_client() {
    let server = start(20, Keepalive::default()).await;
    let mut client = connect(server.addr).await;

    let state = Arc::clone(&server.state);
    assert!(wait_until(Duration::from_secs(1), || state.registry.len() == 1).await);

    client.close(None).await.unwrap();
    let state = Arc::clone(&server.state);
    assert!(wait_until(Duration::from_secs(1), || state.registry.is_empty()).await);
}

#[tokio::test]
async fn unresponsive_peer_is_dropped_by_keepalive() {
    let keepalive = Keepalive {
        interval: Duration::from_millis(100),
        timeout: Duration::from_millis(100),
    };
    let server = start(20, keepalive).await;

    // Never polled, so the client never answers pings.
    let _silent = connect(server.addr).await;

    let state = Arc::clone(&server.state);
    assert!(wait_until(Duration::from_secs(1), || state.registry.len() == 1).await);
    let state = Arc::clone(&server.state);
    assert!(wait_until(Duration::from_secs(2), || state.registry.is_empty()).await);
}

#[tokio::test]
async fn responsive_peer_survives_keepalive() {
    let keepalive = Keepalive {
        interval: Duration::from_millis(100),
        timeout: Duration::from_millis(100),
    };
    let server = start(20, keepalive).await;
    let mut client = connect(server.addr).await;

    // Reading lets tungstenite answer the server's pings.
    let end = Instant::now() + Duration::from_millis(600);
    while Instant::now() < end {
        let _ = timeout(Duration::from_millis(50), client.next()).await;
    }
    assert_eq!(server.state.registry.len(), 1);
}

#[tokio::test]
async fn status_endpoint_is_not_shadowed_by_the_stream() {
    let server = start(20, Keepalive::default()).await;
    let _client = connect_path(server.addr, "/imu").await;

    let state = Arc::clone(&server.state);
    assert!(wait_until(Duration::from_secs(1), || state.registry.len() == 1).await);

    let router = build_router(Arc::clone(&server.state));
    let response = router
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["clients"], 1);
}

#[tokio::test]
async fn status_endpoint_reports_state() {
    let state = Arc::new(AppState::new(20, SamplerMode::Synthetic));
    let router = build_router(Arc::clone(&state));

    let response = router
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["clients"], 0);
    assert_eq!(json["mode"], "synthetic");
    assert_eq!(json["ticks"], 0);
    assert_eq!(json["hz"], 20);
    assert_eq!(json["server"], state.server_id.as_str());
}

#[tokio::test]
async fn plain_http_on_stream_paths_is_rejected() {
    let state = Arc::new(AppState::new(20, SamplerMode::Synthetic));

    for path in ["/", "/imu"] {
        let response = build_router(Arc::clone(&state))
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error(), "path {path}");
        assert_ne!(response.status(), StatusCode::NOT_FOUND, "path {path}");
    }
}

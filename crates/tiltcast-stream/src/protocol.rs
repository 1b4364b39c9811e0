//! JSON wire protocol.
//!
//! Every frame is a JSON object with an `action` field.
//!
//! Server to client:
//!
//! ```text
//! {"action":"imu","roll":1.234,"pitch":-5.0,"mock":true,"ts":1718000000000}
//! {"action":"pong","t":42}
//! {"action":"hello_ack","server":"tiltcast-stream/0.1.0"}
//! ```
//!
//! Client to server: `{"action":"ping","t":<anything>}` and
//! `{"action":"hello"}`. Anything else is dropped without a reply.
//!
//! `roll` and `pitch` are **degrees**, rounded to three decimals.
//! Clients that render with radians convert on their side.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tiltcast_sensor::OrientationSample;

/// Identifier sent in `hello_ack` replies.
pub const SERVER_ID: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerMessage {
    /// One orientation sample.
    Imu {
        /// Roll, degrees, three decimals.
        roll: f64,
        /// Pitch, degrees, three decimals.
        pitch: f64,
        /// `true` when the sample is synthetic.
        mock: bool,
        /// Sample time, Unix epoch milliseconds.
        ts: i64,
    },
    /// Reply to a `ping`.
    Pong {
        /// The client's `t`, or the server time in epoch seconds if it sent none.
        t: Value,
    },
    /// Reply to a `hello`.
    HelloAck {
        /// Server identifier.
        server: String,
    },
}

impl ServerMessage {
    /// Build the broadcast frame for a sample.
    pub fn imu(sample: &OrientationSample) -> Self {
        Self::Imu {
            roll: round3(sample.roll_deg),
            pitch: round3(sample.pitch_deg),
            mock: sample.is_synthetic,
            ts: sample.timestamp_ms,
        }
    }

    /// Serialize to the JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Control messages accepted from clients.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Round-trip probe. `t` is echoed back verbatim.
    Ping {
        /// Opaque client token; `None` only when the field is absent.
        #[serde(default, deserialize_with = "present")]
        t: Option<Value>,
    },
    /// Greeting.
    Hello {},
}

/// Distinguish `"t": null` (echo null) from a missing `t`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Decode an inbound text frame. Returns `None` for anything that is
/// not a recognized control message.
///
/// Only JSON objects are considered; serde would otherwise accept the
/// sequence form `["ping"]` for a tagged enum.
pub fn decode_control(text: &str) -> Option<ControlMessage> {
    let value: Value = serde_json::from_str(text).ok()?;
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Text of a binary frame, with invalid UTF-8 sequences dropped.
///
/// Stray bytes around an otherwise valid control message do not cost
/// the client its reply.
pub fn decode_binary(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

/// The reply for a control message.
///
/// `now_secs` is used as the pong token when the ping carried none.
pub fn reply_to(message: ControlMessage, server_id: &str, now_secs: f64) -> ServerMessage {
    match message {
        ControlMessage::Ping { t } => ServerMessage::Pong {
            t: t.unwrap_or_else(|| Value::from(now_secs)),
        },
        ControlMessage::Hello {} => ServerMessage::HelloAck {
            server: server_id.to_owned(),
        },
    }
}

/// Round to three decimal places.
fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

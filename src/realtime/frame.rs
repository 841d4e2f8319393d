//! Engine.IO v4 / Socket.IO v5 packet framing
//!
//! Text frames on the websocket are Engine.IO packets; type `4` carries a
//! Socket.IO packet:
//!
//! - `0{json}`  open (sid, ping interval/timeout)
//! - `1`        close
//! - `2` / `3`  ping / pong (server pings, client answers)
//! - `40{json}` connect (client: auth payload, server: sid)
//! - `41`       disconnect
//! - `42[...]`  event: `["name", data]`
//! - `44{json}` connect error

use serde::Deserialize;
use serde_json::Value;

pub const PONG: &str = "3";
pub const DISCONNECT: &str = "41";

/// Engine.IO handshake parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

/// An event pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    pub name: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Connected,
    ConnectError(String),
    Disconnect,
    Event(ServerEvent),
    /// Anything this client does not act on (acks, binary, noop).
    Other(String),
}

/// Parse one text frame.
pub fn parse(frame: &str) -> Packet {
    let mut chars = frame.chars();
    let kind = chars.next();
    let rest = chars.as_str();
    match kind {
        Some('0') => match serde_json::from_str(rest) {
            Ok(info) => Packet::Open(info),
            Err(_) => Packet::Other(frame.to_string()),
        },
        Some('1') => Packet::Close,
        Some('2') => Packet::Ping,
        Some('3') => Packet::Pong,
        Some('4') => parse_socketio(rest).unwrap_or_else(|| Packet::Other(frame.to_string())),
        _ => Packet::Other(frame.to_string()),
    }
}

fn parse_socketio(packet: &str) -> Option<Packet> {
    let mut chars = packet.chars();
    let kind = chars.next()?;
    let rest = skip_namespace(chars.as_str());

    match kind {
        '0' => Some(Packet::Connected),
        '1' => Some(Packet::Disconnect),
        '2' => {
            // Optional ack id precedes the payload.
            let payload = rest.trim_start_matches(|c: char| c.is_ascii_digit());
            let mut items = match serde_json::from_str::<Value>(payload).ok()? {
                Value::Array(items) => items.into_iter(),
                _ => return None,
            };
            let name = items.next()?.as_str()?.to_string();
            let data = items.next().unwrap_or(Value::Null);
            Some(Packet::Event(ServerEvent { name, data }))
        }
        '4' => {
            let message = serde_json::from_str::<Value>(rest)
                .ok()
                .and_then(|v| match v {
                    Value::String(s) => Some(s),
                    other => other
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(String::from),
                })
                .unwrap_or_else(|| "connection refused".to_string());
            Some(Packet::ConnectError(message))
        }
        _ => None,
    }
}

/// Strip a `/namespace,` prefix if present.
fn skip_namespace(rest: &str) -> &str {
    if rest.starts_with('/') {
        match rest.find(',') {
            Some(pos) => &rest[pos + 1..],
            None => "",
        }
    } else {
        rest
    }
}

/// Socket.IO connect packet presenting `token` as handshake auth.
pub fn connect_packet(token: &str) -> String {
    format!("40{}", serde_json::json!({ "token": token }))
}

/// Socket.IO event packet.
pub fn event_packet(name: &str, data: &Value) -> String {
    format!("42{}", serde_json::json!([name, data]))
}

//! Engine.IO / Socket.IO v4 framing over a WebSocket
//!
//! Uptime Kuma speaks Socket.IO. Only the text subset the sentinel needs is
//! implemented: the Engine.IO open/ping/pong/message/close packets and the
//! Socket.IO connect, event, ack and error packets on the default namespace.
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":20000}   engine open
//! 2                                                         engine ping
//! 40                                                        socket connect
//! 4213["login",{"username":"admin","password":".."}]        event, ack id 13
//! 4313[{"ok":true}]                                         ack for id 13
//! ```

use crate::error::ConnectError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Engine.IO protocol revision spoken by Kuma's Socket.IO v4 server
pub const ENGINE_IO_VERSION: &str = "4";

/// Path Socket.IO is mounted on
pub const SOCKET_IO_PATH: &str = "socket.io/";

/// Build the WebSocket endpoint for a Kuma base URL
///
/// `http://kuma.local:3001` becomes
/// `ws://kuma.local:3001/socket.io/?EIO=4&transport=websocket`.
pub fn websocket_url(base: &Url) -> Result<Url, ConnectError> {
    let invalid = |reason: &str| ConnectError::InvalidEndpoint {
        url: base.to_string(),
        reason: reason.to_string(),
    };

    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid("scheme must be http, https, ws or wss")),
    };
    if base.host_str().is_none() {
        return Err(invalid("missing host"));
    }

    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|_| invalid("cannot switch to a WebSocket scheme"))?;
    let path = format!("{}/{}", base.path().trim_end_matches('/'), SOCKET_IO_PATH);
    url.set_path(&path);
    url.set_query(Some(&format!("EIO={}&transport=websocket", ENGINE_IO_VERSION)));
    url.set_fragment(None);
    Ok(url)
}

/// Parameters announced by the server in the Engine.IO open packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl OpenHandshake {
    /// Longest silence tolerated before the link is considered dead
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// Engine.IO packet (transport layer)
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, ConnectError> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ConnectError::Protocol("empty Engine.IO frame".to_string()))?;
        let rest = chars.as_str();

        Ok(match kind {
            '0' => EnginePacket::Open(serde_json::from_str(rest)?),
            '1' => EnginePacket::Close,
            '2' => EnginePacket::Ping(rest.to_string()),
            '3' => EnginePacket::Pong(rest.to_string()),
            '4' => EnginePacket::Message(rest.to_string()),
            '5' => EnginePacket::Upgrade,
            '6' => EnginePacket::Noop,
            other => {
                return Err(ConnectError::Protocol(format!(
                    "unknown Engine.IO packet type '{}'",
                    other
                )))
            }
        })
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => format!(
                "0{}",
                serde_json::to_string(handshake).unwrap_or_else(|_| "{}".to_string())
            ),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(body) => format!("4{}", body),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Socket.IO packet (carried inside an Engine.IO message)
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event {
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        id: u64,
        args: Vec<Value>,
    },
    ConnectError(Value),
}

impl SocketPacket {
    /// Build an event packet
    pub fn event(name: impl Into<String>, args: Vec<Value>, id: Option<u64>) -> Self {
        SocketPacket::Event {
            id,
            name: name.into(),
            args,
        }
    }

    /// Decode the body of an Engine.IO message
    pub fn decode(body: &str) -> Result<Self, ConnectError> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ConnectError::Protocol("empty Socket.IO packet".to_string()))?;
        let mut rest = chars.as_str();

        if rest.starts_with('/') {
            let (namespace, tail) = match rest.find(',') {
                Some(idx) => (&rest[..idx], &rest[idx + 1..]),
                None => (rest, ""),
            };
            if namespace != "/" {
                return Err(ConnectError::Protocol(format!(
                    "unsupported namespace {}",
                    namespace
                )));
            }
            rest = tail;
        }

        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        let id = if digits > 0 {
            Some(rest[..digits].parse::<u64>().map_err(|e| {
                ConnectError::Protocol(format!("bad ack id in {:?}: {}", body, e))
            })?)
        } else {
            None
        };
        let payload = &rest[digits..];

        match kind {
            '0' => Ok(SocketPacket::Connect(parse_optional(payload)?)),
            '1' => Ok(SocketPacket::Disconnect),
            '2' => {
                let mut args = parse_array(payload)?;
                if args.is_empty() {
                    return Err(ConnectError::Protocol("event without a name".to_string()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(ConnectError::Protocol(format!(
                            "event name is not a string: {}",
                            other
                        )))
                    }
                };
                Ok(SocketPacket::Event { id, name, args })
            }
            '3' => {
                let id = id.ok_or_else(|| ConnectError::Protocol("ack without an id".to_string()))?;
                Ok(SocketPacket::Ack {
                    id,
                    args: parse_array(payload)?,
                })
            }
            '4' => Ok(SocketPacket::ConnectError(
                parse_optional(payload)?.unwrap_or(Value::Null),
            )),
            '5' | '6' => Err(ConnectError::Protocol(
                "binary Socket.IO packets are not supported".to_string(),
            )),
            other => Err(ConnectError::Protocol(format!(
                "unknown Socket.IO packet type '{}'",
                other
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect(None) => "0".to_string(),
            SocketPacket::Connect(Some(data)) => format!("0{}", data),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event { id, name, args } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                format!("2{}{}", format_id(*id), Value::Array(items))
            }
            SocketPacket::Ack { id, args } => {
                format!("3{}{}", id, Value::Array(args.clone()))
            }
            SocketPacket::ConnectError(data) => format!("4{}", data),
        }
    }

    /// Encode as a complete Engine.IO text frame
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }

    /// Human-readable reason carried by a CONNECT_ERROR packet
    pub fn connect_error_message(data: &Value) -> String {
        match data {
            Value::String(msg) => msg.clone(),
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| data.to_string()),
            other => other.to_string(),
        }
    }
}

fn format_id(id: Option<u64>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

fn parse_optional(payload: &str) -> Result<Option<Value>, ConnectError> {
    if payload.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::from_str(payload)?))
    }
}

fn parse_array(payload: &str) -> Result<Vec<Value>, ConnectError> {
    match parse_optional(payload)? {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(ConnectError::Protocol(format!(
            "expected a JSON array payload, got {}",
            other
        ))),
    }
}

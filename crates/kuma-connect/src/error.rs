//! Error types for the kuma-connect crate

use crate::types::{CommandKind, MonitorId};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("WebSocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Login rejected: {0}")]
    Authentication(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Socket not connected")]
    NotConnected,

    #[error("Event stream already taken for this session")]
    AlreadySubscribed,
}

impl ConnectError {
    /// True when the server rejected the configured credentials
    pub fn is_authentication(&self) -> bool {
        matches!(self, ConnectError::Authentication(_))
    }
}

impl From<serde_json::Error> for ConnectError {
    fn from(err: serde_json::Error) -> Self {
        ConnectError::Protocol(format!("Malformed JSON payload: {}", err))
    }
}

/// A pause/resume call that the server rejected or that never reached it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to {kind} monitor {monitor_id}: {message}")]
pub struct CommandError {
    pub monitor_id: MonitorId,
    pub kind: CommandKind,
    pub message: String,
}

impl CommandError {
    pub fn new(kind: CommandKind, monitor_id: MonitorId, message: impl Into<String>) -> Self {
        Self {
            monitor_id,
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn not_connected(kind: CommandKind, monitor_id: MonitorId) -> Self {
        Self::new(kind, monitor_id, ConnectError::NotConnected.to_string())
    }
}

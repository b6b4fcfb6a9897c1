//! Wire types exchanged with Uptime Kuma
//!
//! These mirror the JSON shapes the server pushes over Socket.IO. Only the
//! fields the sentinel acts on are decoded; everything else is ignored.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Monitor identifier as assigned by the server
pub type MonitorId = u64;

/// Monitor type tag used by Kuma for group containers
pub const GROUP_MONITOR_TYPE: &str = "group";

/// A tag attached to a monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorTag {
    #[serde(default, deserialize_with = "deserialize_or_default")]
    pub tag_id: u64,
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "deserialize_or_default")]
    pub color: String,
}

/// Immutable snapshot of a single monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: MonitorId,

    pub name: String,

    /// Kind of check ("http", "ping", "group", ...)
    #[serde(rename = "type", default, deserialize_with = "deserialize_or_default")]
    pub monitor_type: String,

    /// Identifier of the enclosing group monitor, if any
    #[serde(default)]
    pub parent: Option<MonitorId>,

    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<MonitorTag>,
}

impl Monitor {
    /// Create a leaf monitor with no parent and no tags
    pub fn new(id: MonitorId, name: impl Into<String>, monitor_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            monitor_type: monitor_type.into(),
            parent: None,
            tags: Vec::new(),
        }
    }

    /// Create a group container monitor
    pub fn group(id: MonitorId, name: impl Into<String>) -> Self {
        Self::new(id, name, GROUP_MONITOR_TYPE)
    }

    /// Place this monitor inside a group
    pub fn with_parent(mut self, parent: MonitorId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Attach a tag by name
    pub fn with_tag(mut self, name: impl Into<String>) -> Self {
        self.tags.push(MonitorTag {
            tag_id: 0,
            name: name.into(),
            value: None,
            color: String::new(),
        });
        self
    }

    pub fn is_group(&self) -> bool {
        self.monitor_type == GROUP_MONITOR_TYPE
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }
}

/// Kuma sends booleans either as JSON bools or as 0/1; null counts as false
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

/// Explicit `null` decodes like a missing field
fn deserialize_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<MonitorTag>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<MonitorTag>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Full monitor inventory, keyed and ordered by monitor id
///
/// Replaced wholesale on every `monitorList` push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    monitors: BTreeMap<MonitorId, Monitor>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a `monitorList` payload (`{"<id>": Monitor, ...}`)
    ///
    /// Entries that fail to decode are skipped with a warning so one odd
    /// monitor cannot blank out the whole snapshot.
    pub fn from_payload(payload: &Value) -> Result<Self, String> {
        let entries = payload
            .as_object()
            .ok_or_else(|| format!("monitorList payload is not an object: {}", payload))?;

        let mut inventory = Inventory::new();
        for (key, raw) in entries {
            match serde_json::from_value::<Monitor>(raw.clone()) {
                Ok(monitor) => inventory.insert(monitor),
                Err(e) => warn!("Skipping undecodable monitor entry {}: {}", key, e),
            }
        }
        Ok(inventory)
    }

    pub fn insert(&mut self, monitor: Monitor) {
        self.monitors.insert(monitor.id, monitor);
    }

    pub fn get(&self, id: MonitorId) -> Option<&Monitor> {
        self.monitors.get(&id)
    }

    /// Monitors in ascending id order
    pub fn monitors(&self) -> impl Iterator<Item = &Monitor> {
        self.monitors.values()
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Re-encode as a `monitorList` payload
    pub fn to_payload(&self) -> Value {
        let map = self
            .monitors
            .iter()
            .map(|(id, m)| (id.to_string(), serde_json::to_value(m).unwrap_or(Value::Null)))
            .collect::<serde_json::Map<_, _>>();
        Value::Object(map)
    }
}

impl FromIterator<Monitor> for Inventory {
    fn from_iter<I: IntoIterator<Item = Monitor>>(iter: I) -> Self {
        let mut inventory = Inventory::new();
        for monitor in iter {
            inventory.insert(monitor);
        }
        inventory
    }
}

/// Health status carried by a heartbeat
///
/// Kuma reuses one numeric value for both maintenance and paused, so the two
/// cannot be told apart here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum MonitorStatus {
    Down,
    Up,
    Pending,
    MaintenanceOrPaused,
    Unknown(i64),
}

impl MonitorStatus {
    pub fn is_down(self) -> bool {
        matches!(self, MonitorStatus::Down)
    }
}

impl From<i64> for MonitorStatus {
    fn from(code: i64) -> Self {
        match code {
            0 => MonitorStatus::Down,
            1 => MonitorStatus::Up,
            2 => MonitorStatus::Pending,
            3 => MonitorStatus::MaintenanceOrPaused,
            other => MonitorStatus::Unknown(other),
        }
    }
}

impl From<MonitorStatus> for i64 {
    fn from(status: MonitorStatus) -> Self {
        match status {
            MonitorStatus::Down => 0,
            MonitorStatus::Up => 1,
            MonitorStatus::Pending => 2,
            MonitorStatus::MaintenanceOrPaused => 3,
            MonitorStatus::Unknown(code) => code,
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Down => write!(f, "DOWN"),
            MonitorStatus::Up => write!(f, "UP"),
            MonitorStatus::Pending => write!(f, "PENDING"),
            MonitorStatus::MaintenanceOrPaused => write!(f, "MAINTENANCE"),
            MonitorStatus::Unknown(code) => write!(f, "UNKNOWN({})", code),
        }
    }
}

/// A status event pushed by the server for one monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(rename = "monitorID")]
    pub monitor_id: MonitorId,

    pub status: MonitorStatus,

    #[serde(default, deserialize_with = "deserialize_or_default")]
    pub msg: String,

    /// Server-side timestamp, UTC ("2024-05-01 12:00:00.123")
    #[serde(default, deserialize_with = "deserialize_or_default")]
    pub time: String,

    /// Response time in milliseconds
    #[serde(default)]
    pub ping: Option<f64>,

    /// Whether the server flagged this beat as a status change
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub important: bool,
}

impl Heartbeat {
    pub fn new(monitor_id: MonitorId, status: MonitorStatus, msg: impl Into<String>) -> Self {
        Self {
            monitor_id,
            status,
            msg: msg.into(),
            time: Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            ping: None,
            important: false,
        }
    }

    /// Parse the heartbeat time, accepting Kuma's SQL format or RFC 3339
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.time) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&self.time, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Kind of control command sent to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Pause,
    Resume,
}

impl CommandKind {
    /// Socket.IO event name for this command
    pub fn event_name(self) -> &'static str {
        match self {
            CommandKind::Pause => "pauseMonitor",
            CommandKind::Resume => "resumeMonitor",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Pause => write!(f, "pause"),
            CommandKind::Resume => write!(f, "resume"),
        }
    }
}

/// Acknowledgement body returned for login and commands
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    #[serde(default)]
    pub ok: bool,

    #[serde(default)]
    pub msg: Option<String>,

    /// Set when the account has 2FA enabled and no token was sent
    #[serde(default)]
    pub token_required: bool,
}

impl AckResponse {
    /// Decode the first ack argument, tolerating a missing body
    pub fn from_args(args: &[Value]) -> Self {
        args.first()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Server message, or a fallback naming the failed action
    pub fn message_or(&self, fallback: &str) -> String {
        match self.msg.as_deref() {
            Some(msg) if !msg.is_empty() => msg.to_string(),
            _ => fallback.to_string(),
        }
    }
}

/// Something the server pushed, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A full inventory snapshot
    MonitorList(Inventory),
    /// A status event for one monitor
    Heartbeat(Heartbeat),
    /// The transport went away; no further events follow
    Disconnected { reason: String },
}

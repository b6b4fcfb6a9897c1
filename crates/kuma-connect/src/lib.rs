//! Kuma Connect: Socket.IO session client for Uptime Kuma
//!
//! This crate owns the long-lived connection between the sentinel and an
//! Uptime Kuma server: it performs the Engine.IO/Socket.IO handshake over a
//! WebSocket, logs in, delivers server pushes in arrival order and sends
//! pause/resume commands that resolve on the server's acknowledgement.
//!
//! # Architecture
//!
//! - **KumaSession**: connect → login → subscribe → issue commands → disconnect
//! - **protocol**: Engine.IO v4 and Socket.IO packet codec
//! - **types**: monitors, inventory snapshots, heartbeats, acks
//! - **testing**: `FakeKumaServer` for integration tests (`testing` feature)
//!
//! # Example
//!
//! ```rust,no_run
//! use kuma_connect::{Credentials, KumaSession, SessionEvent, SessionOptions};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = KumaSession::new(
//!     Url::parse("http://localhost:3001")?,
//!     Credentials::new("admin", "changeme"),
//!     SessionOptions::default(),
//! )?;
//! session.connect().await?;
//!
//! let mut events = session.subscribe()?;
//! while let Some(event) = events.next().await {
//!     match event {
//!         SessionEvent::MonitorList(inventory) => println!("{} monitors", inventory.len()),
//!         SessionEvent::Heartbeat(hb) => println!("{} -> {}", hb.monitor_id, hb.status),
//!         SessionEvent::Disconnected { reason } => println!("lost: {}", reason),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod protocol;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use error::{CommandError, ConnectError};
pub use session::{Credentials, EventStream, KumaSession, SessionOptions, DEFAULT_CONNECT_TIMEOUT};
pub use types::{
    AckResponse, CommandKind, Heartbeat, Inventory, Monitor, MonitorId, MonitorStatus, MonitorTag,
    SessionEvent, GROUP_MONITOR_TYPE,
};

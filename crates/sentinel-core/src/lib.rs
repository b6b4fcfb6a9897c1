//! Sentinel Core: Alert Suppression Engine
//!
//! Watches one "sentinel" monitor on an Uptime Kuma server (typically an
//! internet reachability check). When the sentinel goes DOWN, every monitor
//! in the target set is paused so a WAN outage does not fan out into dozens
//! of alerts; when it comes back, the same set is resumed.
//!
//! # Architecture: The Supervision Loop
//!
//! ```text
//! ┌─────────────┐
//! │  Connect    │──> Handshake + login (kuma-connect)
//! └──────┬──────┘
//!        │
//!        v
//! ┌─────────────┐
//! │  Resolve    │──> monitorList → sentinel id + target ids
//! └──────┬──────┘
//!        │
//!        v
//! ┌─────────────┐
//! │  Decide     │──> sentinel heartbeat → pause / resume / nothing
//! └──────┬──────┘
//!        │
//!        v
//! ┌─────────────┐
//! │  Act        │──> Sequential pause/resume sweep
//! └──────┬──────┘
//!        │
//!        └────> On disconnect: wait 5s, back to Connect
//! ```
//!
//! # Example
//!
//! ```no_run
//! use kuma_connect::{Credentials, KumaSession};
//! use sentinel_core::{ReconnectPolicy, Sentinel, SuppressionController, TargetSelector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = ReconnectPolicy::default();
//! let session = KumaSession::new(
//!     url::Url::parse("http://localhost:3001")?,
//!     Credentials::new("admin", "changeme"),
//!     policy.session_options(),
//! )?;
//! let controller = SuppressionController::new(
//!     "INTERNET-SENTINEL",
//!     TargetSelector::Group("Sentinel".to_string()),
//! );
//!
//! Sentinel::new(session, controller, policy)?.run().await;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod daemon;
pub mod metrics;
pub mod policy;
pub mod resolver;

pub use controller::{decide, Decision, MonitorCommander, SuppressionController, SuppressionState};
pub use daemon::{Sentinel, SessionEnd};
pub use metrics::{SweepRecorder, SweepReport};
pub use policy::{ReconnectPolicy, DEFAULT_RETRY_DELAY};
pub use resolver::{resolve, Resolution, ResolutionWarning, TargetSelector};

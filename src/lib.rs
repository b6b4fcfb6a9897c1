/*!
 * Kuma Sentinel - alert suppression for Uptime Kuma
 *
 * Watches a single "sentinel" monitor (usually an internet reachability
 * check) and, while it is DOWN, keeps a group of dependent monitors paused
 * so one WAN outage does not produce a flood of alerts.
 *
 * - Environment-driven configuration with validation and a masked summary
 * - Structured logging via tracing (compact stdout or JSON lines to file)
 * - Process exit codes for startup failures
 *
 * The protocol client lives in `kuma-connect`, the state machine and
 * reconnect supervisor in `sentinel-core`.
 */

pub mod app;
pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use app::build_sentinel;
pub use config::{ConfigError, LogLevel, SentinelConfig};
pub use error::{Result, SentinelError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Reconnect Policy
//!
//! Timing rules for the supervisor's connection lifecycle.

use kuma_connect::{SessionOptions, DEFAULT_CONNECT_TIMEOUT};
use std::time::Duration;

/// Delay between a failed or lost session and the next attempt
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Supervisor reconnect policy
///
/// The retry delay is fixed: no backoff, no jitter, no attempt limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait before reconnecting after any failure or disconnect
    ///
    /// **Default:** 5s
    pub retry_delay: Duration,

    /// Upper bound on connect + handshake + login
    ///
    /// **Default:** 15s
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy with a custom retry delay
    ///
    /// Other parameters will use defaults.
    pub fn with_retry_delay(retry_delay: Duration) -> Self {
        Self {
            retry_delay,
            ..Default::default()
        }
    }

    /// Session options derived from this policy
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            connect_timeout: self.connect_timeout,
        }
    }

    /// Validate the policy configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.retry_delay.is_zero() {
            return Err("retry_delay must be greater than 0".to_string());
        }

        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

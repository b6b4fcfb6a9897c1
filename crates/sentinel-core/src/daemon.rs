//! Sentinel Daemon: The Supervision Loop
//!
//! Keeps one session alive forever: connect, log in, subscribe, feed events
//! to the controller, and on any failure wait a fixed delay and start over.

use crate::controller::{SuppressionController, SuppressionState};
use crate::policy::ReconnectPolicy;
use kuma_connect::{ConnectError, KumaSession, SessionEvent};
use std::future::Future;
use tracing::{debug, error, info, warn};

/// Why a session ended after it was established
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server or network dropped the connection
    Lost(String),
    /// The event stream closed without a disconnect notice
    StreamClosed,
}

/// The Sentinel: supervised suppression daemon
///
/// Owns the session and the suppression controller. The controller, and
/// with it the suppressed flag, survives every reconnect.
pub struct Sentinel {
    session: KumaSession,
    controller: SuppressionController,
    policy: ReconnectPolicy,
    attempts: u64,
}

impl Sentinel {
    /// Create a new Sentinel instance
    ///
    /// # Arguments
    ///
    /// * `session` - Unconnected session for the Kuma server
    /// * `controller` - Suppression controller (sentinel name + target selector)
    /// * `policy` - Reconnect timing
    pub fn new(
        session: KumaSession,
        controller: SuppressionController,
        policy: ReconnectPolicy,
    ) -> Result<Self, String> {
        policy.validate()?;

        Ok(Self {
            session,
            controller,
            policy,
            attempts: 0,
        })
    }

    pub fn controller(&self) -> &SuppressionController {
        &self.controller
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Main event loop - runs forever
    ///
    /// ```no_run
    /// # use sentinel_core::{ReconnectPolicy, Sentinel, SuppressionController, TargetSelector};
    /// # use kuma_connect::{Credentials, KumaSession};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let policy = ReconnectPolicy::default();
    /// let session = KumaSession::new(
    ///     url::Url::parse("http://localhost:3001")?,
    ///     Credentials::new("admin", "changeme"),
    ///     policy.session_options(),
    /// )?;
    /// let controller =
    ///     SuppressionController::new("INTERNET-SENTINEL", TargetSelector::Group("Sentinel".into()));
    ///
    /// let sentinel = Sentinel::new(session, controller, policy)?;
    /// sentinel.run().await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(self) {
        self.run_until(std::future::pending()).await;
    }

    /// Run until `shutdown` resolves, then disconnect
    ///
    /// Returns the final suppression state. Monitors paused at shutdown are
    /// left paused.
    pub async fn run_until<F>(mut self, shutdown: F) -> SuppressionState
    where
        F: Future<Output = ()>,
    {
        info!(
            "🛡️  Sentinel Active | Server: {} | Sentinel: \"{}\" | Targets: {} | Retry: {:?}",
            self.session.endpoint(),
            self.controller.sentinel_name(),
            self.controller.selector(),
            self.policy.retry_delay
        );

        tokio::pin!(shutdown);

        loop {
            self.attempts += 1;
            debug!("Connection attempt {}", self.attempts);

            let outcome = tokio::select! {
                _ = &mut shutdown => break,
                outcome = self.run_session() => outcome,
            };

            let delay = self.policy.retry_delay;
            match outcome {
                Ok(SessionEnd::Lost(reason)) => {
                    warn!("🔌 Disconnected: {}; retrying in {:?}", reason, delay)
                }
                Ok(SessionEnd::StreamClosed) => {
                    warn!("🔌 Event stream closed; retrying in {:?}", delay)
                }
                Err(e) if e.is_authentication() => {
                    error!("🔒 {} (check KUMA_USER/KUMA_PASS); retrying in {:?}", e, delay)
                }
                Err(e) => error!("❌ Bootstrap error: {}; retrying in {:?}", e, delay),
            }

            self.session.disconnect().await;

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Shutting down (suppressed={})", self.controller.is_suppressed());
        self.session.disconnect().await;
        self.controller.state().clone()
    }

    /// One connection lifetime
    ///
    /// `Err` means the session never came up; `Ok` means it came up and
    /// later ended.
    async fn run_session(&mut self) -> Result<SessionEnd, ConnectError> {
        self.session.connect().await?;
        self.controller.begin_session();
        let mut events = self.session.subscribe()?;
        info!("Initialization complete, monitoring...");

        while let Some(event) = events.next().await {
            match event {
                SessionEvent::MonitorList(inventory) => {
                    debug!("Monitor list received ({} monitors)", inventory.len());
                    self.controller.apply_inventory(&inventory);
                }
                SessionEvent::Heartbeat(heartbeat) => {
                    self.controller
                        .handle_heartbeat(&heartbeat, &self.session)
                        .await;
                }
                SessionEvent::Disconnected { reason } => return Ok(SessionEnd::Lost(reason)),
            }
        }

        Ok(SessionEnd::StreamClosed)
    }
}

/*!
 * Wiring from validated configuration to a ready-to-run Sentinel
 */

use kuma_connect::KumaSession;
use sentinel_core::{ReconnectPolicy, Sentinel, SuppressionController};

use crate::config::SentinelConfig;
use crate::error::{Result, SentinelError};

/// Build the supervisor for `config`; nothing connects until it runs
pub fn build_sentinel(config: &SentinelConfig, policy: ReconnectPolicy) -> Result<Sentinel> {
    let session = KumaSession::new(
        config.kuma_url.clone(),
        config.credentials(),
        policy.session_options(),
    )
    .map_err(|e| SentinelError::Startup(e.to_string()))?;

    let controller =
        SuppressionController::new(config.sentinel_name.clone(), config.selector.clone());

    Sentinel::new(session, controller, policy).map_err(SentinelError::Startup)
}

//! Suppression Controller
//!
//! Owns the suppression state machine and turns sentinel heartbeats into
//! pause/resume sweeps over the resolved target set.
//!
//! ```text
//!                 sentinel DOWN
//!   NOT_SUPPRESSED ───────────────> SUPPRESSED
//!         ^                             │
//!         └─────────────────────────────┘
//!               sentinel not DOWN
//! ```
//!
//! Any other combination is a no-op, so repeated heartbeats with the same
//! status never reissue commands. The state outlives the connection: it is
//! held here, not in the session.

use crate::metrics::{SweepRecorder, SweepReport};
use crate::resolver::{resolve, Resolution, TargetSelector};
use async_trait::async_trait;
use kuma_connect::{CommandError, CommandKind, Heartbeat, Inventory, KumaSession, MonitorId, MonitorStatus};
use tracing::{debug, error, info, trace, warn};

/// Issues pause/resume commands against the monitoring server
#[async_trait]
pub trait MonitorCommander: Send + Sync {
    async fn issue_command(
        &self,
        kind: CommandKind,
        monitor_id: MonitorId,
    ) -> Result<(), CommandError>;
}

#[async_trait]
impl MonitorCommander for KumaSession {
    async fn issue_command(
        &self,
        kind: CommandKind,
        monitor_id: MonitorId,
    ) -> Result<(), CommandError> {
        KumaSession::issue_command(self, kind, monitor_id).await
    }
}

/// What a heartbeat asks the controller to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pause,
    Resume,
    NoAction,
}

impl Decision {
    fn command(self) -> Option<CommandKind> {
        match self {
            Decision::Pause => Some(CommandKind::Pause),
            Decision::Resume => Some(CommandKind::Resume),
            Decision::NoAction => None,
        }
    }
}

/// Transition function of the suppression state machine
pub fn decide(suppressed: bool, status: MonitorStatus) -> Decision {
    match (suppressed, status.is_down()) {
        (false, true) => Decision::Pause,
        (true, false) => Decision::Resume,
        _ => Decision::NoAction,
    }
}

/// Process-lifetime suppression state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuppressionState {
    /// True while the target set is (believed to be) paused by us
    pub suppressed: bool,

    /// Sentinel from the latest inventory, if one was found
    pub sentinel_id: Option<MonitorId>,

    /// Targets from the latest inventory, ascending id order
    pub target_ids: Vec<MonitorId>,
}

/// Drives pause/resume sweeps from sentinel heartbeats
#[derive(Debug)]
pub struct SuppressionController {
    sentinel_name: String,
    selector: TargetSelector,
    state: SuppressionState,
}

impl SuppressionController {
    pub fn new(sentinel_name: impl Into<String>, selector: TargetSelector) -> Self {
        Self {
            sentinel_name: sentinel_name.into(),
            selector,
            state: SuppressionState::default(),
        }
    }

    pub fn sentinel_name(&self) -> &str {
        &self.sentinel_name
    }

    pub fn selector(&self) -> &TargetSelector {
        &self.selector
    }

    pub fn state(&self) -> &SuppressionState {
        &self.state
    }

    pub fn is_suppressed(&self) -> bool {
        self.state.suppressed
    }

    /// Forget the previous connection's sentinel and targets
    ///
    /// Heartbeats are ignored until the new connection's first inventory
    /// arrives. The suppressed flag carries over.
    pub fn begin_session(&mut self) {
        self.state.sentinel_id = None;
        self.state.target_ids.clear();
    }

    /// Re-resolve the sentinel and targets from a fresh inventory
    ///
    /// Leaves the suppressed flag untouched.
    pub fn apply_inventory(&mut self, inventory: &Inventory) -> Resolution {
        let resolution = resolve(inventory, &self.sentinel_name, &self.selector);

        for warning in &resolution.warnings {
            warn!("⚠️  {}", warning);
        }

        match resolution.sentinel_id {
            Some(id) => info!(
                "👁️  Watching \"{}\" (id={}); controlling {} monitors via {}",
                self.sentinel_name,
                id,
                resolution.target_ids.len(),
                self.selector
            ),
            None => warn!(
                "Sentinel \"{}\" not in inventory ({} monitors); heartbeats will be ignored",
                self.sentinel_name,
                inventory.len()
            ),
        }
        debug!("Target ids: {:?}", resolution.target_ids);

        self.state.sentinel_id = resolution.sentinel_id;
        self.state.target_ids = resolution.target_ids.clone();
        resolution
    }

    /// React to one heartbeat
    ///
    /// Returns the sweep report when the heartbeat caused a transition.
    pub async fn handle_heartbeat<C>(
        &mut self,
        heartbeat: &Heartbeat,
        commander: &C,
    ) -> Option<SweepReport>
    where
        C: MonitorCommander + ?Sized,
    {
        if self.state.sentinel_id != Some(heartbeat.monitor_id) {
            trace!("Ignoring heartbeat for monitor {}", heartbeat.monitor_id);
            return None;
        }

        info!(
            "Sentinel heartbeat: status={} msg={:?}",
            heartbeat.status, heartbeat.msg
        );

        let decision = decide(self.state.suppressed, heartbeat.status);
        let Some(kind) = decision.command() else {
            debug!(
                "No transition (suppressed={}, status={})",
                self.state.suppressed, heartbeat.status
            );
            return None;
        };

        // Flip before sweeping; failed targets are not retried on later beats
        self.state.suppressed = kind == CommandKind::Pause;
        let targets = self.state.target_ids.clone();

        match kind {
            CommandKind::Pause => warn!(
                "🔴 Sentinel DOWN: pausing {} monitors",
                targets.len()
            ),
            CommandKind::Resume => info!(
                "🟢 Sentinel recovered ({}): resuming {} monitors",
                heartbeat.status,
                targets.len()
            ),
        }

        Some(sweep(kind, &targets, commander).await)
    }
}

/// Issue `kind` to every target in order, continuing past failures
async fn sweep<C>(kind: CommandKind, targets: &[MonitorId], commander: &C) -> SweepReport
where
    C: MonitorCommander + ?Sized,
{
    let mut recorder = SweepRecorder::new(kind);

    for &monitor_id in targets {
        match commander.issue_command(kind, monitor_id).await {
            Ok(()) => {
                info!("✅ {} monitor {}", past_tense(kind), monitor_id);
                recorder.record_success();
            }
            Err(e) => {
                error!("❌ {}", e);
                recorder.record_failure(e);
            }
        }
    }

    let report = recorder.finish();
    if report.is_complete() {
        info!("📊 {}", report.summary());
    } else {
        warn!("📊 {}", report.summary());
    }
    report
}

fn past_tense(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::Pause => "Paused",
        CommandKind::Resume => "Resumed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuma_connect::Monitor;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records commands and fails for configured ids
    #[derive(Default)]
    struct MockCommander {
        calls: Mutex<Vec<(CommandKind, MonitorId)>>,
        failing: HashSet<MonitorId>,
    }

    impl MockCommander {
        fn failing_for(ids: &[MonitorId]) -> Self {
            Self {
                failing: ids.iter().copied().collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(CommandKind, MonitorId)> {
            self.calls.lock().unwrap().clone()
        }

        fn take(&self) -> Vec<(CommandKind, MonitorId)> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    #[async_trait]
    impl MonitorCommander for MockCommander {
        async fn issue_command(
            &self,
            kind: CommandKind,
            monitor_id: MonitorId,
        ) -> Result<(), CommandError> {
            self.calls.lock().unwrap().push((kind, monitor_id));
            if self.failing.contains(&monitor_id) {
                Err(CommandError::new(kind, monitor_id, "Monitor not found"))
            } else {
                Ok(())
            }
        }
    }

    fn inventory() -> Inventory {
        vec![
            Monitor::new(1, "INTERNET-SENTINEL", "ping"),
            Monitor::group(7, "Sentinel"),
            Monitor::new(10, "NAS", "http").with_parent(7),
            Monitor::new(11, "Router UI", "http").with_parent(7),
            Monitor::new(12, "Cloud Backup", "keyword").with_parent(7),
        ]
        .into_iter()
        .collect()
    }

    fn controller() -> SuppressionController {
        let mut controller =
            SuppressionController::new("INTERNET-SENTINEL", TargetSelector::Group("Sentinel".into()));
        controller.apply_inventory(&inventory());
        controller
    }

    fn beat(id: MonitorId, status: MonitorStatus) -> Heartbeat {
        Heartbeat::new(id, status, "")
    }

    fn pauses(ids: &[MonitorId]) -> Vec<(CommandKind, MonitorId)> {
        ids.iter().map(|&id| (CommandKind::Pause, id)).collect()
    }

    fn resumes(ids: &[MonitorId]) -> Vec<(CommandKind, MonitorId)> {
        ids.iter().map(|&id| (CommandKind::Resume, id)).collect()
    }

    #[test]
    fn test_decide_table() {
        assert_eq!(decide(false, MonitorStatus::Down), Decision::Pause);
        assert_eq!(decide(true, MonitorStatus::Up), Decision::Resume);
        assert_eq!(decide(true, MonitorStatus::Pending), Decision::Resume);
        assert_eq!(decide(true, MonitorStatus::MaintenanceOrPaused), Decision::Resume);
        assert_eq!(decide(true, MonitorStatus::Unknown(9)), Decision::Resume);
        assert_eq!(decide(true, MonitorStatus::Down), Decision::NoAction);
        assert_eq!(decide(false, MonitorStatus::Up), Decision::NoAction);
        assert_eq!(decide(false, MonitorStatus::Pending), Decision::NoAction);
    }

    #[test]
    fn test_apply_inventory_resolves() {
        let controller = controller();

        assert_eq!(controller.state().sentinel_id, Some(1));
        assert_eq!(controller.state().target_ids, vec![10, 11, 12]);
        assert!(!controller.is_suppressed());
    }

    #[tokio::test]
    async fn test_down_pauses_targets() {
        let mut controller = controller();
        let commander = MockCommander::default();

        let report = controller
            .handle_heartbeat(&beat(1, MonitorStatus::Down), &commander)
            .await
            .expect("transition");

        assert!(controller.is_suppressed());
        assert_eq!(commander.calls(), pauses(&[10, 11, 12]));
        assert_eq!(report.kind, CommandKind::Pause);
        assert_eq!(report.succeeded, 3);
    }

    #[tokio::test]
    async fn test_repeated_down_is_idempotent() {
        let mut controller = controller();
        let commander = MockCommander::default();

        controller
            .handle_heartbeat(&beat(1, MonitorStatus::Down), &commander)
            .await;
        let second = controller
            .handle_heartbeat(&beat(1, MonitorStatus::Down), &commander)
            .await;

        assert!(second.is_none());
        assert_eq!(commander.calls(), pauses(&[10, 11, 12]));
        assert!(controller.is_suppressed());
    }

    #[tokio::test]
    async fn test_up_resumes_after_down() {
        let mut controller = controller();
        let commander = MockCommander::default();

        controller
            .handle_heartbeat(&beat(1, MonitorStatus::Down), &commander)
            .await;
        commander.take();

        controller
            .handle_heartbeat(&beat(1, MonitorStatus::Up), &commander)
            .await;

        assert!(!controller.is_suppressed());
        assert_eq!(commander.calls(), resumes(&[10, 11, 12]));
    }

    #[tokio::test]
    async fn test_pending_counts_as_recovered() {
        let mut controller = controller();
        let commander = MockCommander::default();

        controller
            .handle_heartbeat(&beat(1, MonitorStatus::Down), &commander)
            .await;
        commander.take();
        controller
            .handle_heartbeat(&beat(1, MonitorStatus::Pending), &commander)
            .await;

        assert!(!controller.is_suppressed());
        assert_eq!(commander.calls(), resumes(&[10, 11, 12]));
    }

    #[tokio::test]
    async fn test_up_while_not_suppressed_does_nothing() {
        let mut controller = controller();
        let commander = MockCommander::default();

        let report = controller
            .handle_heartbeat(&beat(1, MonitorStatus::Up), &commander)
            .await;

        assert!(report.is_none());
        assert!(commander.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_sweep() {
        let mut controller = controller();
        let commander = MockCommander::failing_for(&[11]);

        let report = controller
            .handle_heartbeat(&beat(1, MonitorStatus::Down), &commander)
            .await
            .expect("transition");

        assert!(controller.is_suppressed());
        assert_eq!(commander.calls(), pauses(&[10, 11, 12]));
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed_ids(), vec![11]);

        // State already flipped, so the next DOWN does not retry
        controller
            .handle_heartbeat(&beat(1, MonitorStatus::Down), &commander)
            .await;
        assert_eq!(commander.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_non_sentinel_heartbeats_ignored() {
        let mut controller = controller();
        let commander = MockCommander::default();

        for status in [MonitorStatus::Down, MonitorStatus::Up] {
            let report = controller.handle_heartbeat(&beat(10, status), &commander).await;
            assert!(report.is_none());
        }

        assert!(commander.calls().is_empty());
        assert!(!controller.is_suppressed());
    }

    #[tokio::test]
    async fn test_missing_sentinel_never_commands() {
        let mut controller =
            SuppressionController::new("WAN-CHECK", TargetSelector::Group("Sentinel".into()));
        controller.apply_inventory(&inventory());
        let commander = MockCommander::default();

        for id in [1, 7, 10] {
            controller
                .handle_heartbeat(&beat(id, MonitorStatus::Down), &commander)
                .await;
        }

        assert!(commander.calls().is_empty());
        assert!(!controller.is_suppressed());
    }

    #[tokio::test]
    async fn test_state_survives_new_inventory() {
        let mut controller = controller();
        let commander = MockCommander::default();

        controller
            .handle_heartbeat(&beat(1, MonitorStatus::Down), &commander)
            .await;
        commander.take();

        // Reconnect delivers a fresh snapshot with one more child
        let mut refreshed = inventory();
        refreshed.insert(Monitor::new(13, "VPN", "port").with_parent(7));
        controller.apply_inventory(&refreshed);
        assert!(controller.is_suppressed());

        // Still DOWN after reconnect: nothing reissued
        controller
            .handle_heartbeat(&beat(1, MonitorStatus::Down), &commander)
            .await;
        assert!(commander.calls().is_empty());

        // Recovery resumes the current target set
        controller
            .handle_heartbeat(&beat(1, MonitorStatus::Up), &commander)
            .await;
        assert_eq!(commander.calls(), resumes(&[10, 11, 12, 13]));
    }

    #[tokio::test]
    async fn test_heartbeat_before_new_inventory_is_ignored() {
        let mut controller = controller();
        let commander = MockCommander::default();

        controller
            .handle_heartbeat(&beat(1, MonitorStatus::Down), &commander)
            .await;
        commander.take();

        // New connection, no monitor list yet
        controller.begin_session();
        assert!(controller.is_suppressed());
        assert_eq!(controller.state().sentinel_id, None);
        assert!(controller.state().target_ids.is_empty());

        let report = controller
            .handle_heartbeat(&beat(1, MonitorStatus::Up), &commander)
            .await;
        assert!(report.is_none());
        assert!(commander.calls().is_empty());
        assert!(controller.is_suppressed());

        // The new inventory re-derives targets; sentinel 1 is now a different monitor
        let renumbered: Inventory = vec![
            Monitor::new(2, "INTERNET-SENTINEL", "ping"),
            Monitor::group(7, "Sentinel"),
            Monitor::new(10, "NAS", "http").with_parent(7),
        ]
        .into_iter()
        .collect();
        controller.apply_inventory(&renumbered);

        controller
            .handle_heartbeat(&beat(1, MonitorStatus::Up), &commander)
            .await;
        assert!(commander.calls().is_empty());

        controller
            .handle_heartbeat(&beat(2, MonitorStatus::Up), &commander)
            .await;
        assert_eq!(commander.calls(), resumes(&[10]));
    }

    #[tokio::test]
    async fn test_down_with_empty_target_set() {
        let mut controller =
            SuppressionController::new("INTERNET-SENTINEL", TargetSelector::Group("Offsite".into()));
        controller.apply_inventory(&inventory());
        let commander = MockCommander::default();

        let report = controller
            .handle_heartbeat(&beat(1, MonitorStatus::Down), &commander)
            .await
            .expect("transition");

        assert!(controller.is_suppressed());
        assert_eq!(report.attempted, 0);
        assert!(commander.calls().is_empty());
    }
}

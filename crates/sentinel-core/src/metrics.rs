//! Sweep Metrics
//!
//! Tracks the outcome of a single pause or resume sweep across the target set.

use kuma_connect::{CommandError, CommandKind, MonitorId};
use std::time::{Duration, Instant};

/// Outcome of one sweep over the target set
#[derive(Debug, Clone)]
pub struct SweepReport {
    /// Whether this sweep paused or resumed
    pub kind: CommandKind,

    /// Number of commands sent
    pub attempted: usize,

    /// Number of commands the server acknowledged with success
    pub succeeded: usize,

    /// Per-target failures, in the order they were issued
    pub failed: Vec<CommandError>,

    /// Time taken to complete the sweep
    pub duration: Duration,
}

impl SweepReport {
    /// True when every target acknowledged the command
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            1.0
        } else {
            self.succeeded as f64 / self.attempted as f64
        }
    }

    /// Ids of the monitors whose command failed
    pub fn failed_ids(&self) -> Vec<MonitorId> {
        self.failed.iter().map(|e| e.monitor_id).collect()
    }

    /// Format a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Sweep ({}): {}/{} succeeded ({:.1}%) | {} failed | {:?}",
            self.kind,
            self.succeeded,
            self.attempted,
            self.success_rate() * 100.0,
            self.failed.len(),
            self.duration
        )
    }
}

/// Accumulates results while a sweep runs
#[derive(Debug)]
pub struct SweepRecorder {
    kind: CommandKind,
    attempted: usize,
    succeeded: usize,
    failed: Vec<CommandError>,
    start_time: Instant,
}

impl SweepRecorder {
    /// Start tracking a new sweep
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            attempted: 0,
            succeeded: 0,
            failed: Vec::new(),
            start_time: Instant::now(),
        }
    }

    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, error: CommandError) {
        self.attempted += 1;
        self.failed.push(error);
    }

    /// Finalize and return the report
    pub fn finish(self) -> SweepReport {
        SweepReport {
            kind: self.kind,
            attempted: self.attempted,
            succeeded: self.succeeded,
            failed: self.failed,
            duration: self.start_time.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder() {
        let mut recorder = SweepRecorder::new(CommandKind::Pause);
        recorder.record_success();
        recorder.record_failure(CommandError::new(CommandKind::Pause, 11, "Monitor not found"));
        recorder.record_success();

        let report = recorder.finish();

        assert_eq!(report.kind, CommandKind::Pause);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed_ids(), vec![11]);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_empty_sweep() {
        let report = SweepRecorder::new(CommandKind::Resume).finish();

        assert_eq!(report.attempted, 0);
        assert_eq!(report.success_rate(), 1.0);
        assert!(report.is_complete());
    }

    #[test]
    fn test_summary() {
        let mut recorder = SweepRecorder::new(CommandKind::Resume);
        for _ in 0..3 {
            recorder.record_success();
        }
        recorder.record_failure(CommandError::new(CommandKind::Resume, 12, "timeout"));

        let summary = recorder.finish().summary();
        assert!(summary.contains("Sweep (resume)"));
        assert!(summary.contains("3/4"));
        assert!(summary.contains("75.0%"));
        assert!(summary.contains("1 failed"));
    }
}

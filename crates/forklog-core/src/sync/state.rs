//! Observable sync status consumed by list views.

use std::sync::Arc;

use tokio::sync::watch;

use super::{SyncReason, SyncReport};
use crate::util::unix_millis_now;

/// Coarse sync state for status indicators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    Error,
}

/// Outcome of the latest completed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub is_syncing: bool,
    /// Reason of the run in flight, if any
    pub running: Option<SyncReason>,
    pub last_error: Option<String>,
    /// Unix ms of the latest completed run; never decreases
    pub last_completed_at: Option<i64>,
    pub last_reason: Option<SyncReason>,
    pub last_status: Option<RunStatus>,
    /// Number of completed runs since the tracker was created
    pub completed_runs: u64,
}

impl SyncStatus {
    pub const fn state(&self) -> SyncState {
        if self.is_syncing {
            SyncState::Syncing
        } else if self.last_error.is_some() {
            SyncState::Error
        } else {
            SyncState::Idle
        }
    }
}

/// Publishes [`SyncStatus`] updates. Written only by the reconciler.
#[derive(Clone, Debug)]
pub struct SyncStatusTracker {
    sender: Arc<watch::Sender<SyncStatus>>,
}

impl Default for SyncStatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStatusTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(SyncStatus::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> SyncStatus {
        self.sender.borrow().clone()
    }

    pub(crate) fn begin(&self, reason: SyncReason) {
        self.sender.send_modify(|status| {
            status.is_syncing = true;
            status.running = Some(reason);
        });
    }

    pub(crate) fn finish(&self, report: &SyncReport) {
        let now = unix_millis_now();
        self.sender.send_modify(|status| {
            status.is_syncing = false;
            status.running = None;
            status.last_error = report.error_message();
            status.last_completed_at =
                Some(status.last_completed_at.map_or(now, |last| last.max(now)));
            status.last_reason = Some(report.reason);
            status.last_status = Some(report.status());
            status.completed_runs += 1;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(reason: SyncReason, errors: &[&str]) -> SyncReport {
        let mut report = SyncReport::new(reason, None);
        report.errors = errors.iter().map(ToString::to_string).collect();
        report
    }

    #[test]
    fn begin_and_finish_update_state() {
        let tracker = SyncStatusTracker::new();
        assert_eq!(tracker.snapshot().state(), SyncState::Idle);

        tracker.begin(SyncReason::ManualRefresh);
        assert_eq!(tracker.snapshot().state(), SyncState::Syncing);
        assert_eq!(tracker.snapshot().running, Some(SyncReason::ManualRefresh));

        tracker.finish(&report(SyncReason::ManualRefresh, &["Remote ledger unreachable: offline"]));
        let status = tracker.snapshot();
        assert_eq!(status.state(), SyncState::Error);
        assert_eq!(status.last_status, Some(RunStatus::Failed));
        assert_eq!(status.completed_runs, 1);
        assert!(status.last_completed_at.is_some());
    }

    #[test]
    fn successful_run_clears_last_error() {
        let tracker = SyncStatusTracker::new();
        tracker.finish(&report(SyncReason::SignOut, &["boom"]));
        tracker.finish(&report(SyncReason::SignOut, &[]));

        let status = tracker.snapshot();
        assert_eq!(status.last_error, None);
        assert_eq!(status.last_status, Some(RunStatus::Succeeded));
    }

    #[test]
    fn last_completed_at_is_monotonic() {
        let tracker = SyncStatusTracker::new();
        tracker.sender.send_modify(|status| status.last_completed_at = Some(i64::MAX));

        tracker.finish(&report(SyncReason::ManualRefresh, &[]));
        assert_eq!(tracker.snapshot().last_completed_at, Some(i64::MAX));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribers_are_notified_on_finish() {
        let tracker = SyncStatusTracker::new();
        let mut receiver = tracker.subscribe();

        tracker.finish(&report(SyncReason::FirstSignIn, &[]));
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().completed_runs, 1);
    }
}

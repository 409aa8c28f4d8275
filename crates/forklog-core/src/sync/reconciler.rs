//! Full reconciliation runs, serialized and coalesced.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{SyncError, SyncReason, SyncReport, SyncStatusTracker};
use crate::db::EntryStore;
use crate::identity::{classify, IdentitySource, Transition};
use crate::models::{AccountId, EntryId, Identity};
use crate::remote::{BatchWriter, RemoteLedger};
use crate::util::unix_millis_now;

/// What asked for a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    IdentityChanged,
    ManualRefresh,
}

/// One step of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStep {
    MigrateLocalToRemote(AccountId),
    PullRemoteToLocal(AccountId),
    PurgeLocal,
}

impl SyncStep {
    const fn name(&self) -> &'static str {
        match self {
            Self::MigrateLocalToRemote(_) => "migrate",
            Self::PullRemoteToLocal(_) => "pull",
            Self::PurgeLocal => "purge",
        }
    }

    /// Whether this failure leaves the local store in a state later steps must not build on.
    const fn aborts_on(&self, error: &SyncError) -> bool {
        match self {
            Self::MigrateLocalToRemote(_) => false,
            Self::PullRemoteToLocal(_) | Self::PurgeLocal => matches!(error, SyncError::Storage(_)),
        }
    }
}

/// Step sequence for an identity transition.
pub fn plan(transition: &Transition) -> Vec<SyncStep> {
    match transition {
        Transition::FirstSignIn { account } => vec![
            SyncStep::MigrateLocalToRemote(account.clone()),
            SyncStep::PullRemoteToLocal(account.clone()),
        ],
        // Local entries belong to `from` and must not reach `to`
        Transition::AccountSwitch { to, .. } => {
            vec![SyncStep::PurgeLocal, SyncStep::PullRemoteToLocal(to.clone())]
        }
        Transition::SignOut { .. } => vec![SyncStep::PurgeLocal],
    }
}

#[derive(Debug)]
pub enum ReconcileOutcome {
    /// This call ran at least one pass; the report is from the last one.
    Completed(SyncReport),
    /// A run was in flight; the trigger will be handled when it finishes.
    Coalesced,
    /// Nothing to reconcile for the current identity.
    NothingToDo,
}

#[derive(Debug, Clone, Copy, Default)]
struct Pending {
    identity_changed: bool,
    refresh: bool,
}

impl Pending {
    const fn merge(mut self, trigger: SyncTrigger) -> Self {
        match trigger {
            SyncTrigger::IdentityChanged => self.identity_changed = true,
            SyncTrigger::ManualRefresh => self.refresh = true,
        }
        self
    }
}

#[derive(Debug, Default)]
struct Schedule {
    running: bool,
    pending: Option<Pending>,
}

/// Clears the running flag if a run is abandoned mid-flight.
struct RunGuard<'a> {
    schedule: &'a Mutex<Schedule>,
    finished: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            lock(self.schedule).running = false;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decides and executes reconciliation runs. At most one run is in flight;
/// triggers arriving meanwhile are folded into one follow-up pass that is
/// evaluated against the identity current at that time.
#[derive(Clone)]
pub struct Reconciler<S, L> {
    pub(super) store: S,
    pub(super) ledger: L,
    writer: BatchWriter<L>,
    status: SyncStatusTracker,
    schedule: Arc<Mutex<Schedule>>,
    /// Identity whose data the local store reflects
    settled: Arc<Mutex<Identity>>,
}

impl<S: EntryStore, L: RemoteLedger> Reconciler<S, L> {
    /// Build a reconciler, restoring the settled identity from the store owner.
    pub async fn load(store: S, ledger: L, status: SyncStatusTracker) -> crate::Result<Self> {
        let settled = store
            .owner()
            .await?
            .map_or(Identity::Unauthenticated, Identity::Real);
        tracing::debug!("Reconciler starting with settled identity {settled}");
        Ok(Self {
            writer: BatchWriter::new(ledger.clone()),
            store,
            ledger,
            status,
            schedule: Arc::new(Mutex::new(Schedule::default())),
            settled: Arc::new(Mutex::new(settled)),
        })
    }

    pub fn status(&self) -> &SyncStatusTracker {
        &self.status
    }

    /// Identity the local store currently reflects.
    pub fn settled_identity(&self) -> Identity {
        lock(&self.settled).clone()
    }

    /// Handle a trigger. Errors never escape; they land in the report and the status tracker.
    pub async fn reconcile(
        &self,
        trigger: SyncTrigger,
        identity: &impl IdentitySource,
    ) -> ReconcileOutcome {
        {
            let mut schedule = lock(&self.schedule);
            schedule.pending = Some(schedule.pending.unwrap_or_default().merge(trigger));
            if schedule.running {
                tracing::debug!("Reconciliation in flight; coalescing {trigger:?}");
                return ReconcileOutcome::Coalesced;
            }
            schedule.running = true;
        }

        let mut guard = RunGuard {
            schedule: &self.schedule,
            finished: false,
        };
        let mut outcome = ReconcileOutcome::NothingToDo;

        loop {
            let pending = {
                let mut schedule = lock(&self.schedule);
                if let Some(pending) = schedule.pending.take() {
                    pending
                } else {
                    schedule.running = false;
                    guard.finished = true;
                    break;
                }
            };

            let current = identity.current_identity();
            if let Some(report) = self.run_pass(pending, current).await {
                outcome = ReconcileOutcome::Completed(report);
            }
        }

        outcome
    }

    async fn run_pass(&self, pending: Pending, current: Identity) -> Option<SyncReport> {
        let settled = self.settled_identity();
        let transition = classify(&settled, &current);

        let (reason, steps) = match (&transition, current.account_id()) {
            (Some(transition), _) => (SyncReason::from(transition), plan(transition)),
            (None, Some(account)) if pending.refresh => (
                SyncReason::ManualRefresh,
                vec![SyncStep::PullRemoteToLocal(account.clone())],
            ),
            _ => {
                tracing::debug!(
                    "No reconciliation needed (settled {settled}, current {current}, {pending:?})"
                );
                return None;
            }
        };

        tracing::info!("Starting {reason} reconciliation: {settled} -> {current}");
        self.status.begin(reason);

        let mut report = SyncReport::new(reason, current.account_id().cloned());
        for step in steps {
            match self.run_step(&step).await {
                Ok(count) => {
                    tracing::debug!("Step {} finished with {count} entries", step.name());
                    match step {
                        SyncStep::MigrateLocalToRemote(_) => report.migrated = Some(count),
                        SyncStep::PullRemoteToLocal(_) => report.pulled = Some(count),
                        SyncStep::PurgeLocal => report.purged = Some(count),
                    }
                }
                Err(error) => {
                    if let SyncError::Batch(batch) = &error {
                        report.migrated = Some(batch.committed);
                    }
                    report.errors.push(format!("{} failed: {error}", step.name()));
                    if step.aborts_on(&error) {
                        tracing::error!(
                            "Step {} failed, aborting {reason} run: {error}",
                            step.name()
                        );
                        report.aborted = true;
                        break;
                    }
                    tracing::warn!("Step {} failed, continuing {reason} run: {error}", step.name());
                }
            }
        }

        if !report.aborted {
            self.settle(&current, &mut report).await;
        }

        report.finished_at = Some(unix_millis_now());
        self.status.finish(&report);
        tracing::info!(
            "Finished {reason} reconciliation ({:?}, {} errors)",
            report.status(),
            report.errors.len()
        );
        Some(report)
    }

    async fn run_step(&self, step: &SyncStep) -> Result<usize, SyncError> {
        match step {
            SyncStep::MigrateLocalToRemote(account) => self.migrate_local_to_remote(account).await,
            SyncStep::PullRemoteToLocal(account) => self.pull_remote_to_local(account).await,
            SyncStep::PurgeLocal => self.purge_local().await,
        }
    }

    /// Record `current` as the identity the local store now belongs to.
    async fn settle(&self, current: &Identity, report: &mut SyncReport) {
        *lock(&self.settled) = current.clone();
        if let Err(error) = self.store.set_owner(current.account_id()).await {
            tracing::warn!("Failed to persist local store owner: {error}");
            report.errors.push(format!("persist owner failed: {error}"));
        }
    }

    /// Upsert every local entry into the account's ledger. Returns the count committed.
    pub async fn migrate_local_to_remote(&self, account: &AccountId) -> Result<usize, SyncError> {
        let local = self.store.list_entries().await?;
        if local.is_empty() {
            return Ok(0);
        }
        tracing::debug!("Migrating {} local entries to {account}", local.len());
        Ok(self.writer.upsert_all(account, &local).await?)
    }

    /// Insert remote entries missing locally. Existing local entries are never
    /// overwritten. Returns the count added.
    pub async fn pull_remote_to_local(&self, account: &AccountId) -> Result<usize, SyncError> {
        let remote = self.ledger.list_entries(account).await?;
        let local_ids: HashSet<EntryId> = self
            .store
            .list_entries()
            .await?
            .into_iter()
            .map(|entry| entry.id)
            .collect();

        let to_add: Vec<_> = remote
            .into_iter()
            .filter(|entry| !local_ids.contains(&entry.id))
            .collect();
        if to_add.is_empty() {
            return Ok(0);
        }

        tracing::debug!("Pulling {} remote entries for {account}", to_add.len());
        Ok(self.store.insert_missing(&to_add).await?)
    }

    /// Delete every local entry. Returns the count removed.
    pub async fn purge_local(&self) -> Result<usize, SyncError> {
        let removed = self.store.purge().await?;
        tracing::debug!("Purged {removed} local entries");
        Ok(removed)
    }
}

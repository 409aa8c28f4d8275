//! Sync engine facade.
//!
//! Wires the local store, remote ledger, identity monitor and reconciler
//! together, and owns the create/edit/delete paths that feed them.

use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::db::{EntryStore, LocalStore};
use crate::identity::{IdentityMonitor, IdentitySource};
use crate::inference::{NutritionInference, RateLimiter};
use crate::models::{AccountId, Entry, EntryDraft, EntryEdit, EntryId};
use crate::remote::RemoteLedger;
use crate::sync::{
    DeleteOutcome, ReconcileOutcome, Reconciler, RemoteOutcome, SyncError, SyncStatus,
    SyncStatusTracker, SyncTrigger,
};
use crate::Error;

/// Rate-limit key for inference calls made without a real account.
const LOCAL_CALLER: &str = "local";

/// A locally committed entry and what happened to its remote copy.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryWrite {
    pub entry: Entry,
    pub remote: RemoteOutcome,
}

#[derive(Clone)]
pub struct SyncEngine<S, L> {
    store: S,
    identity: IdentityMonitor,
    reconciler: Reconciler<S, L>,
    limiter: RateLimiter,
}

impl<L: RemoteLedger> SyncEngine<LocalStore, L> {
    /// Open the local store named by `config` and build an engine around it.
    pub async fn open(
        config: &EngineConfig,
        ledger: L,
        identity: IdentityMonitor,
    ) -> crate::Result<Self> {
        let store = LocalStore::open_path(config.database_path.clone()).await?;
        Self::new(store, ledger, identity, RateLimiter::from_config(config)).await
    }

    /// Commit revision receiver; changes after every committed local write.
    pub fn subscribe_commits(&self) -> watch::Receiver<u64> {
        self.store.subscribe_commits()
    }
}

impl<S: EntryStore, L: RemoteLedger> SyncEngine<S, L> {
    pub async fn new(
        store: S,
        ledger: L,
        identity: IdentityMonitor,
        limiter: RateLimiter,
    ) -> crate::Result<Self> {
        let reconciler = Reconciler::load(store.clone(), ledger, SyncStatusTracker::new()).await?;
        Ok(Self {
            store,
            identity,
            reconciler,
            limiter,
        })
    }

    /// Monitor the auth glue publishes identities into.
    pub const fn identity(&self) -> &IdentityMonitor {
        &self.identity
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn reconciler(&self) -> &Reconciler<S, L> {
        &self.reconciler
    }

    pub fn status(&self) -> SyncStatus {
        self.reconciler.status().snapshot()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.reconciler.status().subscribe()
    }

    /// Reconcile on every identity change until the task is dropped.
    ///
    /// The first pass runs immediately, so a store left owned by another
    /// account at the last shutdown is handled before any change arrives.
    pub async fn run(self) {
        let mut changes = self.identity.subscribe();
        self.reconciler
            .reconcile(SyncTrigger::IdentityChanged, &self.identity)
            .await;

        while let Some(change) = changes.next().await {
            tracing::debug!("Identity change observed: {:?}", change.transition);
            self.reconciler
                .reconcile(SyncTrigger::IdentityChanged, &self.identity)
                .await;
        }
    }

    /// Pull the signed-in account's entries. Does nothing while local-only.
    pub async fn refresh(&self) -> ReconcileOutcome {
        self.reconciler
            .reconcile(SyncTrigger::ManualRefresh, &self.identity)
            .await
    }

    pub async fn list_entries(&self) -> crate::Result<Vec<Entry>> {
        self.store.list_entries().await
    }

    pub async fn get_entry(&self, id: &EntryId) -> crate::Result<Option<Entry>> {
        self.store.get_entry(id).await
    }

    /// Create an entry locally, then push it best-effort.
    pub async fn log_entry(&self, draft: EntryDraft) -> Result<EntryWrite, SyncError> {
        let entry = Entry::from_draft(draft);
        self.store.save_entry(&entry).await?;
        tracing::info!("Logged entry {}", entry.id);
        let remote = self.push(&entry).await?;
        Ok(EntryWrite { entry, remote })
    }

    /// Estimate nutrition for a meal, then log it like [`Self::log_entry`].
    ///
    /// The call is counted against the caller's inference window before the
    /// service is contacted; a denied call creates nothing.
    pub async fn log_with_inference(
        &self,
        description: &str,
        category: &str,
        media: Option<&[u8]>,
        service: &impl NutritionInference,
    ) -> Result<EntryWrite, SyncError> {
        if description.trim().is_empty() {
            return Err(Error::InvalidInput("entry description cannot be empty".to_string()).into());
        }

        let identity = self.identity.current_identity();
        let caller = identity
            .account_id()
            .map_or(LOCAL_CALLER, AccountId::as_str);
        self.limiter.check(caller).await?;

        let estimate = service.infer(description, category, media).await?;
        tracing::debug!("Inference estimated {} calories", estimate.calories);

        let draft = EntryDraft {
            details: Some(estimate.to_details()?),
            has_photo: media.is_some(),
            ..EntryDraft::new(description, category, estimate.calories)
        };
        self.log_entry(draft).await
    }

    /// Apply a field-level edit locally, then push it best-effort.
    pub async fn edit_entry(&self, id: &EntryId, edit: EntryEdit) -> Result<EntryWrite, SyncError> {
        let mut entry = self
            .store
            .get_entry(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        entry.apply(edit);
        self.store.save_entry(&entry).await?;
        tracing::info!("Edited entry {id}");
        let remote = self.push(&entry).await?;
        Ok(EntryWrite { entry, remote })
    }

    /// Delete an entry locally and remotely; the local delete always stands.
    pub async fn delete_entry(&self, id: &EntryId) -> Result<DeleteOutcome, SyncError> {
        let identity = self.identity.current_identity();
        let outcome = self.reconciler.delete_single_entry(&identity, id).await?;
        tracing::info!("Deleted entry {id} ({:?})", outcome.remote);
        Ok(outcome)
    }

    async fn push(&self, entry: &Entry) -> Result<RemoteOutcome, SyncError> {
        let identity = self.identity.current_identity();
        match self.reconciler.push_single_entry(&identity, entry).await {
            Err(SyncError::NotSignedIn) => {
                tracing::debug!("Entry {} kept local-only ({identity})", entry.id);
                Ok(RemoteOutcome::LocalOnly)
            }
            result => result,
        }
    }
}

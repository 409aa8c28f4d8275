//! Test fixtures: entry factories and fault-injecting store/ledger wrappers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{watch, Notify};

use crate::db::{EntryStore, LocalStore};
use crate::models::{AccountId, Entry, EntryDraft, EntryId};
use crate::remote::{InMemoryLedger, RemoteError, RemoteLedger, RemoteResult};

/// Route `tracing` output to the test writer, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn account(id: &str) -> AccountId {
    AccountId::new(id).unwrap()
}

/// `n` fresh entries described as "entry 0", "entry 1", ...
pub fn entries(n: usize) -> Vec<Entry> {
    (0..n)
        .map(|i| Entry::from_draft(EntryDraft::new(format!("entry {i}"), "snack", 100.0)))
        .collect()
}

pub fn entry_ids(entries: &[Entry]) -> HashSet<EntryId> {
    entries.iter().map(|entry| entry.id).collect()
}

#[derive(Debug)]
struct ListGate {
    entered: Notify,
    released: watch::Sender<bool>,
}

/// Wraps an [`InMemoryLedger`], recording calls and injecting failures.
#[derive(Debug, Clone)]
pub struct FlakyLedger {
    inner: InMemoryLedger,
    calls: Arc<AtomicUsize>,
    commit_sizes: Arc<Mutex<Vec<usize>>>,
    fail_commit_number: Option<usize>,
    fail_lists: bool,
    fail_deletes: bool,
    gate: Option<Arc<ListGate>>,
}

impl FlakyLedger {
    pub fn new(inner: InMemoryLedger) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
            commit_sizes: Arc::new(Mutex::new(Vec::new())),
            fail_commit_number: None,
            fail_lists: false,
            fail_deletes: false,
            gate: None,
        }
    }

    /// Fail the n-th commit (1-based) as unreachable.
    pub fn fail_commit_number(mut self, n: usize) -> Self {
        self.fail_commit_number = Some(n);
        self
    }

    pub fn fail_lists(mut self, fail: bool) -> Self {
        self.fail_lists = fail;
        self
    }

    pub fn fail_deletes(mut self, fail: bool) -> Self {
        self.fail_deletes = fail;
        self
    }

    /// Block every list call until [`Self::release_lists`].
    pub fn hold_lists(mut self) -> Self {
        let (released, _) = watch::channel(false);
        self.gate = Some(Arc::new(ListGate {
            entered: Notify::new(),
            released,
        }));
        self
    }

    pub fn inner(&self) -> &InMemoryLedger {
        &self.inner
    }

    /// Sizes of every attempted commit, failed ones included.
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.commit_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn commit_count(&self) -> usize {
        self.commit_sizes().len()
    }

    /// Every call made, of any kind.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wait until a list call is blocked on the gate.
    pub async fn wait_for_held_list(&self) {
        if let Some(gate) = &self.gate {
            gate.entered.notified().await;
        }
    }

    pub fn release_lists(&self) {
        if let Some(gate) = &self.gate {
            gate.released.send_replace(true);
        }
    }
}

impl RemoteLedger for FlakyLedger {
    async fn list_entries(&self, account_id: &AccountId) -> RemoteResult<Vec<Entry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let mut released = gate.released.subscribe();
            gate.entered.notify_one();
            let _ = released.wait_for(|released| *released).await;
        }
        if self.fail_lists {
            return Err(RemoteError::Unreachable("injected list failure".to_string()));
        }
        self.inner.list_entries(account_id).await
    }

    async fn commit_group(&self, account_id: &AccountId, entries: &[Entry]) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let number = {
            let mut sizes = self
                .commit_sizes
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            sizes.push(entries.len());
            sizes.len()
        };
        if self.fail_commit_number == Some(number) {
            return Err(RemoteError::Unreachable(format!(
                "injected failure on commit {number}"
            )));
        }
        self.inner.commit_group(account_id, entries).await
    }

    async fn delete_entry(&self, account_id: &AccountId, entry_id: &EntryId) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes {
            return Err(RemoteError::Unreachable("injected delete failure".to_string()));
        }
        self.inner.delete_entry(account_id, entry_id).await
    }
}

/// Wraps a [`LocalStore`] with switchable failures.
#[derive(Clone)]
pub struct FlakyStore {
    inner: LocalStore,
    fail_purge: Arc<AtomicBool>,
    fail_insert: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new(inner: LocalStore) -> Self {
        Self {
            inner,
            fail_purge: Arc::new(AtomicBool::new(false)),
            fail_insert: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn inner(&self) -> &LocalStore {
        &self.inner
    }

    pub fn fail_purge(&self, fail: bool) {
        self.fail_purge.store(fail, Ordering::SeqCst);
    }

    pub fn fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }
}

impl EntryStore for FlakyStore {
    async fn list_entries(&self) -> crate::Result<Vec<Entry>> {
        self.inner.list_entries().await
    }

    async fn get_entry(&self, id: &EntryId) -> crate::Result<Option<Entry>> {
        self.inner.get_entry(id).await
    }

    async fn save_entry(&self, entry: &Entry) -> crate::Result<()> {
        self.inner.save_entry(entry).await
    }

    async fn insert_missing(&self, entries: &[Entry]) -> crate::Result<usize> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(crate::Error::Database("injected insert failure".to_string()));
        }
        self.inner.insert_missing(entries).await
    }

    async fn delete_entry(&self, id: &EntryId) -> crate::Result<bool> {
        self.inner.delete_entry(id).await
    }

    async fn purge(&self) -> crate::Result<usize> {
        if self.fail_purge.load(Ordering::SeqCst) {
            return Err(crate::Error::Database("injected purge failure".to_string()));
        }
        self.inner.purge().await
    }

    async fn owner(&self) -> crate::Result<Option<AccountId>> {
        self.inner.owner().await
    }

    async fn set_owner(&self, owner: Option<&AccountId>) -> crate::Result<()> {
        self.inner.set_owner(owner).await
    }
}

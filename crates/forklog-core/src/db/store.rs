//! Shared local entry store used by the reconciler and the edit paths.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::db::{Database, EntryRepository, LibSqlEntryRepository};
use crate::models::{AccountId, Entry, EntryId};
use crate::Result;

const OWNER_KEY: &str = "owner_account_id";

/// The local record store as seen by the sync engine.
///
/// Every write resolves only after its transaction has committed, so callers
/// can treat the returned future as the commit acknowledgement.
pub trait EntryStore: Clone + Send + Sync + 'static {
    /// All entries, most recent first.
    fn list_entries(&self) -> impl Future<Output = Result<Vec<Entry>>> + Send;

    fn get_entry(&self, id: &EntryId) -> impl Future<Output = Result<Option<Entry>>> + Send;

    /// Insert or update an entry on behalf of the owning create/edit path.
    fn save_entry(&self, entry: &Entry) -> impl Future<Output = Result<()>> + Send;

    /// Insert entries that are not present locally, never overwriting; returns the count added.
    fn insert_missing(&self, entries: &[Entry]) -> impl Future<Output = Result<usize>> + Send;

    /// Remove one entry; `false` when it was already absent.
    fn delete_entry(&self, id: &EntryId) -> impl Future<Output = Result<bool>> + Send;

    /// Remove every entry; returns the count removed.
    fn purge(&self) -> impl Future<Output = Result<usize>> + Send;

    /// Account whose data the store currently holds.
    fn owner(&self) -> impl Future<Output = Result<Option<AccountId>>> + Send;

    fn set_owner(&self, owner: Option<&AccountId>) -> impl Future<Output = Result<()>> + Send;
}

/// Thread-safe libSQL-backed entry store.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    revision: Arc<watch::Sender<u64>>,
}

impl LocalStore {
    /// Open a store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::info!("Opened local entry store at {}", db_path.display());
        Ok(Self::from_database(db))
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db))
    }

    fn from_database(db: Database) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            db: Arc::new(Mutex::new(db)),
            revision: Arc::new(revision),
        }
    }

    /// Subscribe to commit notifications. The value increases after every committed write.
    pub fn subscribe_commits(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Current commit revision.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn mark_committed(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

impl EntryStore for LocalStore {
    async fn list_entries(&self) -> Result<Vec<Entry>> {
        let db = self.db.lock().await;
        let repo = LibSqlEntryRepository::new(db.connection());
        repo.list().await
    }

    async fn get_entry(&self, id: &EntryId) -> Result<Option<Entry>> {
        let db = self.db.lock().await;
        let repo = LibSqlEntryRepository::new(db.connection());
        repo.get(id).await
    }

    async fn save_entry(&self, entry: &Entry) -> Result<()> {
        entry.validate()?;
        {
            let db = self.db.lock().await;
            let repo = LibSqlEntryRepository::new(db.connection());
            repo.save(entry).await?;
        }
        self.mark_committed();
        Ok(())
    }

    async fn insert_missing(&self, entries: &[Entry]) -> Result<usize> {
        let inserted = {
            let db = self.db.lock().await;
            let repo = LibSqlEntryRepository::new(db.connection());
            repo.insert_missing(entries).await?
        };
        if inserted > 0 {
            self.mark_committed();
        }
        Ok(inserted)
    }

    async fn delete_entry(&self, id: &EntryId) -> Result<bool> {
        let deleted = {
            let db = self.db.lock().await;
            let repo = LibSqlEntryRepository::new(db.connection());
            repo.delete(id).await?
        };
        if deleted {
            self.mark_committed();
        }
        Ok(deleted)
    }

    async fn purge(&self) -> Result<usize> {
        let removed = {
            let db = self.db.lock().await;
            let repo = LibSqlEntryRepository::new(db.connection());
            repo.purge().await?
        };
        self.mark_committed();
        Ok(removed)
    }

    async fn owner(&self) -> Result<Option<AccountId>> {
        let value = {
            let db = self.db.lock().await;
            let repo = LibSqlEntryRepository::new(db.connection());
            repo.meta(OWNER_KEY).await?
        };
        value.map(AccountId::new).transpose()
    }

    async fn set_owner(&self, owner: Option<&AccountId>) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlEntryRepository::new(db.connection());
        repo.set_meta(OWNER_KEY, owner.map(AccountId::as_str)).await
    }
}

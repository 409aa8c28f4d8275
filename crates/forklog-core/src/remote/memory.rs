//! In-process remote ledger.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{RemoteError, RemoteLedger, RemoteResult, MAX_BATCH_SIZE};
use crate::models::{AccountId, Entry, EntryId};

type Accounts = HashMap<AccountId, BTreeMap<EntryId, Entry>>;

/// Remote ledger kept in memory, with the same group-size limit and
/// per-group atomicity as the hosted one.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    accounts: Arc<Mutex<Accounts>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account's collection directly, bypassing group limits.
    pub fn seed(&self, account_id: &AccountId, entries: impl IntoIterator<Item = Entry>) {
        let mut accounts = self.lock();
        let collection = accounts.entry(account_id.clone()).or_default();
        for entry in entries {
            collection.insert(entry.id, entry);
        }
    }

    /// Entry ids currently stored for the account.
    pub fn entry_ids(&self, account_id: &AccountId) -> Vec<EntryId> {
        self.lock()
            .get(account_id)
            .map(|collection| collection.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn entry_count(&self, account_id: &AccountId) -> usize {
        self.lock().get(account_id).map_or(0, BTreeMap::len)
    }

    pub fn get(&self, account_id: &AccountId, entry_id: &EntryId) -> Option<Entry> {
        self.lock()
            .get(account_id)
            .and_then(|collection| collection.get(entry_id).cloned())
    }

    fn lock(&self) -> MutexGuard<'_, Accounts> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RemoteLedger for InMemoryLedger {
    async fn list_entries(&self, account_id: &AccountId) -> RemoteResult<Vec<Entry>> {
        Ok(self
            .lock()
            .get(account_id)
            .map(|collection| collection.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn commit_group(&self, account_id: &AccountId, entries: &[Entry]) -> RemoteResult<()> {
        if entries.len() > MAX_BATCH_SIZE {
            return Err(RemoteError::QuotaExceeded(format!(
                "group of {} writes exceeds the limit of {MAX_BATCH_SIZE}",
                entries.len()
            )));
        }

        let mut accounts = self.lock();
        let collection = accounts.entry(account_id.clone()).or_default();
        for entry in entries {
            collection.insert(entry.id, entry.clone());
        }
        Ok(())
    }

    async fn delete_entry(&self, account_id: &AccountId, entry_id: &EntryId) -> RemoteResult<()> {
        let removed = self
            .lock()
            .get_mut(account_id)
            .and_then(|collection| collection.remove(entry_id));
        match removed {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(format!(
                "accounts/{account_id}/entries/{entry_id}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{account, entries};

    #[tokio::test(flavor = "multi_thread")]
    async fn accounts_are_isolated() {
        let ledger = InMemoryLedger::new();
        let a = account("user-a");
        let b = account("user-b");

        ledger.commit_group(&a, &entries(3)).await.unwrap();

        assert_eq!(ledger.list_entries(&a).await.unwrap().len(), 3);
        assert!(ledger.list_entries(&b).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn commit_is_an_upsert_by_id() {
        let ledger = InMemoryLedger::new();
        let a = account("user-a");
        let mut batch = entries(2);

        ledger.commit_group(&a, &batch).await.unwrap();
        batch[0].description = "edited".to_string();
        ledger.commit_group(&a, &batch).await.unwrap();

        assert_eq!(ledger.entry_count(&a), 2);
        assert_eq!(ledger.get(&a, &batch[0].id).unwrap().description, "edited");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn oversized_group_is_rejected_atomically() {
        let ledger = InMemoryLedger::new();
        let a = account("user-a");

        let error = ledger
            .commit_group(&a, &entries(MAX_BATCH_SIZE + 1))
            .await
            .unwrap_err();

        assert!(matches!(error, RemoteError::QuotaExceeded(_)));
        assert_eq!(ledger.entry_count(&a), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_missing_entry_reports_not_found() {
        let ledger = InMemoryLedger::new();
        let a = account("user-a");
        let batch = entries(1);
        ledger.seed(&a, batch.clone());

        ledger.delete_entry(&a, &batch[0].id).await.unwrap();
        let error = ledger.delete_entry(&a, &batch[0].id).await.unwrap_err();
        assert!(matches!(error, RemoteError::NotFound(_)));
    }
}

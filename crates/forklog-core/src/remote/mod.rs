//! Remote ledger access: per-account entry collections.
//!
//! Entries live under `accounts/{accountId}/entries/{entryId}`. Every call takes
//! an [`AccountId`], which only exists for real signed-in identities, so the
//! anonymous/unauthenticated case is decided by the caller before any request
//! is built.

mod batch;
mod http;
mod memory;

use std::future::Future;

use thiserror::Error;

use crate::models::{AccountId, Entry, EntryId};

pub use batch::{BatchWriteError, BatchWriter, MAX_BATCH_SIZE};
pub use http::HttpLedger;
pub use memory::InMemoryLedger;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Remote ledger unreachable: {0}")]
    Unreachable(String),
    #[error("Permission denied by remote ledger: {0}")]
    PermissionDenied(String),
    #[error("Remote ledger quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Remote entry not found: {0}")]
    NotFound(String),
    #[error("Invalid remote ledger payload: {0}")]
    InvalidPayload(String),
}

impl RemoteError {
    /// Whether a later attempt may succeed without user action.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Remote document store for one record type, namespaced by account id.
pub trait RemoteLedger: Clone + Send + Sync + 'static {
    /// Fetch every entry stored for the account.
    fn list_entries(
        &self,
        account_id: &AccountId,
    ) -> impl Future<Output = RemoteResult<Vec<Entry>>> + Send;

    /// Upsert one group of entries atomically, keyed by entry id.
    ///
    /// Callers keep groups at or below [`MAX_BATCH_SIZE`]; see [`BatchWriter`].
    fn commit_group(
        &self,
        account_id: &AccountId,
        entries: &[Entry],
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Delete one entry. Returns [`RemoteError::NotFound`] when it is already gone.
    fn delete_entry(
        &self,
        account_id: &AccountId,
        entry_id: &EntryId,
    ) -> impl Future<Output = RemoteResult<()>> + Send;
}

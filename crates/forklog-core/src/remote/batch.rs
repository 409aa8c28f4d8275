//! Chunked bulk upserts against a remote ledger.

use thiserror::Error;

use super::{RemoteError, RemoteLedger};
use crate::models::{AccountId, Entry};

/// Maximum number of writes the remote ledger accepts in one atomic group.
pub const MAX_BATCH_SIZE: usize = 500;

/// A bulk write stopped part-way. Groups before the failing one stay committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Batch write failed after committing {committed} entries: {source}")]
pub struct BatchWriteError {
    pub committed: usize,
    #[source]
    pub source: RemoteError,
}

/// Splits bulk upserts into groups of at most [`MAX_BATCH_SIZE`] and commits them in order.
#[derive(Debug, Clone)]
pub struct BatchWriter<L> {
    ledger: L,
    group_size: usize,
}

impl<L: RemoteLedger> BatchWriter<L> {
    pub const fn new(ledger: L) -> Self {
        Self {
            ledger,
            group_size: MAX_BATCH_SIZE,
        }
    }

    /// Upsert all entries, returning how many were committed.
    ///
    /// A failing group aborts the remaining groups; the error reports the count
    /// committed before it.
    pub async fn upsert_all(
        &self,
        account_id: &AccountId,
        entries: &[Entry],
    ) -> Result<usize, BatchWriteError> {
        let mut committed = 0usize;
        let total_groups = entries.len().div_ceil(self.group_size);

        for (index, group) in entries.chunks(self.group_size).enumerate() {
            if let Err(source) = self.ledger.commit_group(account_id, group).await {
                tracing::warn!(
                    "Batch {}/{total_groups} for {account_id} failed after {committed} committed: {source}",
                    index + 1
                );
                return Err(BatchWriteError { committed, source });
            }
            committed += group.len();
            tracing::debug!(
                "Committed batch {}/{total_groups} ({} entries) for {account_id}",
                index + 1,
                group.len()
            );
        }

        Ok(committed)
    }
}

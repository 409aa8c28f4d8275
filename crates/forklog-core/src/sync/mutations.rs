//! Best-effort propagation of single-entry edits.
//!
//! These run alongside full reconciliation without taking its schedule: both
//! sides are upserts or deletes keyed by entry id, so any interleaving converges.

use std::slice;

use super::{Reconciler, SyncError};
use crate::db::EntryStore;
use crate::models::{AccountId, Entry, EntryId, Identity};
use crate::remote::{RemoteError, RemoteLedger};

/// What happened on the remote side of a local write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    Synced,
    /// No real account; the write stays local.
    LocalOnly,
    /// The local store still holds another account's entries. The pending
    /// reconciliation decides what reaches the remote.
    Deferred,
    /// The local write stands; the remote copy was not updated.
    Failed(RemoteError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Whether a local row was removed
    pub removed_locally: bool,
    pub remote: RemoteOutcome,
}

impl<S: EntryStore, L: RemoteLedger> Reconciler<S, L> {
    /// Upsert one entry into the ledger of the identity's account.
    ///
    /// Fails fast with [`SyncError::NotSignedIn`] for non-real identities; a
    /// remote failure is logged and returned as [`RemoteOutcome::Failed`].
    pub async fn push_single_entry(
        &self,
        identity: &Identity,
        entry: &Entry,
    ) -> Result<RemoteOutcome, SyncError> {
        let account = identity.account_id().ok_or(SyncError::NotSignedIn)?;
        if self.holds_other_account(account) {
            tracing::debug!("Entry {} not pushed to {account} before reconciliation", entry.id);
            return Ok(RemoteOutcome::Deferred);
        }
        match self
            .ledger
            .commit_group(account, slice::from_ref(entry))
            .await
        {
            Ok(()) => {
                tracing::debug!("Pushed entry {} to {account}", entry.id);
                Ok(RemoteOutcome::Synced)
            }
            Err(error) => {
                tracing::warn!("Failed to push entry {} to {account}: {error}", entry.id);
                Ok(RemoteOutcome::Failed(error))
            }
        }
    }

    /// Delete one entry locally and, for real identities, remotely at the same time.
    ///
    /// The local delete stands regardless of the remote result. A failed remote
    /// delete is not retried; the orphaned remote copy stays and a later pull
    /// adds it back locally.
    pub async fn delete_single_entry(
        &self,
        identity: &Identity,
        id: &EntryId,
    ) -> Result<DeleteOutcome, SyncError> {
        let Some(account) = identity.account_id() else {
            let removed_locally = self.store.delete_entry(id).await?;
            return Ok(DeleteOutcome {
                removed_locally,
                remote: RemoteOutcome::LocalOnly,
            });
        };
        if self.holds_other_account(account) {
            let removed_locally = self.store.delete_entry(id).await?;
            tracing::debug!("Remote delete of entry {id} for {account} left to reconciliation");
            return Ok(DeleteOutcome {
                removed_locally,
                remote: RemoteOutcome::Deferred,
            });
        }

        let (local, remote) = tokio::join!(
            self.store.delete_entry(id),
            self.ledger.delete_entry(account, id)
        );

        let remote = match remote {
            Ok(()) | Err(RemoteError::NotFound(_)) => RemoteOutcome::Synced,
            Err(error) => {
                tracing::warn!("Remote delete of entry {id} for {account} failed: {error}");
                RemoteOutcome::Failed(error)
            }
        };

        Ok(DeleteOutcome {
            removed_locally: local?,
            remote,
        })
    }

    /// Whether the local store was last settled for a real account other than `account`.
    ///
    /// Entries of an anonymous store are migrated into the signing-in account,
    /// so only a pending account switch blocks single-entry propagation.
    fn holds_other_account(&self, account: &AccountId) -> bool {
        self.settled_identity()
            .account_id()
            .is_some_and(|owner| owner != account)
    }
}

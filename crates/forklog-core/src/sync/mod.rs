//! Reconciliation between the local entry store and the remote ledger.

mod mutations;
mod reconciler;
mod state;

use std::fmt;

use thiserror::Error;

use crate::identity::Transition;
use crate::inference::InferenceError;
use crate::models::AccountId;
use crate::remote::{BatchWriteError, RemoteError};
use crate::util::unix_millis_now;

pub use mutations::{DeleteOutcome, RemoteOutcome};
pub use reconciler::{plan, ReconcileOutcome, Reconciler, SyncStep, SyncTrigger};
pub use state::{RunStatus, SyncState, SyncStatus, SyncStatusTracker};

#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote sync was requested without a real signed-in account.
    #[error("Remote sync requires a signed-in account")]
    NotSignedIn,
    #[error(transparent)]
    Storage(#[from] crate::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Batch(#[from] BatchWriteError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Why a reconciliation run started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncReason {
    FirstSignIn,
    AccountSwitch,
    SignOut,
    ManualRefresh,
}

impl From<&Transition> for SyncReason {
    fn from(transition: &Transition) -> Self {
        match transition {
            Transition::FirstSignIn { .. } => Self::FirstSignIn,
            Transition::AccountSwitch { .. } => Self::AccountSwitch,
            Transition::SignOut { .. } => Self::SignOut,
        }
    }
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FirstSignIn => "first sign-in",
            Self::AccountSwitch => "account switch",
            Self::SignOut => "sign-out",
            Self::ManualRefresh => "manual refresh",
        })
    }
}

/// Result of one completed reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub reason: SyncReason,
    /// Account the local store belongs to after the run
    pub account: Option<AccountId>,
    /// Entries committed to the remote ledger by migration
    pub migrated: Option<usize>,
    /// Entries added locally by the pull
    pub pulled: Option<usize>,
    /// Entries removed locally by the purge
    pub purged: Option<usize>,
    /// Step failures, in the order they happened
    pub errors: Vec<String>,
    /// A local-store failure stopped the sequence early
    pub aborted: bool,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

impl SyncReport {
    pub fn new(reason: SyncReason, account: Option<AccountId>) -> Self {
        Self {
            reason,
            account,
            migrated: None,
            pulled: None,
            purged: None,
            errors: Vec::new(),
            aborted: false,
            started_at: unix_millis_now(),
            finished_at: None,
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.errors.is_empty() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        }
    }

    /// All step errors joined for display, `None` when the run succeeded.
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }
}

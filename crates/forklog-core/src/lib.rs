//! forklog-core - Offline-first entry store and account-scoped sync engine
//!
//! Entries are written to a local libSQL store first and replicated
//! best-effort to a remote ledger namespaced by account. Identity changes
//! (sign-in, account switch, sign-out) drive full reconciliation runs.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod identity;
pub mod inference;
pub mod models;
pub mod remote;
pub mod sync;
pub mod util;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use engine::{EntryWrite, SyncEngine};
pub use error::{Error, Result};
pub use identity::{IdentityMonitor, IdentitySource, Transition};
pub use models::{AccountId, Entry, EntryDraft, EntryEdit, EntryId, Identity};
pub use remote::{HttpLedger, InMemoryLedger, RemoteError, RemoteLedger};
pub use sync::{SyncError, SyncReport, SyncState, SyncStatus};

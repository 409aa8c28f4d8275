//! Data models for Forklog

mod entry;
mod identity;

pub use entry::{Entry, EntryDraft, EntryEdit, EntryId};
pub use identity::{AccountId, Identity};

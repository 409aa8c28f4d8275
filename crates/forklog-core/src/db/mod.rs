//! Database layer for Forklog

mod connection;
mod migrations;
mod repository;
mod store;

pub use connection::Database;
pub use repository::{EntryRepository, LibSqlEntryRepository};
pub use store::{EntryStore, LocalStore};

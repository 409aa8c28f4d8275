//! Entry repository implementation

use crate::error::{Error, Result};
use crate::models::{Entry, EntryId};
use libsql::{params, Connection, Row};

const ENTRY_COLUMNS: &str =
    "id, occurred_at, recorded_at, description, category, calories, details, has_photo";

/// Trait for entry storage operations (async)
#[allow(async_fn_in_trait)]
pub trait EntryRepository {
    /// List all entries, most recent `occurred_at` first
    async fn list(&self) -> Result<Vec<Entry>>;

    /// Get an entry by ID
    async fn get(&self, id: &EntryId) -> Result<Option<Entry>>;

    /// Insert or update an entry from the owning create/edit path
    async fn save(&self, entry: &Entry) -> Result<()>;

    /// Insert entries whose ids are not present yet; existing rows are left untouched.
    ///
    /// Returns the number of rows inserted.
    async fn insert_missing(&self, entries: &[Entry]) -> Result<usize>;

    /// Delete an entry. Returns `false` when no row matched.
    async fn delete(&self, id: &EntryId) -> Result<bool>;

    /// Delete every entry. Returns the number of rows removed.
    async fn purge(&self) -> Result<usize>;

    /// Read a sync metadata value
    async fn meta(&self, key: &str) -> Result<Option<String>>;

    /// Write (`Some`) or remove (`None`) a sync metadata value
    async fn set_meta(&self, key: &str, value: Option<&str>) -> Result<()>;
}

/// libSQL implementation of `EntryRepository`
pub struct LibSqlEntryRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntryRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an entry from a database row
    fn parse_entry(row: &Row) -> Result<Entry> {
        let id: String = row.get(0)?;
        let occurred_at: i64 = row.get(1)?;
        let recorded_at: Option<i64> = row.get(2)?;
        Ok(Entry {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid entry ID in store: {id}")))?,
            occurred_at,
            recorded_at: recorded_at.unwrap_or(occurred_at),
            description: row.get(3)?,
            category: row.get(4)?,
            calories: row.get(5)?,
            details: row.get(6)?,
            has_photo: row.get::<i64>(7)? != 0,
        })
    }

    async fn in_transaction<T>(
        &self,
        work: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        match work.await {
            Ok(value) => {
                if let Err(e) = self.conn.execute("COMMIT", ()).await {
                    self.conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
                Ok(value)
            }
            Err(e) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                Err(e)
            }
        }
    }
}

impl EntryRepository for LibSqlEntryRepository<'_> {
    async fn list(&self) -> Result<Vec<Entry>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries ORDER BY occurred_at DESC, id DESC"
                ),
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    async fn get(&self, id: &EntryId) -> Result<Option<Entry>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"),
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, entry: &Entry) -> Result<()> {
        // recorded_at is only filled in when the stored row has none
        self.conn
            .execute(
                "INSERT INTO entries (id, occurred_at, recorded_at, description, category, calories, details, has_photo)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    occurred_at = excluded.occurred_at,
                    recorded_at = COALESCE(entries.recorded_at, excluded.recorded_at),
                    description = excluded.description,
                    category = excluded.category,
                    calories = excluded.calories,
                    details = excluded.details,
                    has_photo = excluded.has_photo",
                params![
                    entry.id.as_str(),
                    entry.occurred_at,
                    entry.recorded_at,
                    entry.description.clone(),
                    entry.category.clone(),
                    entry.calories,
                    entry.details.clone(),
                    i64::from(entry.has_photo)
                ],
            )
            .await?;
        Ok(())
    }

    async fn insert_missing(&self, entries: &[Entry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        self.in_transaction(async {
            let mut inserted = 0usize;
            for entry in entries {
                let rows = self
                    .conn
                    .execute(
                        "INSERT OR IGNORE INTO entries (id, occurred_at, recorded_at, description, category, calories, details, has_photo)
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                        params![
                            entry.id.as_str(),
                            entry.occurred_at,
                            entry.recorded_at,
                            entry.description.clone(),
                            entry.category.clone(),
                            entry.calories,
                            entry.details.clone(),
                            i64::from(entry.has_photo)
                        ],
                    )
                    .await?;
                if rows > 0 {
                    inserted += 1;
                }
            }
            Ok::<_, Error>(inserted)
        })
        .await
    }

    async fn delete(&self, id: &EntryId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM entries WHERE id = ?", params![id.as_str()])
            .await?;
        Ok(rows > 0)
    }

    async fn purge(&self) -> Result<usize> {
        let rows = self
            .in_transaction(async {
                Ok::<_, Error>(self.conn.execute("DELETE FROM entries", ()).await?)
            })
            .await?;
        usize::try_from(rows).map_err(|error| Error::Database(error.to_string()))
    }

    async fn meta(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_meta WHERE key = ?", params![key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn set_meta(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => {
                self.conn
                    .execute(
                        "INSERT INTO sync_meta (key, value) VALUES (?, ?)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                        params![key, value],
                    )
                    .await?;
            }
            None => {
                self.conn
                    .execute("DELETE FROM sync_meta WHERE key = ?", params![key])
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::EntryDraft;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn entry(description: &str, occurred_at: i64) -> Entry {
        Entry::from_draft(EntryDraft {
            occurred_at: Some(occurred_at),
            ..EntryDraft::new(description, "lunch", 250.0)
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_and_get() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let mut saved = entry("Salad", 1_000);
        saved.details = Some(r#"{"protein":12}"#.to_string());
        saved.has_photo = true;
        repo.save(&saved).await.unwrap();

        let fetched = repo.get(&saved.id).await.unwrap().unwrap();
        assert_eq!(fetched, saved);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_orders_by_occurred_at_desc() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        repo.save(&entry("first", 1_000)).await.unwrap();
        repo.save(&entry("third", 3_000)).await.unwrap();
        repo.save(&entry("second", 2_000)).await.unwrap();

        let descriptions: Vec<_> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.description)
            .collect();
        assert_eq!(descriptions, vec!["third", "second", "first"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_never_overwrites_recorded_at() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let original = entry("Soup", 1_000);
        repo.save(&original).await.unwrap();

        let mut edited = original.clone();
        edited.description = "Tomato soup".to_string();
        edited.recorded_at = original.recorded_at + 99_999;
        repo.save(&edited).await.unwrap();

        let fetched = repo.get(&original.id).await.unwrap().unwrap();
        assert_eq!(fetched.description, "Tomato soup");
        assert_eq!(fetched.recorded_at, original.recorded_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_missing_skips_existing_rows() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let local = entry("local copy", 1_000);
        repo.save(&local).await.unwrap();

        let mut remote_copy = local.clone();
        remote_copy.description = "remote copy".to_string();
        let fresh = entry("fresh", 2_000);

        let inserted = repo
            .insert_missing(&[remote_copy, fresh.clone()])
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let kept = repo.get(&local.id).await.unwrap().unwrap();
        assert_eq!(kept.description, "local copy");
        assert!(repo.get(&fresh.id).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_and_purge() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let a = entry("a", 1);
        let b = entry("b", 2);
        let c = entry("c", 3);
        for e in [&a, &b, &c] {
            repo.save(e).await.unwrap();
        }

        assert!(repo.delete(&a.id).await.unwrap());
        assert!(!repo.delete(&a.id).await.unwrap());
        assert_eq!(repo.purge().await.unwrap(), 2);
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_legacy_row_reads_recorded_at_from_occurred_at() {
        let db = setup().await;
        let id = EntryId::new();
        db.connection()
            .execute(
                "INSERT INTO entries (id, occurred_at, description, category, calories)
                 VALUES (?, 5000, 'legacy', 'dinner', 400.0)",
                params![id.as_str()],
            )
            .await
            .unwrap();

        let repo = LibSqlEntryRepository::new(db.connection());
        let fetched = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.recorded_at, 5_000);
        assert_eq!(fetched.details, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_meta_roundtrip_and_clear() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        assert_eq!(repo.meta("owner").await.unwrap(), None);
        repo.set_meta("owner", Some("user-a")).await.unwrap();
        repo.set_meta("owner", Some("user-b")).await.unwrap();
        assert_eq!(repo.meta("owner").await.unwrap().as_deref(), Some("user-b"));
        repo.set_meta("owner", None).await.unwrap();
        assert_eq!(repo.meta("owner").await.unwrap(), None);
    }
}

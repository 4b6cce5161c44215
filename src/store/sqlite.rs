use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection};
use rusqlite_migration::{Migrations, M};

use crate::app::{FeedwatchError, Result};
use crate::domain::Entry;
use crate::store::Store;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| FeedwatchError::Other(format!("migration failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| FeedwatchError::Other(format!("store lock poisoned: {}", e)))
    }
}

impl Store for SqliteStore {
    fn has_seen(&self, feed_name: &str, entry_id: &str) -> Result<bool> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM seen_entries WHERE feed_name = ?1 AND entry_id = ?2",
            params![feed_name, entry_id],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    fn mark_seen(&self, feed_name: &str, entry_id: &str, title: &str, link: &str) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT OR IGNORE INTO seen_entries (feed_name, entry_id, title, link, seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![feed_name, entry_id, title, link, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    fn mark_many_seen(&self, feed_name: &str, entries: &[Entry]) -> Result<usize> {
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut count = 0;

        for entry in entries {
            count += tx.execute(
                "INSERT OR IGNORE INTO seen_entries (feed_name, entry_id, title, link, seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![feed_name, entry.id, entry.title, entry.link, now],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }

    fn is_initialized(&self, feed_name: &str) -> Result<bool> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM feed_state WHERE feed_name = ?1",
            params![feed_name],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    fn mark_initialized(&self, feed_name: &str) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT OR IGNORE INTO feed_state (feed_name, initialized_at) VALUES (?1, ?2)",
            params![feed_name, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    fn seen_count(&self, feed_name: Option<&str>) -> Result<i64> {
        let conn = self.conn()?;

        let count: i64 = match feed_name {
            Some(name) => conn.query_row(
                "SELECT COUNT(*) FROM seen_entries WHERE feed_name = ?1",
                params![name],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM seen_entries", [], |row| row.get(0))?,
        };

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(feed: &str, id: &str) -> Entry {
        let mut e = Entry::new(feed, id.to_string());
        e.title = format!("title-{}", id);
        e.link = format!("https://example.com/{}", id);
        e
    }

    #[test]
    fn test_unseen_by_default() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(!store.has_seen("feed1", "abc").unwrap());
    }

    #[test]
    fn test_mark_and_check() {
        let store = SqliteStore::in_memory().unwrap();
        store.mark_seen("feed1", "abc", "t", "l").unwrap();

        assert!(store.has_seen("feed1", "abc").unwrap());
        assert!(!store.has_seen("feed2", "abc").unwrap());
        assert!(!store.has_seen("feed1", "xyz").unwrap());
    }

    #[test]
    fn test_mark_seen_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        store.mark_seen("feed1", "abc", "t", "l").unwrap();
        store.mark_seen("feed1", "abc", "t", "l").unwrap();

        assert!(store.has_seen("feed1", "abc").unwrap());
        assert_eq!(store.seen_count(Some("feed1")).unwrap(), 1);
    }

    #[test]
    fn test_mark_many_seen() {
        let store = SqliteStore::in_memory().unwrap();
        let entries = vec![entry("feed1", "a"), entry("feed1", "b"), entry("feed1", "c")];

        assert_eq!(store.mark_many_seen("feed1", &entries).unwrap(), 3);
        assert!(store.has_seen("feed1", "b").unwrap());

        // Re-seeding inserts nothing new.
        assert_eq!(store.mark_many_seen("feed1", &entries).unwrap(), 0);
        assert_eq!(store.seen_count(Some("feed1")).unwrap(), 3);
    }

    #[test]
    fn test_seen_count_scoping() {
        let store = SqliteStore::in_memory().unwrap();
        store.mark_seen("feed1", "a", "", "").unwrap();
        store.mark_seen("feed1", "b", "", "").unwrap();
        store.mark_seen("feed2", "a", "", "").unwrap();

        assert_eq!(store.seen_count(Some("feed1")).unwrap(), 2);
        assert_eq!(store.seen_count(Some("feed2")).unwrap(), 1);
        assert_eq!(store.seen_count(None).unwrap(), 3);
    }

    #[test]
    fn test_initialized_flag() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(!store.is_initialized("feed1").unwrap());

        store.mark_initialized("feed1").unwrap();
        assert!(store.is_initialized("feed1").unwrap());
        assert!(!store.is_initialized("feed2").unwrap());

        // Idempotent.
        store.mark_initialized("feed1").unwrap();
        assert!(store.is_initialized("feed1").unwrap());
    }

    #[test]
    fn test_durable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("seen.db");

        {
            let store = SqliteStore::new(&db_path).unwrap();
            store.mark_seen("feed1", "abc", "t", "l").unwrap();
            store.mark_initialized("feed1").unwrap();
        }

        let reopened = SqliteStore::new(&db_path).unwrap();
        assert!(reopened.has_seen("feed1", "abc").unwrap());
        assert!(reopened.is_initialized("feed1").unwrap());
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("dir").join("seen.db");

        let store = SqliteStore::new(&db_path).unwrap();
        store.mark_seen("feed1", "abc", "t", "l").unwrap();
        assert!(db_path.exists());
    }
}

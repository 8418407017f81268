//! Local snapshot cache.
//!
//! Values are serialized snapshots stored under `report_{id}`. There is no
//! expiry: entries leave the cache only when the broker finds them invalid.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::CacheError;

const CACHE_DIR: &str = "usage-report";
const CACHE_FILE: &str = "cache.db";

pub fn cache_key(id: &str) -> String {
    format!("report_{}", id)
}

/// Key-value store consulted before the producer.
pub trait SnapshotCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn put(&mut self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove(&mut self, key: &str) -> Result<(), CacheError>;
}

impl<C: SnapshotCache + ?Sized> SnapshotCache for Box<C> {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key)
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), CacheError> {
        (**self).put(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), CacheError> {
        (**self).remove(key)
    }
}

/// Cache that lives for the current process only.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryCache {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SnapshotCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Cache persisted in a sqlite file, shared by successive invocations.
pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS report_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                stored_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    pub fn open_default() -> Result<Self, CacheError> {
        Self::open(&default_path())
    }

    /// Number of stored entries.
    pub fn count(&self) -> Result<usize, CacheError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM report_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl SnapshotCache for SqliteCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM report_cache WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT INTO report_cache (key, value, stored_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, stored_at = excluded.stored_at",
            params![key, value, now_unix_seconds()],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), CacheError> {
        self.conn
            .execute("DELETE FROM report_cache WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// `<data_dir>/usage-report/cache.db`, falling back to the working directory.
pub fn default_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CACHE_DIR)
        .join(CACHE_FILE)
}

fn now_unix_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_key("abc-123"), "report_abc-123");
    }

    #[test]
    fn test_memory_cache_put_get_remove() {
        let mut cache = MemoryCache::new();
        assert_eq!(cache.get("report_a").unwrap(), None);
        cache.put("report_a", "{}").unwrap();
        assert_eq!(cache.get("report_a").unwrap().as_deref(), Some("{}"));
        cache.remove("report_a").unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sqlite_cache_persists_across_connections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        {
            let mut cache = SqliteCache::open(&path).unwrap();
            cache.put("report_x", r#"{"id":"x"}"#).unwrap();
            cache.put("report_x", r#"{"id":"x","v":2}"#).unwrap();
            assert_eq!(cache.count().unwrap(), 1);
        }

        let mut cache = SqliteCache::open(&path).unwrap();
        assert_eq!(
            cache.get("report_x").unwrap().as_deref(),
            Some(r#"{"id":"x","v":2}"#)
        );
        cache.remove("report_x").unwrap();
        assert_eq!(cache.get("report_x").unwrap(), None);
        assert_eq!(cache.count().unwrap(), 0);
    }

    #[test]
    fn test_upsert_records_store_time() {
        let dir = TempDir::new().unwrap();
        let mut cache = SqliteCache::open(&dir.path().join("cache.db")).unwrap();
        let before = chrono::Utc::now().timestamp();
        cache.put("report_t", "{}").unwrap();
        let stored_at: i64 = cache
            .conn
            .query_row(
                "SELECT stored_at FROM report_cache WHERE key = ?1",
                params!["report_t"],
                |row| row.get(0),
            )
            .unwrap();
        assert!(stored_at >= before);
        assert!(stored_at <= chrono::Utc::now().timestamp());
    }
}

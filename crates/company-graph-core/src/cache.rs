//! Namespaced artifact cache backed by an embedded SQLite database.
//!
//! The cache stores JSON values keyed by `(namespace, key)` with optional
//! per-entry TTLs. SQLite serializes writes; a generous busy timeout keeps
//! many concurrent workers from tripping over the write lock.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::AppResult;

/// Lock timeout for the serialized SQLite writer. Needs to be high for
/// high-concurrency runs (16 workers all writing extraction results).
const BUSY_TIMEOUT_SECS: u64 = 30;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    namespace  TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT NOT NULL,
    expires_at INTEGER,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (namespace, key)
);
CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries (expires_at);
";

/// Cache statistics snapshot.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total: i64,
    pub by_namespace: BTreeMap<String, i64>,
    pub size_bytes: u64,
    pub cache_dir: PathBuf,
}

/// Unified cache for pipeline artifacts (domains, properties, extracted
/// filings, embeddings). Safe for concurrent use from many workers.
pub struct AppCache {
    conn: Mutex<Connection>,
    cache_dir: PathBuf,
}

impl AppCache {
    /// Open (or create) the cache under `cache_dir`.
    pub fn open(cache_dir: &Path) -> AppResult<Self> {
        std::fs::create_dir_all(cache_dir)?;
        let db_path = cache_dir.join("cache.db");
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(BUSY_TIMEOUT_SECS))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    /// Get a value from the cache. Expired entries read as a miss.
    pub fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> AppResult<Option<T>> {
        let conn = self.lock();
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((value, expires_at)) = row else {
            return Ok(None);
        };

        if let Some(expires_at) = expires_at {
            if expires_at <= now_unix() {
                debug!(namespace, key, "cache entry expired, purging");
                conn.execute(
                    "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                    params![namespace, key],
                )?;
                return Ok(None);
            }
        }

        Ok(Some(serde_json::from_str(&value)?))
    }

    /// Set a value with an optional TTL in days.
    pub fn set<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl_days: Option<u32>,
    ) -> AppResult<()> {
        let serialized = serde_json::to_string(value)?;
        let now = now_unix();
        let expires_at = ttl_days.map(|days| now + i64::from(days) * 86_400);
        let conn = self.lock();
        conn.execute(
            "INSERT INTO cache_entries (namespace, key, value, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (namespace, key)
             DO UPDATE SET value = ?3, expires_at = ?4, created_at = ?5",
            params![namespace, key, serialized, expires_at, now],
        )?;
        Ok(())
    }

    /// Delete one entry. Returns true if an entry was removed.
    pub fn delete(&self, namespace: &str, key: &str) -> AppResult<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;
        Ok(changed > 0)
    }

    /// Remove every entry in a namespace. Returns the number deleted.
    pub fn clear_namespace(&self, namespace: &str) -> AppResult<usize> {
        let conn = self.lock();
        let changed = conn.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1",
            params![namespace],
        )?;
        Ok(changed)
    }

    /// Count entries, optionally restricted to one namespace.
    pub fn count(&self, namespace: Option<&str>) -> AppResult<i64> {
        let conn = self.lock();
        let count = match namespace {
            Some(ns) => conn.query_row(
                "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1",
                params![ns],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    /// List keys, optionally restricted to one namespace.
    pub fn keys(&self, namespace: Option<&str>, limit: usize) -> AppResult<Vec<String>> {
        let conn = self.lock();
        let mut keys = Vec::new();
        match namespace {
            Some(ns) => {
                let mut stmt = conn.prepare(
                    "SELECT key FROM cache_entries WHERE namespace = ?1 ORDER BY key LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![ns, limit as i64], |row| row.get(0))?;
                for key in rows {
                    keys.push(key?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT namespace || ':' || key FROM cache_entries ORDER BY 1 LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit as i64], |row| row.get(0))?;
                for key in rows {
                    keys.push(key?);
                }
            }
        }
        Ok(keys)
    }

    /// Per-namespace counts plus on-disk size.
    pub fn stats(&self) -> AppResult<CacheStats> {
        let conn = self.lock();
        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;

        let mut by_namespace = BTreeMap::new();
        let mut stmt =
            conn.prepare("SELECT namespace, COUNT(*) FROM cache_entries GROUP BY namespace")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (ns, count) = row?;
            by_namespace.insert(ns, count);
        }

        let db_path = self.cache_dir.join("cache.db");
        let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

        Ok(CacheStats {
            total,
            by_namespace,
            size_bytes,
            cache_dir: self.cache_dir.clone(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Convenience for callers that treat cache failures as soft errors.
pub fn cache_get_or_none<T: DeserializeOwned>(
    cache: &AppCache,
    namespace: &str,
    key: &str,
) -> Option<T> {
    match cache.get(namespace, key) {
        Ok(value) => value,
        Err(e) => {
            debug!(namespace, key, error = %e, "cache read failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        domain: Option<String>,
        confidence: f64,
    }

    fn temp_cache() -> (tempfile::TempDir, AppCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = AppCache::open(dir.path()).unwrap();
        (dir, cache)
    }

    #[test]
    fn round_trips_json_values() {
        let (_dir, cache) = temp_cache();
        let payload = Payload {
            domain: Some("apple.com".to_string()),
            confidence: 0.9,
        };
        cache.set("company_domains", "0000320193", &payload, Some(30)).unwrap();
        let restored: Option<Payload> = cache.get("company_domains", "0000320193").unwrap();
        assert_eq!(restored, Some(payload));
    }

    #[test]
    fn missing_keys_are_none() {
        let (_dir, cache) = temp_cache();
        let missing: Option<Payload> = cache.get("company_domains", "nope").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn namespaces_are_isolated() {
        let (_dir, cache) = temp_cache();
        cache.set("ns_a", "k", &1u32, None).unwrap();
        cache.set("ns_b", "k", &2u32, None).unwrap();
        assert_eq!(cache.get::<u32>("ns_a", "k").unwrap(), Some(1));
        assert_eq!(cache.get::<u32>("ns_b", "k").unwrap(), Some(2));
        assert_eq!(cache.clear_namespace("ns_a").unwrap(), 1);
        assert_eq!(cache.get::<u32>("ns_a", "k").unwrap(), None);
        assert_eq!(cache.get::<u32>("ns_b", "k").unwrap(), Some(2));
    }

    #[test]
    fn counts_and_keys_filter_by_namespace() {
        let (_dir, cache) = temp_cache();
        for i in 0..5 {
            cache.set("ns_a", &format!("k{i}"), &i, None).unwrap();
        }
        cache.set("ns_b", "other", &9u32, None).unwrap();
        assert_eq!(cache.count(Some("ns_a")).unwrap(), 5);
        assert_eq!(cache.count(None).unwrap(), 6);
        let keys = cache.keys(Some("ns_a"), 3).unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.iter().all(|k| k.starts_with('k')));
    }

    #[test]
    fn expired_entries_read_as_miss() {
        let (_dir, cache) = temp_cache();
        cache.set("ns", "k", &1u32, Some(1)).unwrap();
        // Force expiry by rewriting expires_at into the past.
        {
            let conn = cache.conn.lock().unwrap();
            conn.execute(
                "UPDATE cache_entries SET expires_at = ?1 WHERE namespace = 'ns' AND key = 'k'",
                params![now_unix() - 10],
            )
            .unwrap();
        }
        assert_eq!(cache.get::<u32>("ns", "k").unwrap(), None);
        // The expired row was purged, not just skipped.
        assert_eq!(cache.count(Some("ns")).unwrap(), 0);
    }

    #[test]
    fn stats_reports_namespaces() {
        let (_dir, cache) = temp_cache();
        cache.set("company_domains", "a", &1u32, None).unwrap();
        cache.set("company_domains", "b", &2u32, None).unwrap();
        cache.set("embeddings", "c", &3u32, None).unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_namespace.get("company_domains"), Some(&2));
        assert_eq!(stats.by_namespace.get("embeddings"), Some(&1));
    }

    #[test]
    fn concurrent_writers_do_not_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let cache = std::sync::Arc::new(AppCache::open(dir.path()).unwrap());
        let mut handles = Vec::new();
        for t in 0..8 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    cache
                        .set("stress", &format!("{t}_{i}"), &(t * 100 + i), None)
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.count(Some("stress")).unwrap(), 200);
    }
}

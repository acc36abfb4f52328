//! Integration Tests for the Persistent Cache
//!
//! Exercises the public API against on-disk databases, including eviction,
//! prefix retrieval, fail-open behavior, and connection self-healing.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use query_cache::cache::{Connector, FileConnector, GzipCompressor};
use query_cache::{CacheEntry, CacheError, CacheStore, CompoundKey, Config};
use rusqlite::{Connection, OpenFlags};
use serde_json::json;
use tempfile::TempDir;

// == Helper Functions ==

fn test_config(dir: &TempDir) -> Config {
    Config {
        db_path: dir.path().join("cache.sqlite3"),
        ..Config::default()
    }
}

fn create_test_cache(dir: &TempDir) -> CacheStore {
    CacheStore::new(&test_config(dir)).unwrap()
}

fn key(value: serde_json::Value) -> CompoundKey {
    CompoundKey::from(value)
}

fn entry_at(key: &CompoundKey, accessed_at: u64) -> CacheEntry {
    let mut entry = CacheEntry::new(key, format!("payload-{}", accessed_at).into_bytes(), 16);
    entry.accessed_at = accessed_at;
    entry
}

fn set_user_version(path: &Path, version: u32) {
    let conn = Connection::open(path).unwrap();
    conn.pragma_update(None, "user_version", version).unwrap();
}

/// A connector whose database is never reachable.
struct UnavailableConnector;

impl Connector for UnavailableConnector {
    fn connect(&self) -> query_cache::Result<Connection> {
        Err(CacheError::Internal("storage unavailable".to_string()))
    }
}

/// Opens a database file with explicit open flags.
struct FlagsConnector {
    path: PathBuf,
    flags: OpenFlags,
}

impl FlagsConnector {
    fn read_write(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            flags: OpenFlags::default(),
        }
    }

    fn read_only(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            flags: OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        }
    }
}

impl Connector for FlagsConnector {
    fn connect(&self) -> query_cache::Result<Connection> {
        Ok(Connection::open_with_flags(&self.path, self.flags)?)
    }
}

fn cache_over(connector: FlagsConnector) -> CacheStore {
    CacheStore::with_parts(
        &Config::default(),
        Arc::new(connector),
        Arc::new(GzipCompressor::default()),
    )
    .unwrap()
}

// == Round Trip ==

#[tokio::test]
async fn test_set_then_get_roundtrip() {
    let dir = TempDir::new().unwrap();
    let cache = create_test_cache(&dir);
    let k = key(json!(["docs", 1]));
    let entry = CacheEntry::new(&k, b"compressed".to_vec(), 1024);

    assert!(cache.set(&entry).await);
    let loaded = cache.get(&k).await.unwrap();

    assert_eq!(loaded.payload, entry.payload);
    assert_eq!(loaded.updated_at, entry.updated_at);
    assert_eq!(loaded.logical_size, entry.logical_size);
    assert!(loaded.accessed_at >= entry.accessed_at);
}

#[tokio::test]
async fn test_entries_survive_new_store_instance() {
    let dir = TempDir::new().unwrap();
    let k = key(json!(["docs", { "folder": 3, "archived": false }]));

    {
        let cache = create_test_cache(&dir);
        assert!(cache.put_value(&k, &vec!["a", "b", "c"]).await);
    }

    let reopened = create_test_cache(&dir);
    let value: Option<Vec<String>> = reopened.get_value(&k).await;
    assert_eq!(value, Some(vec!["a".to_string(), "b".to_string(), "c".to_string()]));
}

#[tokio::test]
async fn test_lru_touch_is_monotonic() {
    let dir = TempDir::new().unwrap();
    let cache = create_test_cache(&dir);
    let k = key(json!(["docs", 1]));
    cache.set(&entry_at(&k, 1)).await;

    cache.get(&k).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let first = cache.get(&k).await.unwrap().accessed_at;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let second = cache.get(&k).await.unwrap().accessed_at;

    assert!(first > 1, "first read should have been touched");
    assert!(second >= first);
}

#[tokio::test]
async fn test_delete_absent_key_is_noop() {
    let dir = TempDir::new().unwrap();
    let cache = create_test_cache(&dir);

    assert!(!cache.delete(&key(json!(["never", "stored"]))).await);
    assert!(cache.get_all().await.is_empty());
}

// == Eviction ==

#[tokio::test]
async fn test_eviction_scenario() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        max_entries: 10,
        cleanup_threshold: 0.9,
        cleanup_target: 0.7,
        ..test_config(&dir)
    };
    let cache = CacheStore::new(&config).unwrap();

    for i in 0..9u64 {
        cache.set(&entry_at(&key(json!(["docs", i])), 1_000 + i)).await;
    }
    assert_eq!(cache.run_eviction().await, 0);
    assert_eq!(cache.stats().await.entry_count, 9);

    cache.set(&entry_at(&key(json!(["docs", 9])), 1_009)).await;
    assert_eq!(cache.run_eviction().await, 3);

    let mut remaining: Vec<u64> = cache.get_all().await.iter().map(|e| e.accessed_at).collect();
    remaining.sort();
    assert_eq!(remaining, (1_003..1_010).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_get_oldest_returns_least_recent_first() {
    let dir = TempDir::new().unwrap();
    let cache = create_test_cache(&dir);
    for (i, t) in [40u64, 10, 30, 20].iter().enumerate() {
        cache.set(&entry_at(&key(json!(["docs", i])), *t)).await;
    }

    let oldest: Vec<u64> = cache.get_oldest(2).await.iter().map(|e| e.accessed_at).collect();
    assert_eq!(oldest, vec![10, 20]);
}

// == Prefix Retrieval ==

#[tokio::test]
async fn test_prefix_scenario() {
    let dir = TempDir::new().unwrap();
    let cache = create_test_cache(&dir);
    for k in [json!(["docs", 1]), json!(["docs", 2]), json!(["folders", 1])] {
        cache.set(&CacheEntry::new(&key(k), Vec::new(), 1)).await;
    }

    let docs = cache.get_by_prefixes(&["docs"]).await;
    let mut hashes: Vec<String> = docs.iter().map(|e| e.key_hash.clone()).collect();
    hashes.sort();
    let mut expected = vec![key(json!(["docs", 1])).hash(), key(json!(["docs", 2])).hash()];
    expected.sort();

    assert_eq!(hashes, expected);
}

// == Statistics ==

#[tokio::test]
async fn test_stats_on_cleared_store() {
    let dir = TempDir::new().unwrap();
    let cache = create_test_cache(&dir);
    cache.set(&entry_at(&key(json!(["docs", 1])), 5)).await;
    assert_eq!(cache.stats().await.entry_count, 1);

    assert!(cache.clear().await);
    let stats = cache.stats().await;

    assert_eq!(stats.entry_count, 0);
    assert_eq!(stats.total_size, 0);
    assert!(stats.oldest_accessed_at.is_none());
    assert!(stats.newest_accessed_at.is_none());
}

// == Fail-Open Behavior ==

#[tokio::test]
async fn test_unavailable_store_fails_open() {
    let cache = CacheStore::with_parts(
        &Config::default(),
        Arc::new(UnavailableConnector),
        Arc::new(GzipCompressor::default()),
    )
    .unwrap();
    let k = key(json!(["docs", 1]));

    assert!(cache.get(&k).await.is_none());
    assert!(!cache.set(&CacheEntry::new(&k, Vec::new(), 1)).await);
    assert!(!cache.delete(&k).await);
    assert_eq!(cache.delete_many(&[k.hash()]).await, 0);
    assert!(cache.get_all().await.is_empty());
    assert!(cache.get_by_prefixes(&["docs"]).await.is_empty());
    assert!(cache.get_oldest(5).await.is_empty());
    assert!(!cache.clear().await);
    assert_eq!(cache.stats().await.entry_count, 0);
    assert_eq!(cache.run_eviction().await, 0);
    assert!(!cache.put_value(&k, &42).await);
    assert_eq!(cache.get_value::<i32>(&k).await, None);
    assert!(cache.hydrate::<i32, _>(&["docs"]).await.is_empty());
    assert_eq!(cache.open_count(), 0);
}

#[tokio::test]
async fn test_corrupt_database_fails_open_then_recovers() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    std::fs::write(&config.db_path, vec![b'x'; 4096]).unwrap();

    let cache = CacheStore::new(&config).unwrap();
    let k = key(json!(["docs", 1]));

    assert!(!cache.set(&CacheEntry::new(&k, Vec::new(), 1)).await);
    assert!(cache.get(&k).await.is_none());
    assert_eq!(cache.stats().await.entry_count, 0);

    // Replace the broken file; the next call opens a healthy database
    std::fs::remove_file(&config.db_path).unwrap();
    assert!(cache.set(&CacheEntry::new(&k, Vec::new(), 1)).await);
    assert!(cache.get(&k).await.is_some());
}

#[tokio::test]
async fn test_failed_touch_does_not_affect_reads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("readonly.sqlite3");
    let k = key(json!(["docs", 1]));

    {
        let writer = cache_over(FlagsConnector::read_write(&path));
        assert!(writer.set(&entry_at(&k, 5)).await);
    }

    let reader = cache_over(FlagsConnector::read_only(&path));
    let first = reader.get(&k).await.map(|e| e.accessed_at);

    // Give the detached touch time to run and fail
    tokio::time::sleep(Duration::from_millis(200)).await;
    let again = reader.get(&k).await.map(|e| e.accessed_at);

    assert_eq!(first, Some(5));
    assert_eq!(again, Some(5));
    assert!(!reader.set(&entry_at(&k, 9)).await);

    // Rejected writes are statement-level: the handle is kept
    assert!(reader.get(&k).await.is_some());
    assert_eq!(reader.open_count(), 1);
}

// == Connection Self-Healing ==

#[tokio::test]
async fn test_external_schema_upgrade_is_survived() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let cache = CacheStore::new(&config).unwrap();
    let k = key(json!(["docs", 1]));

    assert!(cache.set(&CacheEntry::new(&k, b"v".to_vec(), 1)).await);
    assert_eq!(cache.open_count(), 1);

    // Another process moves the schema past ours: reads become misses
    set_user_version(&config.db_path, 2);
    assert!(cache.get(&k).await.is_none());

    // Once the version matches again the handle is reopened transparently
    set_user_version(&config.db_path, 1);
    assert!(cache.get(&k).await.is_some());
    assert_eq!(cache.open_count(), 2);
}

#[tokio::test]
async fn test_clones_share_one_connection() {
    let dir = TempDir::new().unwrap();
    let cache = create_test_cache(&dir);
    let other = cache.clone();
    let k = key(json!(["docs", 1]));

    cache.set(&CacheEntry::new(&k, Vec::new(), 1)).await;
    assert!(other.get(&k).await.is_some());
    assert_eq!(other.open_count(), 1);

    other.invalidate_connection().await;
    assert!(cache.get(&k).await.is_some());
    assert_eq!(cache.open_count(), 2);
}

#[tokio::test]
async fn test_file_connector_path() {
    let dir = TempDir::new().unwrap();
    let connector = FileConnector::new(dir.path().join("other.sqlite3"));
    let conn = connector.connect().unwrap();

    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

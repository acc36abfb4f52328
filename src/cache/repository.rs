//! Entry Repository Module
//!
//! CRUD over persisted cache entries. Every public method fails open: storage
//! errors are logged and reported as a miss, an empty list, or zero.

use std::collections::HashSet;

use rusqlite::{params, Connection, Row};
use tracing::{debug, warn};

use crate::cache::{current_timestamp_ms, hash_canonical, CacheEntry, CompoundKey, StoreAdapter};
use crate::error::Result;

const COLUMNS: &str = "key_hash, key_canonical, payload, updated_at, accessed_at, logical_size";

// == Entry Repository ==
/// Reads and writes cache entries through a [`StoreAdapter`].
#[derive(Debug, Clone)]
pub struct EntryRepository {
    adapter: StoreAdapter,
    verify_canonical: bool,
}

impl EntryRepository {
    // == Constructor ==
    pub fn new(adapter: StoreAdapter) -> Self {
        Self {
            adapter,
            verify_canonical: false,
        }
    }

    /// When enabled, a hash hit whose stored canonical key differs from the
    /// requested key is reported as a miss instead of returning the other
    /// key's value.
    pub fn with_canonical_verification(mut self, enabled: bool) -> Self {
        self.verify_canonical = enabled;
        self
    }

    pub fn adapter(&self) -> &StoreAdapter {
        &self.adapter
    }

    // == Get ==
    /// Looks up the entry for `key`.
    ///
    /// A hit schedules a detached write moving `accessed_at` forward to now;
    /// the returned entry carries the values as they were read.
    pub async fn get(&self, key: &CompoundKey) -> Option<CacheEntry> {
        let canonical = key.canonical();
        let key_hash = hash_canonical(&canonical);

        let lookup = key_hash.clone();
        let result = self
            .adapter
            .run(move |conn, table| fetch_one(conn, table, &lookup))
            .await;

        let entry = match result {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) => {
                warn!("Cache read for {} failed: {}", key_hash, err);
                return None;
            }
        };

        if self.verify_canonical && entry.key_canonical != canonical {
            debug!(
                "Hash {} is held by a different key ({}), treating as miss",
                key_hash, entry.key_canonical
            );
            return None;
        }

        self.touch_detached(key_hash);
        Some(entry)
    }

    // == Touch ==
    /// Moves `accessed_at` forward without blocking the caller.
    ///
    /// The update never lowers an existing timestamp. Failures are dropped.
    fn touch_detached(&self, key_hash: String) {
        let adapter = self.adapter.clone();
        let now = to_sql_int(current_timestamp_ms());

        tokio::spawn(async move {
            let target = key_hash.clone();
            let result = adapter
                .run(move |conn, table| {
                    conn.execute(
                        &format!(
                            "UPDATE {table} SET accessed_at = MAX(accessed_at, ?1) WHERE key_hash = ?2"
                        ),
                        params![now, target],
                    )?;
                    Ok(())
                })
                .await;

            if let Err(err) = result {
                debug!("LRU touch for {} failed: {}", key_hash, err);
            }
        });
    }

    // == Set ==
    /// Upserts `entry` by its hash; the last write wins.
    ///
    /// Returns whether the write reached storage.
    pub async fn set(&self, entry: &CacheEntry) -> bool {
        let entry = entry.clone();
        let key_hash = entry.key_hash.clone();

        let result = self
            .adapter
            .run(move |conn, table| {
                conn.execute(
                    &format!("INSERT OR REPLACE INTO {table} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                    params![
                        entry.key_hash,
                        entry.key_canonical,
                        entry.payload,
                        to_sql_int(entry.updated_at),
                        to_sql_int(entry.accessed_at),
                        to_sql_int(entry.logical_size),
                    ],
                )?;
                Ok(())
            })
            .await;

        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("Cache write for {} failed: {}", key_hash, err);
                false
            }
        }
    }

    // == Delete ==
    /// Removes the entry for `key`. Absent keys are a no-op.
    ///
    /// Returns whether an entry was removed.
    pub async fn delete(&self, key: &CompoundKey) -> bool {
        self.delete_many(&[key.hash()]).await > 0
    }

    // == Delete Many ==
    /// Removes a batch of entries in a single transaction.
    ///
    /// A failure rolls the whole batch back. Returns the number removed.
    pub async fn delete_many(&self, key_hashes: &[String]) -> usize {
        if key_hashes.is_empty() {
            return 0;
        }

        let hashes = key_hashes.to_vec();
        let requested = hashes.len();
        let result = self
            .adapter
            .run(move |conn, table| {
                let tx = conn.transaction()?;
                let mut removed = 0;
                {
                    let mut stmt = tx.prepare(&format!("DELETE FROM {table} WHERE key_hash = ?1"))?;
                    for hash in &hashes {
                        removed += stmt.execute([hash])?;
                    }
                }
                tx.commit()?;
                Ok(removed)
            })
            .await;

        match result {
            Ok(removed) => removed,
            Err(err) => {
                warn!("Cache delete of {} entries failed: {}", requested, err);
                0
            }
        }
    }

    // == Get All ==
    /// Returns every entry. Intended for diagnostics and statistics.
    pub async fn get_all(&self) -> Vec<CacheEntry> {
        match self.try_get_all().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Cache scan failed: {}", err);
                Vec::new()
            }
        }
    }

    async fn try_get_all(&self) -> Result<Vec<CacheEntry>> {
        self.adapter
            .run(|conn, table| {
                let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM {table}"))?;
                let entries = stmt
                    .query_map([], entry_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(entries)
            })
            .await
    }

    // == Get By Prefixes ==
    /// Returns entries whose compound key prefix is one of `prefixes`.
    ///
    /// Entries with an unparseable canonical key are skipped.
    pub async fn get_by_prefixes<S: AsRef<str>>(&self, prefixes: &[S]) -> Vec<CacheEntry> {
        let wanted: HashSet<&str> = prefixes.iter().map(AsRef::as_ref).collect();
        if wanted.is_empty() {
            return Vec::new();
        }

        let entries = match self.try_get_all().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Cache prefix scan failed: {}", err);
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .filter(|entry| match entry.compound_key() {
                Ok(key) => wanted.contains(key.prefix().as_str()),
                Err(err) => {
                    debug!(
                        "Skipping entry {} with malformed key: {}",
                        entry.key_hash, err
                    );
                    false
                }
            })
            .collect()
    }

    // == Get Oldest ==
    /// Returns up to `limit` entries, least recently accessed first.
    ///
    /// Walks the `accessed_at` index and stops after `limit` rows.
    pub async fn get_oldest(&self, limit: usize) -> Vec<CacheEntry> {
        if limit == 0 {
            return Vec::new();
        }

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let result = self
            .adapter
            .run(move |conn, table| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM {table} ORDER BY accessed_at ASC LIMIT ?1"
                ))?;
                let entries = stmt
                    .query_map([limit], entry_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(entries)
            })
            .await;

        match result {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Cache oldest-entry scan failed: {}", err);
                Vec::new()
            }
        }
    }

    // == Clear ==
    /// Removes all entries. Returns whether storage accepted the operation.
    pub async fn clear(&self) -> bool {
        let result = self
            .adapter
            .run(|conn, table| {
                conn.execute(&format!("DELETE FROM {table}"), [])?;
                Ok(())
            })
            .await;

        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("Cache clear failed: {}", err);
                false
            }
        }
    }
}

fn fetch_one(conn: &Connection, table: &str, key_hash: &str) -> Result<Option<CacheEntry>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM {table} WHERE key_hash = ?1"))?;
    let mut rows = stmt.query_map([key_hash], entry_from_row)?;
    Ok(rows.next().transpose()?)
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        key_hash: row.get(0)?,
        key_canonical: row.get(1)?,
        payload: row.get(2)?,
        updated_at: from_sql_int(row.get(3)?),
        accessed_at: from_sql_int(row.get(4)?),
        logical_size: from_sql_int(row.get(5)?),
    })
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

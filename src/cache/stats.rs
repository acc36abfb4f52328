//! Cache Statistics Module
//!
//! Aggregates entry count, logical size, and access-time range over a scan.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{timestamp_to_utc, CacheEntry, EntryRepository};

// == Cache Stats ==
/// Point-in-time summary of the persisted entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of stored entries
    pub entry_count: usize,
    /// Sum of the entries' uncompressed sizes, in bytes
    pub total_size: u64,
    /// Smallest `accessed_at`, absent when the store is empty
    pub oldest_accessed_at: Option<u64>,
    /// Largest `accessed_at`, absent when the store is empty
    pub newest_accessed_at: Option<u64>,
}

impl CacheStats {
    // == Constructor ==
    /// Creates stats for an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // == From Entries ==
    /// Folds a full scan into stats.
    pub fn from_entries(entries: &[CacheEntry]) -> Self {
        entries.iter().fold(Self::new(), |mut stats, entry| {
            stats.record(entry);
            stats
        })
    }

    // == Collect ==
    /// Scans the repository and folds every entry.
    ///
    /// A failed scan yields empty stats.
    pub async fn collect(repo: &EntryRepository) -> Self {
        Self::from_entries(&repo.get_all().await)
    }

    // == Record ==
    /// Adds one entry to the running totals.
    pub fn record(&mut self, entry: &CacheEntry) {
        self.entry_count += 1;
        self.total_size = self.total_size.saturating_add(entry.logical_size);
        self.oldest_accessed_at = Some(
            self.oldest_accessed_at
                .map_or(entry.accessed_at, |t| t.min(entry.accessed_at)),
        );
        self.newest_accessed_at = Some(
            self.newest_accessed_at
                .map_or(entry.accessed_at, |t| t.max(entry.accessed_at)),
        );
    }

    /// Returns true when no entries were counted.
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn oldest_accessed_utc(&self) -> Option<DateTime<Utc>> {
        self.oldest_accessed_at.and_then(timestamp_to_utc)
    }

    pub fn newest_accessed_utc(&self) -> Option<DateTime<Utc>> {
        self.newest_accessed_at.and_then(timestamp_to_utc)
    }
}

//! Eviction Policy Module
//!
//! Keeps the persisted store within its count and size bounds by removing the
//! least recently accessed entries once a bound is crossed.

use tracing::{debug, info};

use crate::cache::{CacheEntry, CacheStats, EntryRepository};
use crate::config::Config;

// == Eviction Policy ==
/// Bounds and hysteresis fractions driving an eviction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionPolicy {
    /// Maximum number of entries
    pub max_entries: usize,
    /// Maximum total logical size in bytes
    pub max_size_bytes: u64,
    /// Fraction of the maxima that must be exceeded before a pass removes anything
    pub cleanup_threshold: f64,
    /// Fraction of `max_entries` a pass shrinks the store back to
    pub cleanup_target: f64,
    /// Remove oldest entries by size when the count-driven step removes nothing
    pub evict_by_size: bool,
}

impl EvictionPolicy {
    // == Constructor ==
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_entries: config.max_entries,
            max_size_bytes: config.max_size_bytes,
            cleanup_threshold: config.cleanup_threshold,
            cleanup_target: config.cleanup_target,
            evict_by_size: config.evict_by_size,
        }
    }

    // == Should Evict ==
    /// Returns true once either bound is strictly above its threshold.
    ///
    /// Staying at or below both thresholds is a no-op, so a store hovering
    /// just under the ceiling is not trimmed on every pass.
    pub fn should_evict(&self, stats: &CacheStats) -> bool {
        let count_limit = self.max_entries as f64 * self.cleanup_threshold;
        let size_limit = self.max_size_bytes as f64 * self.cleanup_threshold;

        stats.entry_count as f64 > count_limit || stats.total_size as f64 > size_limit
    }

    // == Target Entries ==
    /// Entry count a pass shrinks the store back to.
    pub fn target_entries(&self) -> usize {
        (self.max_entries as f64 * self.cleanup_target).floor() as usize
    }

    // == Entries To Remove ==
    /// Number of oldest entries the count-driven step removes.
    ///
    /// Zero when no bound is crossed, and also when only the size bound is
    /// crossed while the count is already at or below the target.
    pub fn entries_to_remove(&self, stats: &CacheStats) -> usize {
        if !self.should_evict(stats) {
            return 0;
        }
        stats.entry_count.saturating_sub(self.target_entries())
    }

    // == Bytes To Free ==
    /// Bytes the size-driven step must free to reach the size target.
    pub fn bytes_to_free(&self, stats: &CacheStats) -> u64 {
        let size_target = (self.max_size_bytes as f64 * self.cleanup_target).floor() as u64;
        stats.total_size.saturating_sub(size_target)
    }

    // == Run ==
    /// Runs one eviction pass and returns the number of entries removed.
    ///
    /// # Algorithm
    /// 1. Collect stats over every entry
    /// 2. Stop if both bounds are at or below their thresholds
    /// 3. Remove the `entry_count - floor(max_entries * cleanup_target)` oldest
    ///    entries in one batch
    /// 4. With `evict_by_size`, if step 3 had nothing to remove, remove oldest
    ///    entries until the size target is met instead
    pub async fn run(&self, repo: &EntryRepository) -> usize {
        let stats = CacheStats::collect(repo).await;

        if !self.should_evict(&stats) {
            debug!(
                "Eviction skipped: {} entries, {} bytes within thresholds",
                stats.entry_count, stats.total_size
            );
            return 0;
        }

        let to_remove = self.entries_to_remove(&stats);
        let victims: Vec<String> = if to_remove > 0 {
            repo.get_oldest(to_remove)
                .await
                .into_iter()
                .map(|entry| entry.key_hash)
                .collect()
        } else if self.evict_by_size {
            let oldest = repo.get_oldest(stats.entry_count).await;
            select_size_victims(&oldest, self.bytes_to_free(&stats))
        } else {
            debug!(
                "Eviction skipped: size over threshold but {} entries already at or below target {}",
                stats.entry_count,
                self.target_entries()
            );
            return 0;
        };

        if victims.is_empty() {
            return 0;
        }

        let removed = repo.delete_many(&victims).await;
        info!(
            "Eviction removed {} of {} entries ({} bytes before pass)",
            removed, stats.entry_count, stats.total_size
        );
        removed
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Picks hashes from oldest-first entries until `bytes_to_free` is covered.
fn select_size_victims(oldest_first: &[CacheEntry], bytes_to_free: u64) -> Vec<String> {
    let mut freed = 0u64;
    oldest_first
        .iter()
        .take_while(|entry| {
            if freed >= bytes_to_free {
                return false;
            }
            freed = freed.saturating_add(entry.logical_size);
            true
        })
        .map(|entry| entry.key_hash.clone())
        .collect()
}

//! Configuration Module
//!
//! Handles loading and validating cache configuration from environment variables.

use std::env;
use std::path::PathBuf;

use crate::error::{CacheError, Result};

/// Query cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the SQLite database file
    pub db_path: PathBuf,
    /// Name of the table holding cache entries
    pub store_name: String,
    /// Schema version recorded in the database
    pub schema_version: u32,
    /// Maximum number of entries before eviction kicks in
    pub max_entries: usize,
    /// Maximum total logical (uncompressed) size in bytes
    pub max_size_bytes: u64,
    /// Fraction of the maxima at which an eviction pass starts removing entries
    pub cleanup_threshold: f64,
    /// Fraction of `max_entries` an eviction pass shrinks the store back to
    pub cleanup_target: f64,
    /// Interval in seconds between background eviction passes
    pub eviction_interval: u64,
    /// Treat a hash hit with a different canonical key as a miss
    pub verify_canonical_key: bool,
    /// Evict by size when count-driven eviction removes nothing
    pub evict_by_size: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DB_PATH` - Database file (default: query-cache.sqlite3)
    /// - `CACHE_STORE_NAME` - Table name (default: query_cache)
    /// - `CACHE_SCHEMA_VERSION` - Schema version (default: 1)
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `MAX_SIZE_BYTES` - Maximum logical size (default: 50 MiB)
    /// - `CLEANUP_THRESHOLD` - Eviction trigger fraction (default: 0.9)
    /// - `CLEANUP_TARGET` - Eviction target fraction (default: 0.7)
    /// - `EVICTION_INTERVAL` - Eviction frequency in seconds (default: 60)
    /// - `VERIFY_CANONICAL_KEY` - Reject hash collisions on read (default: false)
    /// - `EVICT_BY_SIZE` - Enable size-driven eviction (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            db_path: env::var("CACHE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            store_name: env::var("CACHE_STORE_NAME").unwrap_or(defaults.store_name),
            schema_version: parse_var("CACHE_SCHEMA_VERSION").unwrap_or(defaults.schema_version),
            max_entries: parse_var("MAX_ENTRIES").unwrap_or(defaults.max_entries),
            max_size_bytes: parse_var("MAX_SIZE_BYTES").unwrap_or(defaults.max_size_bytes),
            cleanup_threshold: parse_var("CLEANUP_THRESHOLD")
                .unwrap_or(defaults.cleanup_threshold),
            cleanup_target: parse_var("CLEANUP_TARGET").unwrap_or(defaults.cleanup_target),
            eviction_interval: parse_var("EVICTION_INTERVAL")
                .unwrap_or(defaults.eviction_interval),
            verify_canonical_key: parse_var("VERIFY_CANONICAL_KEY")
                .unwrap_or(defaults.verify_canonical_key),
            evict_by_size: parse_var("EVICT_BY_SIZE").unwrap_or(defaults.evict_by_size),
        }
    }

    // == Validate ==
    /// Checks that the configuration can be used to build a cache.
    ///
    /// The store name is interpolated into SQL, so it must be a plain identifier.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.store_name) {
            return Err(CacheError::InvalidConfig(format!(
                "store name '{}' must start with a letter or '_' and contain only alphanumerics or '_'",
                self.store_name
            )));
        }

        for (name, value) in [
            ("cleanup_threshold", self.cleanup_threshold),
            ("cleanup_target", self.cleanup_target),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(CacheError::InvalidConfig(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.cleanup_target > self.cleanup_threshold {
            return Err(CacheError::InvalidConfig(format!(
                "cleanup_target {} exceeds cleanup_threshold {}",
                self.cleanup_target, self.cleanup_threshold
            )));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("query-cache.sqlite3"),
            store_name: "query_cache".to_string(),
            schema_version: 1,
            max_entries: 1000,
            max_size_bytes: 50 * 1024 * 1024,
            cleanup_threshold: 0.9,
            cleanup_target: 0.7,
            eviction_interval: 60,
            verify_canonical_key: false,
            evict_by_size: false,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Returns true for names usable as an unquoted SQLite identifier.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

//! Cache Entry Module
//!
//! Defines the persisted row for one cached query result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CompoundKey;

// == Cache Entry ==
/// A single cached query result with its LRU and capacity metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Primary key, digest of `key_canonical`
    pub key_hash: String,
    /// Canonical serialization of the compound key
    pub key_canonical: String,
    /// Compressed serialized value
    pub payload: Vec<u8>,
    /// When the value was produced (Unix milliseconds)
    pub updated_at: u64,
    /// When the entry was last read (Unix milliseconds)
    pub accessed_at: u64,
    /// Size of the value before compression, in bytes
    pub logical_size: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry for `key`, stamped with the current time.
    ///
    /// # Arguments
    /// * `key` - The compound key identifying the query
    /// * `payload` - The already-compressed value
    /// * `logical_size` - Size of the value before compression
    pub fn new(key: &CompoundKey, payload: Vec<u8>, logical_size: u64) -> Self {
        let now = current_timestamp_ms();
        let key_canonical = key.canonical();

        Self {
            key_hash: crate::cache::hash_canonical(&key_canonical),
            key_canonical,
            payload,
            updated_at: now,
            accessed_at: now,
            logical_size,
        }
    }

    // == Compound Key ==
    /// Parses the stored canonical key back into a compound key.
    pub fn compound_key(&self) -> crate::error::Result<CompoundKey> {
        CompoundKey::parse_canonical(&self.key_canonical)
    }

    /// Returns `updated_at` as a UTC datetime.
    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        timestamp_to_utc(self.updated_at)
    }

    /// Returns `accessed_at` as a UTC datetime.
    pub fn accessed_at_utc(&self) -> Option<DateTime<Utc>> {
        timestamp_to_utc(self.accessed_at)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Converts Unix milliseconds into a UTC datetime, if representable.
pub fn timestamp_to_utc(ms: u64) -> Option<DateTime<Utc>> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

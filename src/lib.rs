//! Query Cache - A persistent client-side query result cache
//!
//! Stores compressed query results in an embedded SQLite database, keyed by
//! a stable hash of the query's compound key, and keeps the store bounded by
//! entry count and logical size with LRU eviction.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheEntry, CacheStats, CacheStore, CompoundKey};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_eviction_task;

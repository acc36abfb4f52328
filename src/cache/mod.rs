//! Cache Module
//!
//! Persistent query result cache with stable key hashing, prefix-based
//! retrieval, and count/size-bounded LRU eviction.

mod adapter;
mod codec;
mod entry;
mod eviction;
mod key;
mod repository;
mod stats;
mod store;


// Re-export public types
pub use adapter::{Connector, FileConnector, MemoryConnector, StoreAdapter};
pub use codec::{Compressor, GzipCompressor, NoCompression};
pub use entry::{current_timestamp_ms, timestamp_to_utc, CacheEntry};
pub use eviction::EvictionPolicy;
pub use key::{hash_canonical, CompoundKey};
pub use repository::EntryRepository;
pub use stats::CacheStats;
pub use store::{CacheStore, HydratedEntry};

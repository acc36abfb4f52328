//! Cache Store Module
//!
//! Caller-facing facade combining the entry repository, statistics, eviction
//! policy, and payload codec. Every operation fails open.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{
    CacheEntry, CacheStats, CompoundKey, Compressor, Connector, EntryRepository, EvictionPolicy,
    FileConnector, GzipCompressor, MemoryConnector, StoreAdapter,
};
use crate::config::Config;
use crate::error::Result;

// == Hydrated Entry ==
/// A decoded value restored from the persistent layer.
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedEntry<T> {
    /// Compound key the value was cached under
    pub key: CompoundKey,
    /// Decoded value
    pub value: T,
    /// When the value was produced (Unix milliseconds)
    pub updated_at: u64,
}

// == Cache Store ==
/// Persistent query result cache.
///
/// Cloning is cheap and shares the underlying connection.
#[derive(Clone)]
pub struct CacheStore {
    repo: EntryRepository,
    policy: EvictionPolicy,
    compressor: Arc<dyn Compressor>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a store backed by the database file named in `config`,
    /// compressing payloads with gzip.
    ///
    /// Nothing is opened until the first operation; only an invalid
    /// configuration is reported here.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_parts(
            config,
            Arc::new(FileConnector::new(&config.db_path)),
            Arc::new(GzipCompressor::default()),
        )
    }

    /// Creates a store backed by a private in-memory database.
    pub fn in_memory(config: &Config) -> Result<Self> {
        Self::with_parts(
            config,
            Arc::new(MemoryConnector),
            Arc::new(GzipCompressor::default()),
        )
    }

    /// Creates a store from explicit connection and compression strategies.
    ///
    /// # Arguments
    /// * `config` - Store layout and eviction bounds
    /// * `connector` - Source of database connections
    /// * `compressor` - Codec applied by `put_value`/`get_value`/`hydrate`
    pub fn with_parts(
        config: &Config,
        connector: Arc<dyn Connector>,
        compressor: Arc<dyn Compressor>,
    ) -> Result<Self> {
        config.validate()?;

        let adapter = StoreAdapter::new(connector, &config.store_name, config.schema_version)?;
        let repo = EntryRepository::new(adapter)
            .with_canonical_verification(config.verify_canonical_key);

        Ok(Self {
            repo,
            policy: EvictionPolicy::from_config(config),
            compressor,
        })
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    pub fn repository(&self) -> &EntryRepository {
        &self.repo
    }

    // == Get ==
    /// Returns the entry for `key` and refreshes its access time in the background.
    pub async fn get(&self, key: &CompoundKey) -> Option<CacheEntry> {
        self.repo.get(key).await
    }

    // == Set ==
    /// Upserts an entry. Returns whether the write reached storage.
    pub async fn set(&self, entry: &CacheEntry) -> bool {
        self.repo.set(entry).await
    }

    // == Delete ==
    /// Removes the entry for `key`. Returns whether one was removed.
    pub async fn delete(&self, key: &CompoundKey) -> bool {
        self.repo.delete(key).await
    }

    // == Delete Many ==
    /// Removes a batch of entries by hash. Returns the number removed.
    pub async fn delete_many(&self, key_hashes: &[String]) -> usize {
        self.repo.delete_many(key_hashes).await
    }

    // == Get All ==
    pub async fn get_all(&self) -> Vec<CacheEntry> {
        self.repo.get_all().await
    }

    // == Get By Prefixes ==
    pub async fn get_by_prefixes<S: AsRef<str>>(&self, prefixes: &[S]) -> Vec<CacheEntry> {
        self.repo.get_by_prefixes(prefixes).await
    }

    // == Get Oldest ==
    pub async fn get_oldest(&self, limit: usize) -> Vec<CacheEntry> {
        self.repo.get_oldest(limit).await
    }

    // == Clear ==
    pub async fn clear(&self) -> bool {
        self.repo.clear().await
    }

    // == Stats ==
    /// Returns count, logical size, and access-time range of all entries.
    pub async fn stats(&self) -> CacheStats {
        CacheStats::collect(&self.repo).await
    }

    // == Run Eviction ==
    /// Runs one eviction pass. Returns the number of entries removed.
    pub async fn run_eviction(&self) -> usize {
        self.policy.run(&self.repo).await
    }

    // == Put Value ==
    /// Serializes, compresses, and stores `value` under `key`.
    ///
    /// The recorded logical size is the serialized length before compression.
    pub async fn put_value<T: Serialize + ?Sized>(&self, key: &CompoundKey, value: &T) -> bool {
        let entry = match self.encode(key, value) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Could not encode value for {}: {}", key.canonical(), err);
                return false;
            }
        };
        self.set(&entry).await
    }

    // == Get Value ==
    /// Loads and decodes the value stored under `key`.
    ///
    /// An entry that fails to decompress or deserialize is a miss.
    pub async fn get_value<T: DeserializeOwned>(&self, key: &CompoundKey) -> Option<T> {
        let entry = self.get(key).await?;
        match self.decode(&entry) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Could not decode cached value {}: {}", entry.key_hash, err);
                None
            }
        }
    }

    // == Hydrate ==
    /// Decodes every entry whose key prefix is one of `prefixes`.
    ///
    /// Entries that fail to decode are skipped. Access times are not touched.
    pub async fn hydrate<T, S>(&self, prefixes: &[S]) -> Vec<HydratedEntry<T>>
    where
        T: DeserializeOwned,
        S: AsRef<str>,
    {
        self.get_by_prefixes(prefixes)
            .await
            .into_iter()
            .filter_map(|entry| {
                let decoded = entry.compound_key().and_then(|key| {
                    self.decode::<T>(&entry).map(|value| (key, value))
                });
                match decoded {
                    Ok((key, value)) => Some(HydratedEntry {
                        key,
                        value,
                        updated_at: entry.updated_at,
                    }),
                    Err(err) => {
                        debug!("Skipping undecodable entry {}: {}", entry.key_hash, err);
                        None
                    }
                }
            })
            .collect()
    }

    // == Connection Lifecycle ==
    /// Drops the cached connection; the next operation reopens it.
    pub async fn invalidate_connection(&self) {
        self.repo.adapter().invalidate().await
    }

    /// Returns how many connections have been opened so far.
    pub fn open_count(&self) -> u64 {
        self.repo.adapter().open_count()
    }

    fn encode<T: Serialize + ?Sized>(&self, key: &CompoundKey, value: &T) -> Result<CacheEntry> {
        let raw = serde_json::to_vec(value)?;
        let payload = self.compressor.compress(&raw)?;
        Ok(CacheEntry::new(key, payload, raw.len() as u64))
    }

    fn decode<T: DeserializeOwned>(&self, entry: &CacheEntry) -> Result<T> {
        let raw = self.compressor.decompress(&entry.payload)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("repo", &self.repo)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

//! Persistent Store Adapter Module
//!
//! Owns the single SQLite connection backing the cache: lazy opening, schema
//! creation, and transparent reopening after the handle is invalidated.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::config::is_identifier;
use crate::error::{CacheError, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// == Connector Trait ==
/// Provisions raw connections for the adapter.
///
/// Injected so tests can count, fail, or redirect connection attempts.
pub trait Connector: Send + Sync {
    /// Opens a fresh connection.
    fn connect(&self) -> Result<Connection>;
}

/// Opens a database file, creating it if needed, in WAL mode.
#[derive(Debug, Clone)]
pub struct FileConnector {
    path: PathBuf,
}

impl FileConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for FileConnector {
    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Opened {} (journal_mode={})", self.path.display(), mode);
        Ok(conn)
    }
}

/// Opens a private in-memory database. Contents do not survive a reopen.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryConnector;

impl Connector for MemoryConnector {
    fn connect(&self) -> Result<Connection> {
        Ok(Connection::open_in_memory()?)
    }
}

// == Store Schema ==
/// Table name and version of the persisted layout.
#[derive(Debug, Clone)]
struct StoreSchema {
    store_name: String,
    version: u32,
}

impl StoreSchema {
    fn create_sql(&self) -> String {
        let t = &self.store_name;
        format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                key_hash      TEXT    PRIMARY KEY NOT NULL,
                key_canonical TEXT    NOT NULL,
                payload       BLOB    NOT NULL,
                updated_at    INTEGER NOT NULL,
                accessed_at   INTEGER NOT NULL,
                logical_size  INTEGER NOT NULL
            ) WITHOUT ROWID;
            CREATE INDEX IF NOT EXISTS {t}_accessed_at ON {t} (accessed_at ASC);
            CREATE INDEX IF NOT EXISTS {t}_key_canonical ON {t} (key_canonical);"
        )
    }

    /// Brings a freshly opened connection up to the configured layout.
    fn prepare(&self, conn: &Connection) -> Result<()> {
        let found = stored_version(conn)?;
        if found > self.version {
            return Err(CacheError::SchemaVersion {
                found,
                expected: self.version,
            });
        }

        conn.execute_batch(&self.create_sql())?;
        if found < self.version {
            conn.pragma_update(None, "user_version", self.version)?;
            info!(
                "Store '{}' schema upgraded from version {} to {}",
                self.store_name, found, self.version
            );
        }
        Ok(())
    }

    /// Whether a cached connection now reads a different version than it was
    /// prepared for. A failed read (e.g. `SQLITE_BUSY`) is not staleness.
    fn is_stale(&self, conn: &Connection) -> bool {
        match stored_version(conn) {
            Ok(found) => found != self.version,
            Err(err) => {
                debug!(
                    "Version check on store '{}' failed, keeping connection: {}",
                    self.store_name, err
                );
                false
            }
        }
    }
}

fn stored_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

// == Store Adapter ==
/// Exclusive owner of the process-wide connection handle.
///
/// Cloning shares the same handle. Operations run on tokio's blocking pool
/// and are serialized on the handle's mutex.
#[derive(Clone)]
pub struct StoreAdapter {
    connector: Arc<dyn Connector>,
    schema: Arc<StoreSchema>,
    handle: Arc<Mutex<Option<Connection>>>,
    opens: Arc<AtomicU64>,
}

impl StoreAdapter {
    // == Constructor ==
    /// Creates an adapter. No connection is opened until the first operation.
    ///
    /// # Arguments
    /// * `connector` - Source of raw connections
    /// * `store_name` - Table holding the entries, must be an SQL identifier
    /// * `version` - Schema version to create or expect
    pub fn new(
        connector: Arc<dyn Connector>,
        store_name: impl Into<String>,
        version: u32,
    ) -> Result<Self> {
        let store_name = store_name.into();
        if !is_identifier(&store_name) {
            return Err(CacheError::InvalidConfig(format!(
                "store name '{}' is not a valid identifier",
                store_name
            )));
        }

        Ok(Self {
            connector,
            schema: Arc::new(StoreSchema {
                store_name,
                version,
            }),
            handle: Arc::new(Mutex::new(None)),
            opens: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Returns the configured table name.
    pub fn store_name(&self) -> &str {
        &self.schema.store_name
    }

    /// Returns how many connections have been opened so far.
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    // == Run ==
    /// Runs `op` against the live connection on the blocking pool.
    ///
    /// Opens the connection on first use or after invalidation. Errors that
    /// leave the connection unusable discard it so the next call reopens.
    pub(crate) async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection, &str) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let adapter = self.clone();
        tokio::task::spawn_blocking(move || adapter.run_blocking(op)).await?
    }

    fn run_blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection, &str) -> Result<T>,
    {
        let mut guard = self.lock_handle();

        let mut conn = match guard.take() {
            Some(conn) if !self.schema.is_stale(&conn) => conn,
            Some(_) => {
                info!(
                    "Store '{}' was modified externally, reopening connection",
                    self.schema.store_name
                );
                self.open()?
            }
            None => self.open()?,
        };

        let result = op(&mut conn, &self.schema.store_name);
        match &result {
            Err(err) if err.invalidates_connection() => {
                warn!(
                    "Discarding connection to store '{}': {}",
                    self.schema.store_name, err
                );
            }
            _ => *guard = Some(conn),
        }
        result
    }

    // == Invalidate ==
    /// Drops the cached connection; the next operation reopens it.
    pub async fn invalidate(&self) {
        let adapter = self.clone();
        let dropped = tokio::task::spawn_blocking(move || adapter.lock_handle().take().is_some())
            .await
            .unwrap_or(false);
        if dropped {
            debug!("Connection to store '{}' invalidated", self.schema.store_name);
        }
    }

    fn open(&self) -> Result<Connection> {
        let conn = self.connector.connect()?;
        self.schema.prepare(&conn)?;
        let opens = self.opens.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "Connection to store '{}' opened (open #{})",
            self.schema.store_name, opens
        );
        Ok(conn)
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<Connection>> {
        match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    "Connection handle for store '{}' was poisoned, resetting",
                    self.schema.store_name
                );
                self.handle.clear_poison();
                let mut guard = poisoned.into_inner();
                *guard = None;
                guard
            }
        }
    }
}

impl std::fmt::Debug for StoreAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreAdapter")
            .field("store_name", &self.schema.store_name)
            .field("version", &self.schema.version)
            .field("opens", &self.open_count())
            .finish()
    }
}

//! Error types for the query cache
//!
//! Provides unified error handling using thiserror. These errors never leave
//! the caller-facing cache API: each operation logs them and degrades to its
//! empty result.

use rusqlite::ErrorCode;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the query cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Failure reported by the embedded store
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Payload compression or decompression failed
    #[error("Codec error: {0}")]
    Codec(#[from] std::io::Error),

    /// Value or compound key could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The database was upgraded past the configured schema version
    #[error("Schema version {found} is newer than configured version {expected}")]
    SchemaVersion { found: u32, expected: u32 },

    /// Configuration rejected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A blocking storage task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    // == Invalidates Connection ==
    /// Returns true if the cached connection handle can no longer be trusted
    /// and must be reopened before the next operation.
    pub fn invalidates_connection(&self) -> bool {
        match self {
            CacheError::SchemaVersion { .. } => true,
            CacheError::Storage(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::SystemIoFailure
            ),
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Task(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the query cache.
pub type Result<T> = std::result::Result<T, CacheError>;

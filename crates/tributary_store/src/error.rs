//! Error types for the provenance store.

use thiserror::Error;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Provenance store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error (open, query, transaction)
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error (creating the metadata directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The database was written by an incompatible schema version
    #[error("Provenance schema v{found} is not supported (expected v{expected})")]
    SchemaMismatch { found: i64, expected: i64 },
}

//! SQLite-backed provenance ledger.

use crate::error::Result;
use crate::schema::ensure_schema;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A persisted derivation: `output_path` was produced from `input_path` when
/// the input had modification time `input_fingerprint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub input_path: String,
    pub input_fingerprint: i64,
    pub output_path: String,
    pub output_fingerprint: i64,
    pub operation_name: Option<String>,
    /// Seconds since the Unix epoch
    pub recorded_at: i64,
}

impl ProvenanceRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            input_path: row.get(0)?,
            input_fingerprint: row.get(1)?,
            output_path: row.get(2)?,
            output_fingerprint: row.get(3)?,
            operation_name: row.get(4)?,
            recorded_at: row.get(5)?,
        })
    }
}

/// The facts written by [`ProvenanceStore::record`].
#[derive(Debug, Clone, Copy)]
pub struct Derivation<'a> {
    pub input_path: &'a str,
    pub input_fingerprint: i64,
    pub output_path: &'a str,
    pub output_fingerprint: i64,
    pub operation_name: Option<&'a str>,
}

impl<'a> Derivation<'a> {
    pub fn new(
        input_path: &'a str,
        input_fingerprint: i64,
        output_path: &'a str,
        output_fingerprint: i64,
    ) -> Self {
        Self {
            input_path,
            input_fingerprint,
            output_path,
            output_fingerprint,
            operation_name: None,
        }
    }

    pub fn with_operation(mut self, operation_name: Option<&'a str>) -> Self {
        self.operation_name = operation_name;
        self
    }
}

/// Ledger of derivations keyed by output path.
///
/// Accessed by a single writer at a time; no cross-process locking is done.
pub struct ProvenanceStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for ProvenanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvenanceStore")
            .field("path", &self.path)
            .finish()
    }
}

impl ProvenanceStore {
    /// Open or create a store at the given path.
    ///
    /// Creates the parent directory and the schema if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        ensure_schema(&conn)?;

        info!(path = %path.display(), "Provenance store opened");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        ensure_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Find the output previously derived from `input_path` at `input_fingerprint`.
    ///
    /// When `operation_name` is `None` any stored operation matches, including none.
    pub fn lookup(
        &self,
        input_path: &str,
        input_fingerprint: i64,
        operation_name: Option<&str>,
    ) -> Result<Option<String>> {
        let output = self
            .conn
            .query_row(
                "SELECT output_path FROM provenance
                 WHERE input_path = ?1
                   AND input_fingerprint = ?2
                   AND (?3 IS NULL OR operation_name = ?3)
                 ORDER BY recorded_at DESC, rowid DESC
                 LIMIT 1",
                params![input_path, input_fingerprint, operation_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(output)
    }

    /// Record a derivation, superseding any earlier record for the same output path.
    ///
    /// `recorded_at` defaults to the current time.
    pub fn record(&mut self, derivation: &Derivation<'_>, recorded_at: Option<i64>) -> Result<()> {
        let recorded_at = recorded_at.unwrap_or_else(|| chrono::Utc::now().timestamp());

        // Delete-then-insert so the superseding row also gets a fresh rowid,
        // which orders ties in most_recently_processed().
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM provenance WHERE output_path = ?1",
            params![derivation.output_path],
        )?;
        tx.execute(
            "INSERT INTO provenance
                (input_path, input_fingerprint, output_path, output_fingerprint, operation_name, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                derivation.input_path,
                derivation.input_fingerprint,
                derivation.output_path,
                derivation.output_fingerprint,
                derivation.operation_name,
                recorded_at,
            ],
        )?;
        tx.commit()?;

        debug!(
            input = derivation.input_path,
            output = derivation.output_path,
            operation = ?derivation.operation_name,
            "Recorded derivation"
        );
        Ok(())
    }

    /// Input path of the most recently recorded derivation.
    pub fn most_recently_processed(&self) -> Result<Option<String>> {
        let input = self
            .conn
            .query_row(
                "SELECT input_path FROM provenance
                 ORDER BY recorded_at DESC, rowid DESC
                 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(input)
    }

    /// Full record for an output path.
    pub fn record_for_output(&self, output_path: &str) -> Result<Option<ProvenanceRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT input_path, input_fingerprint, output_path, output_fingerprint, operation_name, recorded_at
                 FROM provenance
                 WHERE output_path = ?1",
                params![output_path],
                ProvenanceRecord::from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Number of live records.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM provenance", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

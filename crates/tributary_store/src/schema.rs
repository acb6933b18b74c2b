//! Schema creation and version check.

use crate::error::{Result, StoreError};
use rusqlite::{params, Connection, OptionalExtension};

pub const SCHEMA_VERSION: i64 = 1;

/// One row per output path. `recorded_at` is seconds since the Unix epoch;
/// fingerprints are modification times in microseconds.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS provenance (
    input_path TEXT NOT NULL,
    input_fingerprint INTEGER NOT NULL,
    output_path TEXT PRIMARY KEY,
    output_fingerprint INTEGER NOT NULL,
    operation_name TEXT,
    recorded_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_provenance_input
    ON provenance(input_path, input_fingerprint);

CREATE INDEX IF NOT EXISTS idx_provenance_recorded
    ON provenance(recorded_at);
"#;

pub(crate) fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let existing: Option<i64> = conn
        .query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| row.get(0))
        .optional()?;

    match existing {
        Some(found) if found == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(StoreError::SchemaMismatch {
            found,
            expected: SCHEMA_VERSION,
        }),
        None => {
            conn.execute(
                "INSERT INTO schema_meta(version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
            Ok(())
        }
    }
}

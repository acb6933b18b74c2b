//! Provenance ledger for Tributary
//!
//! Remembers which output file was derived from which input file, and at which
//! input modification time, so a pipeline run can skip work it has already done.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tributary_store::{Derivation, MetadataDir};
//!
//! let mut meta = MetadataDir::open("/derived")?;
//! let store = meta.store_mut();
//!
//! if store.lookup("2024/01/a.raw", 1_700_000_000_123_456, None)?.is_none() {
//!     // ... derive the output ...
//!     store.record(&Derivation::new("2024/01/a.raw", 1_700_000_000_123_456, "a.jpg", 1_700_000_001_000_000), None)?;
//! }
//! ```

mod error;
mod metadata;
mod schema;
mod store;

pub use error::{Result, StoreError};
pub use metadata::{MetadataDir, LOGS_DIR_NAME, METADATA_DIR_NAME, PROVENANCE_DB_NAME};
pub use schema::SCHEMA_VERSION;
pub use store::{Derivation, ProvenanceRecord, ProvenanceStore};

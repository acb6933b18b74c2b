//! Layout of the hidden metadata directory kept under a destination root.
//!
//! This module is the only place that knows the directory and file names.

use crate::error::Result;
use crate::store::ProvenanceStore;
use std::path::{Path, PathBuf};

/// Hidden directory created under every destination root.
pub const METADATA_DIR_NAME: &str = ".tributary";

/// Provenance database file inside the metadata directory.
pub const PROVENANCE_DB_NAME: &str = "provenance.sqlite";

/// Log directory inside the metadata directory.
pub const LOGS_DIR_NAME: &str = "logs";

/// Metadata directory of a destination tree, with its open provenance store.
#[derive(Debug)]
pub struct MetadataDir {
    dir: PathBuf,
    store: ProvenanceStore,
}

impl MetadataDir {
    /// Open (creating if needed) `<dest_root>/.tributary` and its `logs` directory.
    pub fn open(dest_root: impl AsRef<Path>) -> Result<Self> {
        Self::open_named(dest_root, METADATA_DIR_NAME)
    }

    /// Open a metadata directory with a non-default name.
    pub fn open_named(dest_root: impl AsRef<Path>, dir_name: &str) -> Result<Self> {
        let dir = dest_root.as_ref().join(dir_name);
        std::fs::create_dir_all(dir.join(LOGS_DIR_NAME))?;
        let store = ProvenanceStore::open(dir.join(PROVENANCE_DB_NAME))?;
        Ok(Self { dir, store })
    }

    /// Where the default metadata directory of `dest_root` lives, without opening it.
    pub fn path_for(dest_root: impl AsRef<Path>) -> PathBuf {
        dest_root.as_ref().join(METADATA_DIR_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.dir.join(LOGS_DIR_NAME)
    }

    pub fn store(&self) -> &ProvenanceStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ProvenanceStore {
        &mut self.store
    }
}

//! Errors that abort a pipeline run.
//!
//! Per-file processing failures are not errors at this level; they are
//! collected into `RunResult::failed`.

use crate::config::ConfigError;
use crate::walk::WalkError;
use thiserror::Error;
use tributary_store::StoreError;

/// Pipeline error type
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid run options: {0}")]
    InvalidOptions(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provenance store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Walk(#[from] WalkError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PipelineError>;

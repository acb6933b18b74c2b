//! CLI module for Tributary
//!
//! `run` derives outputs for a source tree; `status` reads the provenance
//! ledger of a destination tree without touching it.

pub mod error;
pub mod output;
pub mod run;
pub mod status;

//! Tributary - incremental derivation of files from a source tree
//!
//! A [`Pipeline`] walks a source tree in a stable order, asks a naming function
//! where each input's output belongs, runs a processing callback to create that
//! output, and records the derivation in a provenance ledger kept under the
//! destination tree. Later runs skip inputs whose modification time has not
//! changed since they were last derived.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌───────────────┐
//! │  TreeWalker │────▶│   filters   │────▶│ provenance  │────▶│ Namer +       │
//! │ (candidates)│     │ name/content│     │  lookup     │     │ Processor     │
//! └─────────────┘     └─────────────┘     └─────────────┘     └───────┬───────┘
//!                                                ▲                    │
//!                                                └──── record ────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tributary::{matchers, process, Namer, Pipeline, RunOptions};
//!
//! let mut pipeline = Pipeline::new("/raw", "/derived", process::copy_file)?
//!     .with_namer(Namer::flatten())
//!     .with_name_filter(matchers::ends_with([".csv"], false));
//!
//! let result = pipeline.run(&RunOptions::default())?;
//! println!("{} files processed", result.processed.len());
//! ```

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod matchers;
pub mod naming;
pub mod pipeline;
pub mod process;
pub mod walk;

pub use config::{ConfigError, PipelineConfig, ProcessMode};
pub use error::{PipelineError, Result};
pub use naming::Namer;
pub use pipeline::{Pipeline, ProgressEvent, ProgressKind, RunOptions, RunResult};
pub use process::{CommandArg, ProcessError, Processor};
pub use walk::{CandidateSource, PathBound, TreeIter, TreeWalker, WalkError, WalkRange};

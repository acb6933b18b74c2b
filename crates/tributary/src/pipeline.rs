//! The processing engine.
//!
//! A run pulls candidates from a [`CandidateSource`], one at a time:
//!
//! 1. drop candidates rejected by the name filter, missing on disk, or
//!    rejected by the content filter
//! 2. skip inputs whose current fingerprint already has a recorded output
//! 3. name the output; no name means unnameable
//! 4. apply the `max_dirs` / `max_items` bounds
//! 5. create the output (unless dry-run) and record it
//!
//! A processor failure is recorded against its candidate and the run goes on.
//! Store and traversal failures end the run with an error.

use crate::error::{PipelineError, Result};
use crate::fingerprint::{fingerprint, mtime_micros};
use crate::naming::Namer;
use crate::process::Processor;
use crate::walk::{CandidateSource, TreeWalker, WalkRange};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use tributary_store::{Derivation, MetadataDir, METADATA_DIR_NAME};

type NameFilter = Box<dyn Fn(&str) -> bool>;
type ContentFilter = Box<dyn Fn(&Path) -> bool>;
type ProgressSink = Box<dyn FnMut(&ProgressEvent<'_>)>;

/// Outcome category of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Processed,
    AlreadyPresent,
    Unnameable,
    Error,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::Processed => "processed",
            ProgressKind::AlreadyPresent => "already_present",
            ProgressKind::Unnameable => "unnameable",
            ProgressKind::Error => "error",
        }
    }
}

impl fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivered to the progress sink right after a candidate's outcome is known.
///
/// Paths are relative to the source and destination roots.
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    Processed { source: &'a str, dest: &'a str },
    AlreadyPresent { source: &'a str, dest: &'a str },
    Unnameable { source: &'a str },
    Error { source: &'a str, error: &'a anyhow::Error },
}

impl ProgressEvent<'_> {
    pub fn kind(&self) -> ProgressKind {
        match self {
            ProgressEvent::Processed { .. } => ProgressKind::Processed,
            ProgressEvent::AlreadyPresent { .. } => ProgressKind::AlreadyPresent,
            ProgressEvent::Unnameable { .. } => ProgressKind::Unnameable,
            ProgressEvent::Error { .. } => ProgressKind::Error,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            ProgressEvent::Processed { source, .. }
            | ProgressEvent::AlreadyPresent { source, .. }
            | ProgressEvent::Unnameable { source }
            | ProgressEvent::Error { source, .. } => *source,
        }
    }

    pub fn dest(&self) -> Option<&str> {
        match self {
            ProgressEvent::Processed { dest, .. } | ProgressEvent::AlreadyPresent { dest, .. } => Some(*dest),
            _ => None,
        }
    }
}

/// Per-run settings. The default is an unbounded live run over the whole tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Report what would be processed without running the processor or
    /// touching the provenance store.
    pub dry_run: bool,
    /// Stop after this many candidates have been processed.
    pub max_items: Option<usize>,
    /// Stop before processing in more than this many source directories.
    pub max_dirs: Option<usize>,
    /// Only walk this subtree (relative to the source root).
    pub limit_to: Option<String>,
    /// Continue after the most recently recorded input.
    pub resume: bool,
    /// Stop the walk after this many directories have been scanned.
    pub max_scanned_dirs: Option<usize>,
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if self.resume && self.limit_to.is_some() {
            return Err(PipelineError::InvalidOptions(
                "resume and limit_to cannot be combined".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything that happened during one run, in candidate order.
#[derive(Debug, Default)]
pub struct RunResult {
    /// (source, dest) pairs that were processed, or would have been in a dry run.
    pub processed: Vec<(String, String)>,
    /// (source, dest) pairs whose output was already up to date.
    pub already_present: Vec<(String, String)>,
    /// Sources the namer gave no name.
    pub unnameable: Vec<String>,
    /// Sources whose processing failed, with the error.
    pub failed: Vec<(String, anyhow::Error)>,
    /// A `max_items` or `max_dirs` bound ended the run with candidates left.
    pub stopped_early: bool,
}

impl RunResult {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

struct Candidate {
    relative_path: String,
    absolute_path: PathBuf,
}

impl Candidate {
    fn new(source_root: &Path, relative_path: String) -> Self {
        let absolute_path = source_root.join(&relative_path);
        Self {
            relative_path,
            absolute_path,
        }
    }

    fn relative_directory(&self) -> &str {
        self.relative_path
            .rsplit_once('/')
            .map_or("", |(dir, _)| dir)
    }
}

/// Result of handing one candidate to the processor.
enum Invocation {
    Completed { output_fingerprint: i64 },
    Failed(anyhow::Error),
}

fn produce(processor: &mut dyn Processor, src: &Path, dest: &Path) -> anyhow::Result<i64> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    processor.process(src, dest)?;
    fingerprint(dest).with_context(|| format!("No output at {}", dest.display()))
}

fn invoke(processor: &mut dyn Processor, src: &Path, dest: &Path) -> Invocation {
    match produce(processor, src, dest) {
        Ok(output_fingerprint) => Invocation::Completed { output_fingerprint },
        Err(err) => Invocation::Failed(err),
    }
}

/// A destination name must stay inside the destination tree and out of its
/// metadata directory.
fn check_destination_name(dest_rel: &str, metadata_dir: &Path) -> anyhow::Result<()> {
    let mut first = None;
    for component in Path::new(dest_rel).components() {
        match component {
            Component::Normal(segment) => {
                first.get_or_insert(segment);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                bail!("Destination name '{}' leaves the destination tree", dest_rel)
            }
            Component::RootDir | Component::Prefix(_) => {
                bail!("Destination name '{}' is not a relative path", dest_rel)
            }
        }
    }
    match first {
        None => bail!("Destination name '{}' does not name a file", dest_rel),
        Some(segment) if Some(segment) == metadata_dir.file_name() => {
            bail!("Destination name '{}' is inside the metadata directory", dest_rel)
        }
        Some(_) => Ok(()),
    }
}

/// Walk the whole source tree, except for the destination tree when it lives
/// inside it.
fn default_source(source_root: &Path, dest_root: &Path) -> TreeWalker {
    let source = std::fs::canonicalize(source_root).unwrap_or_else(|_| source_root.to_path_buf());
    let dest = std::fs::canonicalize(dest_root).unwrap_or_else(|_| dest_root.to_path_buf());

    match dest.strip_prefix(&source) {
        Ok(inside) if inside.as_os_str().is_empty() => {
            TreeWalker::with_directory_filter(|dir| dir != METADATA_DIR_NAME)
        }
        Ok(inside) => {
            let pruned = inside.to_string_lossy().replace('\\', "/");
            TreeWalker::with_directory_filter(move |dir| dir != pruned)
        }
        Err(_) => TreeWalker::new(),
    }
}

fn emit(progress: &mut Option<ProgressSink>, event: ProgressEvent<'_>) {
    if let Some(sink) = progress.as_mut() {
        sink(&event);
    }
}

/// Incremental derivation of a destination tree from a source tree.
pub struct Pipeline {
    source_root: PathBuf,
    dest_root: PathBuf,
    metadata: MetadataDir,
    processor: Box<dyn Processor>,
    namer: Namer,
    name_filter: Option<NameFilter>,
    content_filter: Option<ContentFilter>,
    source: Box<dyn CandidateSource>,
    operation_name: Option<String>,
    progress: Option<ProgressSink>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("source_root", &self.source_root)
            .field("dest_root", &self.dest_root)
            .field("namer", &self.namer)
            .field("operation_name", &self.operation_name)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline, opening (and creating if needed) the metadata
    /// directory under `dest_root`.
    pub fn new(
        source_root: impl Into<PathBuf>,
        dest_root: impl Into<PathBuf>,
        processor: impl Processor + 'static,
    ) -> Result<Self> {
        let source_root = source_root.into();
        let dest_root = dest_root.into();
        let metadata = MetadataDir::open(&dest_root)?;
        let source = default_source(&source_root, &dest_root);

        Ok(Self {
            source_root,
            dest_root,
            metadata,
            processor: Box::new(processor),
            namer: Namer::default(),
            name_filter: None,
            content_filter: None,
            source: Box::new(source),
            operation_name: None,
            progress: None,
        })
    }

    pub fn with_namer(mut self, namer: Namer) -> Self {
        self.namer = namer;
        self
    }

    /// Only consider candidates whose relative path passes `filter`.
    pub fn with_name_filter(mut self, filter: impl Fn(&str) -> bool + 'static) -> Self {
        self.name_filter = Some(Box::new(filter));
        self
    }

    /// Only consider candidates whose absolute path passes `filter`. Runs after
    /// the name filter, so it may open the file.
    pub fn with_content_filter(mut self, filter: impl Fn(&Path) -> bool + 'static) -> Self {
        self.content_filter = Some(Box::new(filter));
        self
    }

    /// Replace the default tree walk with another candidate source.
    pub fn with_source(mut self, source: impl CandidateSource + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    /// Tag records with an operation name, so pipelines that share a
    /// destination do not see each other's outputs as up to date.
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    pub fn on_progress(mut self, sink: impl FnMut(&ProgressEvent<'_>) + 'static) -> Self {
        self.progress = Some(Box::new(sink));
        self
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    pub fn metadata(&self) -> &MetadataDir {
        &self.metadata
    }

    fn walk_range(&self, options: &RunOptions) -> Result<WalkRange> {
        let mut range = WalkRange::all();

        if options.resume {
            match self.metadata.store().most_recently_processed()? {
                Some(last) => {
                    info!(after = %last, "Resuming");
                    range = range.start_after(last);
                }
                None => debug!("Nothing recorded yet, resume starts from the beginning"),
            }
        } else if let Some(subtree) = &options.limit_to {
            range = range.limit_to(subtree.as_str());
        }

        if let Some(max) = options.max_scanned_dirs {
            range = range.max_directories(max);
        }
        Ok(range)
    }

    /// Run once over the source tree.
    pub fn run(&mut self, options: &RunOptions) -> Result<RunResult> {
        options.validate()?;
        let range = self.walk_range(options)?;

        info!(
            source = %self.source_root.display(),
            dest = %self.dest_root.display(),
            dry_run = options.dry_run,
            "Starting run"
        );

        let Pipeline {
            source_root,
            dest_root,
            metadata,
            processor,
            namer,
            name_filter,
            content_filter,
            source,
            operation_name,
            progress,
        } = self;
        let operation = operation_name.as_deref();

        let mut result = RunResult::default();
        let mut remaining_items = options.max_items;
        let mut remaining_dirs = options.max_dirs;
        let mut last_dir: Option<String> = None;

        for item in source.candidates(source_root, range) {
            let relative_path = item?;

            if remaining_items == Some(0) {
                debug!("Item limit reached");
                result.stopped_early = true;
                break;
            }

            if let Some(filter) = name_filter.as_ref() {
                if !filter(relative_path.as_str()) {
                    debug!(path = %relative_path, "Rejected by name filter");
                    continue;
                }
            }

            let candidate = Candidate::new(source_root, relative_path);
            let src_meta = match std::fs::metadata(&candidate.absolute_path) {
                Ok(meta) => meta,
                Err(err) => {
                    debug!(path = %candidate.relative_path, error = %err, "Candidate not readable, skipping");
                    continue;
                }
            };

            if let Some(filter) = content_filter.as_ref() {
                if !filter(candidate.absolute_path.as_path()) {
                    debug!(path = %candidate.relative_path, "Rejected by content filter");
                    continue;
                }
            }

            let src_fingerprint = mtime_micros(&src_meta);
            let rel = candidate.relative_path.as_str();

            if let Some(prev) = metadata.store().lookup(rel, src_fingerprint, operation)? {
                debug!(path = %rel, dest = %prev, "Already up to date");
                emit(progress, ProgressEvent::AlreadyPresent { source: rel, dest: &prev });
                result.already_present.push((candidate.relative_path, prev));
                continue;
            }

            let dest_rel = match namer.resolve(rel, &candidate.absolute_path) {
                Some(name) => name,
                None => {
                    debug!(path = %rel, "No destination name");
                    emit(progress, ProgressEvent::Unnameable { source: rel });
                    result.unnameable.push(candidate.relative_path);
                    continue;
                }
            };

            if let Some(dirs_left) = remaining_dirs.as_mut() {
                let dir = candidate.relative_directory();
                if last_dir.as_deref() != Some(dir) {
                    if *dirs_left == 0 {
                        debug!("Directory limit reached");
                        result.stopped_early = true;
                        break;
                    }
                    *dirs_left -= 1;
                    last_dir = Some(dir.to_string());
                }
            }

            if let Err(error) = check_destination_name(&dest_rel, metadata.path()) {
                warn!(path = %rel, error = %error, "Processing failed");
                emit(progress, ProgressEvent::Error { source: rel, error: &error });
                result.failed.push((candidate.relative_path, error));
                continue;
            }

            if !options.dry_run {
                let dest_abs = dest_root.join(&dest_rel);
                match invoke(&mut **processor, &candidate.absolute_path, &dest_abs) {
                    Invocation::Completed { output_fingerprint } => {
                        let derivation = Derivation::new(rel, src_fingerprint, &dest_rel, output_fingerprint)
                            .with_operation(operation);
                        metadata.store_mut().record(&derivation, None)?;
                        info!(path = %rel, dest = %dest_rel, "Processed");
                    }
                    Invocation::Failed(error) => {
                        warn!(path = %rel, error = %format!("{:#}", error), "Processing failed");
                        emit(progress, ProgressEvent::Error { source: rel, error: &error });
                        result.failed.push((candidate.relative_path, error));
                        continue;
                    }
                }
            } else {
                debug!(path = %rel, dest = %dest_rel, "Would process");
            }

            emit(progress, ProgressEvent::Processed { source: rel, dest: &dest_rel });
            result.processed.push((candidate.relative_path, dest_rel));

            if let Some(items_left) = remaining_items.as_mut() {
                *items_left -= 1;
            }
        }

        info!(
            processed = result.processed.len(),
            already_present = result.already_present.len(),
            unnameable = result.unnameable.len(),
            failed = result.failed.len(),
            stopped_early = result.stopped_early,
            "Run complete"
        );

        Ok(result)
    }
}

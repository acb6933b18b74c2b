//! Ordered, bounded traversal of a source tree
//!
//! Yields file paths relative to the root, using `/` separators, in per-level
//! lexicographic order with files and subdirectories interleaved by name. A
//! walk can be limited to a range of paths: bounds are compared one segment
//! at a time, so a bound does not have to exist in the tree to partition it.
//!
//! Pruning happens on directories as they are reached (`skip_current_dir`),
//! so an excluded subtree is never read.

use std::cmp::Ordering;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// A traversal failure (unreadable directory, symlink loop, missing root).
#[derive(Error, Debug)]
#[error("Walk error: {0}")]
pub struct WalkError(#[from] walkdir::Error);

impl WalkError {
    /// The path that could not be read, if known.
    pub fn path(&self) -> Option<&Path> {
        self.0.path()
    }
}

/// One step of a candidate stream.
pub type WalkItem = std::result::Result<String, WalkError>;

/// Normalize a relative path to forward slashes on every platform.
fn normalize_path_to_forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// A position in the tree, as an ordered list of path segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathBound {
    segments: Vec<String>,
}

impl PathBound {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty() && s != ".")
                .collect(),
        }
    }

    /// Split a `/`-separated relative path.
    pub fn parse(path: &str) -> Self {
        Self::new(path.split('/'))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Compare `path` with this bound over their common depth.
    ///
    /// `Equal` means the path lies on the bound's spine: it is an ancestor of
    /// the bound, the bound itself, or inside the bound's subtree.
    fn compare_prefix(&self, path: &[&OsStr]) -> Ordering {
        for (segment, bound) in path.iter().zip(&self.segments) {
            match (*segment).cmp(OsStr::new(bound)) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    fn matches_exactly(&self, path: &[&OsStr]) -> bool {
        path.len() == self.segments.len() && self.compare_prefix(path) == Ordering::Equal
    }
}

impl From<&str> for PathBound {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<String> for PathBound {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

impl From<Vec<String>> for PathBound {
    fn from(segments: Vec<String>) -> Self {
        Self::new(segments)
    }
}

impl From<&[&str]> for PathBound {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

/// Which part of the tree a walk covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkRange {
    start: Option<PathBound>,
    start_exclusive: bool,
    stop: Option<PathBound>,
    max_directories: Option<usize>,
}

impl WalkRange {
    /// The whole tree.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only paths at or after `start`.
    pub fn start_at(mut self, start: impl Into<PathBound>) -> Self {
        self.start = non_empty(start.into());
        self.start_exclusive = false;
        self
    }

    /// Only paths strictly after `start`; the file at exactly `start` is skipped.
    pub fn start_after(mut self, start: impl Into<PathBound>) -> Self {
        self.start = non_empty(start.into());
        self.start_exclusive = true;
        self
    }

    /// Only paths at or before `stop`.
    pub fn stop_at(mut self, stop: impl Into<PathBound>) -> Self {
        self.stop = non_empty(stop.into());
        self
    }

    /// Only the subtree at `path` (start and stop set to the same bound).
    pub fn limit_to(self, path: impl Into<PathBound>) -> Self {
        let bound = path.into();
        self.start_at(bound.clone()).stop_at(bound)
    }

    /// End the walk once more than `max` directories have been encountered,
    /// counting ones that are then pruned.
    pub fn max_directories(mut self, max: usize) -> Self {
        self.max_directories = Some(max);
        self
    }

    pub fn start(&self) -> Option<&PathBound> {
        self.start.as_ref()
    }

    pub fn stop(&self) -> Option<&PathBound> {
        self.stop.as_ref()
    }

    /// Whether `path` (or, for a directory, some of its subtree) is in range.
    fn admits(&self, path: &[&OsStr]) -> bool {
        if let Some(start) = &self.start {
            if start.compare_prefix(path) == Ordering::Less {
                return false;
            }
        }
        if let Some(stop) = &self.stop {
            if stop.compare_prefix(path) == Ordering::Greater {
                return false;
            }
        }
        true
    }

    fn skips_exact(&self, path: &[&OsStr]) -> bool {
        self.start_exclusive
            && self
                .start
                .as_ref()
                .map_or(false, |start| start.matches_exactly(path))
    }
}

fn non_empty(bound: PathBound) -> Option<PathBound> {
    if bound.is_empty() {
        None
    } else {
        Some(bound)
    }
}

/// Predicate on a directory's root-relative path; `false` prunes the subtree.
pub type DirectoryFilter = Box<dyn Fn(&str) -> bool>;

/// Produces the candidate paths a pipeline run considers.
///
/// Sources that cannot honour a [`WalkRange`] may ignore it; paths they yield
/// that do not exist are dropped by the pipeline.
pub trait CandidateSource {
    fn candidates<'a>(&'a self, root: &Path, range: WalkRange) -> Box<dyn Iterator<Item = WalkItem> + 'a>;
}

/// The default candidate source: a sorted walk of the filesystem.
#[derive(Default)]
pub struct TreeWalker {
    directory_filter: Option<DirectoryFilter>,
}

impl std::fmt::Debug for TreeWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWalker")
            .field("directory_filter", &self.directory_filter.is_some())
            .finish()
    }
}

impl TreeWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walker that only descends into directories accepted by `filter`.
    pub fn with_directory_filter(filter: impl Fn(&str) -> bool + 'static) -> Self {
        Self {
            directory_filter: Some(Box::new(filter)),
        }
    }

    /// Walker that prunes directories whose name starts with `.`.
    pub fn skip_hidden_dirs() -> Self {
        Self::with_directory_filter(|dir| {
            dir.rsplit('/')
                .next()
                .map_or(true, |name| !name.starts_with('.'))
        })
    }

    /// Walk `root` lazily within `range`.
    pub fn walk(&self, root: impl AsRef<Path>, range: WalkRange) -> TreeIter<'_> {
        let root = root.as_ref().to_path_buf();
        let inner = WalkDir::new(&root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        TreeIter {
            root,
            inner,
            range,
            directory_filter: self.directory_filter.as_ref(),
            dirs_seen: 0,
            finished: false,
        }
    }
}

impl CandidateSource for TreeWalker {
    fn candidates<'a>(&'a self, root: &Path, range: WalkRange) -> Box<dyn Iterator<Item = WalkItem> + 'a> {
        Box::new(self.walk(root, range))
    }
}

/// Iterator returned by [`TreeWalker::walk`].
pub struct TreeIter<'a> {
    root: PathBuf,
    inner: walkdir::IntoIter,
    range: WalkRange,
    directory_filter: Option<&'a DirectoryFilter>,
    dirs_seen: usize,
    finished: bool,
}

impl TreeIter<'_> {
    /// Directories encountered so far, including pruned ones.
    pub fn dirs_seen(&self) -> usize {
        self.dirs_seen
    }
}

/// A link whose target vanished is neither a file nor a directory; skip it.
fn is_dangling_entry(err: &walkdir::Error) -> bool {
    err.depth() > 0
        && err.loop_ancestor().is_none()
        && err
            .io_error()
            .map_or(false, |io| io.kind() == std::io::ErrorKind::NotFound)
}

impl Iterator for TreeIter<'_> {
    type Item = WalkItem;

    fn next(&mut self) -> Option<WalkItem> {
        if self.finished {
            return None;
        }

        loop {
            let entry: DirEntry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) if is_dangling_entry(&err) => {
                    debug!(path = ?err.path(), "Skipping dangling entry");
                    continue;
                }
                Err(err) => return Some(Err(WalkError::from(err))),
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                self.dirs_seen += 1;
                if let Some(max) = self.range.max_directories {
                    if self.dirs_seen > max {
                        debug!(max_directories = max, "Directory cap reached, ending walk");
                        self.finished = true;
                        return None;
                    }
                }
            }

            let rel = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            let segments: Vec<&OsStr> = rel.iter().collect();

            if !self.range.admits(&segments) {
                if file_type.is_dir() {
                    self.inner.skip_current_dir();
                }
                continue;
            }

            let rel_path = normalize_path_to_forward_slashes(rel);

            if file_type.is_dir() {
                if let Some(filter) = self.directory_filter {
                    if !filter(rel_path.as_str()) {
                        debug!(dir = %rel_path, "Directory filtered out");
                        self.inner.skip_current_dir();
                    }
                }
                continue;
            }

            if !file_type.is_file() || self.range.skips_exact(&segments) {
                continue;
            }

            return Some(Ok(rel_path));
        }
    }
}

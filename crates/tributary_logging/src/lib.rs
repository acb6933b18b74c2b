//! Shared logging setup for Tributary binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "tributary=info,tributary_store=info";
const QUIET_CONSOLE_FILTER: &str = "warn";
const KEEP_ROTATED: usize = 3;
const MAX_LOG_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Logging configuration for a Tributary binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the file filter on stderr instead of warnings only
    pub verbose: bool,
    /// Directory for `<app_name>.log`; `None` logs to stderr only
    pub log_dir: Option<PathBuf>,
}

/// Initialize tracing with stderr output and an optional size-capped log file.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let console_filter = if config.verbose {
        filter()
    } else {
        EnvFilter::new(QUIET_CONSOLE_FILTER)
    };
    let console = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .compact()
        .with_filter(console_filter);

    let file = match config.log_dir {
        Some(dir) => {
            let writer = LogFileWriter::open(&dir, config.app_name)
                .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Append-only log file that rolls over to `<name>.log.1`, `.2`, ... once it
/// exceeds its size cap.
struct CappedLogFile {
    dir: PathBuf,
    stem: String,
    file: File,
    written: u64,
}

impl CappedLogFile {
    fn open(dir: &Path, app_name: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stem = sanitize_name(app_name);
        let path = dir.join(format!("{}.log", stem));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            dir: dir.to_path_buf(),
            stem,
            file,
            written,
        })
    }

    fn live_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.stem))
    }

    fn numbered_path(&self, n: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.stem, n))
    }

    fn roll_over(&mut self) -> io::Result<()> {
        self.file.flush()?;

        // Shift .1 -> .2 -> ... dropping whatever falls past KEEP_ROTATED.
        for n in (1..=KEEP_ROTATED).rev() {
            let from = self.numbered_path(n);
            if !from.exists() {
                continue;
            }
            if n == KEEP_ROTATED {
                fs::remove_file(&from)?;
            } else {
                fs::rename(&from, self.numbered_path(n + 1))?;
            }
        }
        fs::rename(self.live_path(), self.numbered_path(1))?;

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.live_path())?;
        self.written = 0;
        Ok(())
    }
}

impl Write for CappedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > MAX_LOG_FILE_SIZE {
            self.roll_over()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// `MakeWriter` handing out guards onto one shared log file.
#[derive(Clone)]
struct LogFileWriter {
    inner: Arc<Mutex<CappedLogFile>>,
}

impl LogFileWriter {
    fn open(dir: &Path, app_name: &str) -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(CappedLogFile::open(dir, app_name)?)),
        })
    }
}

struct LogFileGuard {
    inner: Arc<Mutex<CappedLogFile>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFileWriter {
    type Writer = LogFileGuard;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for LogFileGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .flush()
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "tributary".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_name("tributary"), "tributary");
        assert_eq!(sanitize_name("a/b c"), "a_b_c");
        assert_eq!(sanitize_name(""), "tributary");
    }

    #[test]
    fn log_file_appends_across_reopen() {
        let tmp = TempDir::new().unwrap();

        let mut log = CappedLogFile::open(tmp.path(), "app").unwrap();
        log.write_all(b"first\n").unwrap();
        drop(log);

        let mut log = CappedLogFile::open(tmp.path(), "app").unwrap();
        assert_eq!(log.written, 6);
        log.write_all(b"second\n").unwrap();
        log.flush().unwrap();

        let contents = fs::read_to_string(tmp.path().join("app.log")).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn roll_over_keeps_bounded_history() {
        let tmp = TempDir::new().unwrap();
        let mut log = CappedLogFile::open(tmp.path(), "app").unwrap();

        for round in 0..(KEEP_ROTATED + 2) {
            log.write_all(format!("round {}\n", round).as_bytes()).unwrap();
            log.roll_over().unwrap();
        }

        assert!(tmp.path().join("app.log").exists());
        for n in 1..=KEEP_ROTATED {
            assert!(tmp.path().join(format!("app.log.{}", n)).exists());
        }
        assert!(!tmp.path().join(format!("app.log.{}", KEEP_ROTATED + 1)).exists());

        let newest = fs::read_to_string(tmp.path().join("app.log.1")).unwrap();
        assert_eq!(newest, format!("round {}\n", KEEP_ROTATED + 1));
    }
}

//! Modification-time fingerprints.

use filetime::FileTime;
use std::fs::Metadata;
use std::io;
use std::path::Path;

/// Modification time in microseconds since the Unix epoch.
///
/// Microseconds rather than seconds: one run can rewrite a file several times
/// within the same second.
pub fn mtime_micros(metadata: &Metadata) -> i64 {
    let mtime = FileTime::from_last_modification_time(metadata);
    mtime.unix_seconds() * 1_000_000 + i64::from(mtime.nanoseconds() / 1_000)
}

/// Fingerprint of the file at `path`, following symlinks.
pub fn fingerprint(path: &Path) -> io::Result<i64> {
    Ok(mtime_micros(&std::fs::metadata(path)?))
}

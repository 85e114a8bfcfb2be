//! File naming and directory scans for the log directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};

/// Directory under the cache dir that holds every log and archive.
pub const LOG_DIR_NAME: &str = "perf_issues";
pub const LOG_EXTENSION: &str = "log";
pub const ARCHIVE_EXTENSION: &str = "zip";

const FILE_PREFIX: &str = "issues_";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Log,
    Archive,
}

impl EntryKind {
    pub fn of(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            LOG_EXTENSION => Some(EntryKind::Log),
            ARCHIVE_EXTENSION => Some(EntryKind::Archive),
            _ => None,
        }
    }
}

/// A log or archive found in the log directory.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub len: u64,
    pub modified: SystemTime,
}

impl LogEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Path for a new log file stamped with `now`.
///
/// Never returns a path that already exists as a log, or whose archive
/// already exists.
pub fn next_log_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = format!("{FILE_PREFIX}{}", now.format(STAMP_FORMAT));
    let mut candidate = dir.join(format!("{stem}.{LOG_EXTENSION}"));
    let mut suffix = 1;
    while candidate.exists() || archive_path_for(&candidate).exists() {
        candidate = dir.join(format!("{stem}_{suffix}.{LOG_EXTENSION}"));
        suffix += 1;
    }
    candidate
}

/// Archive path that belongs to `log`.
pub fn archive_path_for(log: &Path) -> PathBuf {
    log.with_extension(ARCHIVE_EXTENSION)
}

/// Every log and archive in `dir`, oldest first.
///
/// Ties on modification time are broken by name, which carries the
/// creation stamp.
pub fn scan(dir: &Path) -> io::Result<Vec<LogEntry>> {
    let mut entries = Vec::new();
    for item in fs::read_dir(dir)? {
        let item = item?;
        let path = item.path();
        let Some(kind) = EntryKind::of(&path) else {
            continue;
        };
        let meta = item.metadata()?;
        if !meta.is_file() {
            continue;
        }
        entries.push(LogEntry {
            path,
            kind,
            len: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    Ok(entries)
}

//! Byte budget over archived logs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::layout::{scan, EntryKind};

/// What a retention pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionReport {
    pub deleted: Vec<PathBuf>,
    pub freed_bytes: u64,
    /// Archive bytes left after the pass.
    pub remaining_bytes: u64,
}

/// Delete the oldest archives until the archives in `dir` fit in `budget`.
///
/// Logs are never touched, the active one included.
pub fn enforce(dir: &Path, budget: u64) -> io::Result<RetentionReport> {
    let archives: Vec<_> = scan(dir)?
        .into_iter()
        .filter(|entry| entry.kind == EntryKind::Archive)
        .collect();
    let mut report = RetentionReport {
        remaining_bytes: archives.iter().map(|entry| entry.len).sum(),
        ..RetentionReport::default()
    };

    for entry in archives {
        if report.remaining_bytes <= budget {
            break;
        }
        match fs::remove_file(&entry.path) {
            Ok(()) => {
                report.remaining_bytes -= entry.len;
                report.freed_bytes += entry.len;
                report.deleted.push(entry.path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                report.remaining_bytes -= entry.len;
            }
            Err(e) => warn!(path = %entry.path.display(), error = %e, "archive could not be evicted"),
        }
    }

    if !report.deleted.is_empty() {
        info!(
            deleted = report.deleted.len(),
            freed_bytes = report.freed_bytes,
            remaining_bytes = report.remaining_bytes,
            budget,
            "archives evicted"
        );
    }
    Ok(report)
}

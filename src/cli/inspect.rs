//! `inspect`: summarize a log directory.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::store::replay::replay_file;
use crate::store::{scan, EntryKind, ReplayError};

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub kind: &'static str,
    pub size_bytes: u64,
    pub valid_bytes: Option<usize>,
    pub records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirSummary {
    pub dir: PathBuf,
    pub logs: usize,
    pub archives: usize,
    pub archive_bytes: u64,
    pub records: usize,
    pub files: Vec<FileSummary>,
}

/// Summarize every log and archive in `dir`, oldest first.
///
/// Unreadable files are listed with their error instead of failing the
/// whole summary.
pub fn summarize(dir: &Path) -> Result<DirSummary, ReplayError> {
    let entries = scan(dir)?;
    let mut summary = DirSummary {
        dir: dir.to_path_buf(),
        logs: 0,
        archives: 0,
        archive_bytes: 0,
        records: 0,
        files: Vec::with_capacity(entries.len()),
    };

    for entry in entries {
        let kind = match entry.kind {
            EntryKind::Log => {
                summary.logs += 1;
                "log"
            }
            EntryKind::Archive => {
                summary.archives += 1;
                summary.archive_bytes += entry.len;
                "archive"
            }
        };
        let mut file = FileSummary {
            name: entry.file_name(),
            kind,
            size_bytes: entry.len,
            valid_bytes: None,
            records: None,
            error: None,
        };
        match replay_file(&entry.path) {
            Ok(contents) => {
                summary.records += contents.records.len();
                file.valid_bytes = Some(contents.valid_bytes);
                file.records = Some(contents.records.len());
            }
            Err(e) => file.error = Some(e.to_string()),
        }
        summary.files.push(file);
    }
    Ok(summary)
}

/// Returns the process exit code.
pub fn run_inspect(dir: &Path, json: bool) -> i32 {
    let summary = match summarize(dir) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Cannot inspect {}: {}", dir.display(), e);
            return 1;
        }
    };
    if json {
        return match serde_json::to_string_pretty(&summary) {
            Ok(text) => {
                println!("{text}");
                0
            }
            Err(e) => {
                eprintln!("Failed to encode summary: {e}");
                1
            }
        };
    }

    println!("{}", summary.dir.display());
    for file in &summary.files {
        match (&file.error, file.records) {
            (Some(error), _) => println!("  {:<40} {:>8}  {:>10} B  error: {}", file.name, file.kind, file.size_bytes, error),
            (None, records) => println!(
                "  {:<40} {:>8}  {:>10} B  {} records",
                file.name,
                file.kind,
                file.size_bytes,
                records.unwrap_or(0)
            ),
        }
    }
    println!(
        "{} logs, {} archives ({} B), {} records",
        summary.logs, summary.archives, summary.archive_bytes, summary.records
    );
    0
}

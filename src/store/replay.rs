//! Offline reading of finished and active logs.
//!
//! A log's valid region is bounded by its header; records inside it are
//! split on the separator line that opens every record.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::buffer::{header_width, parse_header, Header};
use super::layout::{scan, EntryKind};
use super::ReplayError;
use crate::record::RECORD_SEPARATOR;

/// Records recovered from one file.
#[derive(Debug, Clone, Serialize)]
pub struct LogContents {
    pub path: PathBuf,
    #[serde(serialize_with = "serialize_kind")]
    pub kind: EntryKind,
    /// Header value: bytes of valid record data.
    pub valid_bytes: usize,
    pub records: Vec<String>,
}

fn serialize_kind<S: serde::Serializer>(kind: &EntryKind, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(match kind {
        EntryKind::Log => "log",
        EntryKind::Archive => "archive",
    })
}

/// Read the records of one `.log` or `.zip` file.
pub fn replay_file(path: &Path) -> Result<LogContents, ReplayError> {
    let kind = EntryKind::of(path).ok_or_else(|| ReplayError::UnknownFile(path.to_path_buf()))?;
    let raw = match kind {
        EntryKind::Log => fs::read(path)?,
        EntryKind::Archive => read_archive_entry(path)?,
    };
    let data = valid_region(&raw).ok_or_else(|| ReplayError::BadHeader(path.to_path_buf()))?;
    Ok(LogContents {
        path: path.to_path_buf(),
        kind,
        valid_bytes: data.len(),
        records: split_records(data),
    })
}

/// Replay every log and archive in `dir`, oldest first.
///
/// Ordered by name: names carry the creation stamp, while modification
/// times of mapped files lag behind their writes.
pub fn replay_dir(dir: &Path) -> Result<Vec<LogContents>, ReplayError> {
    let mut entries = scan(dir)?;
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries.iter().map(|entry| replay_file(&entry.path)).collect()
}

/// The data bytes a buffer's header vouches for.
///
/// The header width follows from the buffer length, which is fixed at
/// creation. Returns `None` for an unreadable header.
pub fn valid_region(raw: &[u8]) -> Option<&[u8]> {
    if raw.is_empty() {
        return Some(raw);
    }
    let width = header_width(raw.len()).min(raw.len());
    let data = &raw[width..];
    match parse_header(&raw[..width]) {
        Header::Blank => Some(&data[..0]),
        Header::Offset(len) => Some(&data[..len.min(data.len())]),
        Header::Corrupt => None,
    }
}

/// Split a valid region into record bodies, separator removed.
///
/// Records escape separator lines in their own text when rendered, so every
/// block here is exactly one record.
pub fn split_records(data: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(data)
        .split(RECORD_SEPARATOR)
        .filter(|body| !body.is_empty())
        .map(str::to_owned)
        .collect()
}

fn read_archive_entry(path: &Path) -> Result<Vec<u8>, ReplayError> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    if archive.is_empty() {
        return Err(ReplayError::EmptyArchive(path.to_path_buf()));
    }
    let mut entry = archive.by_index(0)?;
    let mut raw = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut raw)?;
    Ok(raw)
}

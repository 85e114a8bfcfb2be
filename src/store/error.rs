use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures inside the log store.
///
/// None of these reach an instrumented thread; the writer logs them and
/// carries on. They surface only from [`LogStore::open`](super::LogStore::open)
/// and from direct use of the building blocks.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Buffer size {0} is below the minimum of {min}", min = super::MIN_BUFFER_SIZE)]
    BufferTooSmall(usize),

    #[error("Failed to map {path}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to compress {path}: {source}")]
    Compress {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Record of {len} bytes exceeds buffer capacity of {capacity}")]
    RecordTooLarge { len: usize, capacity: usize },

    #[error("Log writer is not running")]
    WriterGone,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Failures reading finished logs back.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Not a log or archive file: {0}")]
    UnknownFile(PathBuf),

    #[error("Archive {0} has no log entry")]
    EmptyArchive(PathBuf),

    #[error("Unreadable header in {0}")]
    BadHeader(PathBuf),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

//! Crash-tolerant, space-bounded persistence of event records.
//!
//! One writer thread owns the mapped buffer and the log directory. Callers
//! only enqueue: [`LogStore::append`] never blocks on I/O. When a buffer
//! fills, the writer rotates to a new file, compresses the old one, offers
//! the archive to the [`Uploader`] and trims archives to the byte budget.

mod archive;
mod buffer;
mod error;
mod layout;
pub mod replay;
mod retention;
mod writer;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

pub use archive::{compress, Archiver, NoopUploader, Uploader};
pub use buffer::{
    data_capacity, encode_header, header_width, parse_header, Header, MappedBuffer, Resumed,
    MIN_BUFFER_SIZE,
};
pub use error::{ReplayError, StoreError};
pub use layout::{
    archive_path_for, next_log_path, scan, EntryKind, LogEntry, ARCHIVE_EXTENSION, LOG_DIR_NAME,
    LOG_EXTENSION,
};
pub use retention::{enforce as enforce_retention, RetentionReport};

use crate::record::RecordSink;
use crate::telemetry::{self, DropReason};
use writer::{Job, LogWriter};

/// Where and how the store writes.
#[derive(Clone)]
pub struct StoreSettings {
    /// The log directory itself (already including [`LOG_DIR_NAME`]).
    pub dir: PathBuf,
    pub buffer_size: usize,
    /// Budget for archives kept on disk.
    pub max_cache_bytes: u64,
    pub uploader: Arc<dyn Uploader>,
}

impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSettings")
            .field("dir", &self.dir)
            .field("buffer_size", &self.buffer_size)
            .field("max_cache_bytes", &self.max_cache_bytes)
            .finish_non_exhaustive()
    }
}

/// Handle to the log writer thread.
pub struct LogStore {
    dir: PathBuf,
    jobs: mpsc::UnboundedSender<Job>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl LogStore {
    /// Start the writer. It recovers the directory before taking any
    /// appends.
    pub fn open(settings: StoreSettings) -> Result<Self, StoreError> {
        if settings.buffer_size < MIN_BUFFER_SIZE {
            return Err(StoreError::BufferTooSmall(settings.buffer_size));
        }
        std::fs::create_dir_all(&settings.dir)?;
        let dir = settings.dir.clone();

        let (jobs, rx) = mpsc::unbounded_channel();
        let writer = LogWriter::new(settings);
        let thread = thread::Builder::new()
            .name("perf-issues-writer".to_string())
            .spawn(move || writer.run(rx))?;

        info!(dir = %dir.display(), "log store opened");
        Ok(Self {
            dir,
            jobs,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Queue serialized record bytes for writing.
    pub fn append(&self, bytes: Arc<[u8]>) {
        if self.jobs.send(Job::Append(bytes)).is_err() {
            debug!("append after log store shutdown");
            telemetry::record_dropped(DropReason::Closed);
        }
    }

    /// Wait until everything appended so far is written, flushed and its
    /// maintenance finished.
    ///
    /// Blocks the calling thread; do not call from inside an async runtime.
    pub fn sync(&self) -> Result<(), StoreError> {
        let (done, wait) = oneshot::channel();
        self.jobs
            .send(Job::Sync(done))
            .map_err(|_| StoreError::WriterGone)?;
        wait.blocking_recv().map_err(|_| StoreError::WriterGone)
    }

    /// Write everything queued, flush, and stop the writer thread.
    pub fn shutdown(&self) {
        let _ = self.jobs.send(Job::Shutdown);
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                error!("log writer thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .lock()
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }
}

impl RecordSink for LogStore {
    fn submit(&self, bytes: Arc<[u8]>) {
        self.append(bytes);
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

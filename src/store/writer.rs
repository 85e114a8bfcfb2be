//! The log writer: sole owner of the mapped buffer and the log directory.
//!
//! Runs on one dedicated thread and consumes jobs in submission order.
//! Archival, upload and retention are queued on an internal backlog and
//! drained between jobs, so directory changes never race with rotation.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::archive::Archiver;
use super::buffer::{data_capacity, MappedBuffer, Resumed};
use super::layout::{archive_path_for, next_log_path, scan, EntryKind};
use super::{retention, StoreSettings};
use crate::telemetry::{self, DropReason};

pub(crate) enum Job {
    Append(Arc<[u8]>),
    /// Acknowledged once everything before it is written and flushed.
    Sync(oneshot::Sender<()>),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Maintenance {
    Archive(PathBuf),
    Upload(PathBuf),
    Retain,
}

pub(crate) struct LogWriter {
    settings: StoreSettings,
    archiver: Archiver,
    buffer: Option<MappedBuffer>,
    backlog: VecDeque<Maintenance>,
}

impl LogWriter {
    pub(crate) fn new(settings: StoreSettings) -> Self {
        let archiver = Archiver::new(Arc::clone(&settings.uploader));
        Self {
            settings,
            archiver,
            buffer: None,
            backlog: VecDeque::new(),
        }
    }

    /// Writer thread body. Recovers first, then serves jobs until shutdown
    /// or until every sender is gone.
    pub(crate) fn run(mut self, mut jobs: mpsc::UnboundedReceiver<Job>) {
        self.recover();
        self.drain_backlog();

        while let Some(job) = jobs.blocking_recv() {
            match job {
                Job::Append(bytes) => self.append(&bytes),
                Job::Sync(done) => {
                    self.drain_backlog();
                    self.flush();
                    let _ = done.send(());
                    continue;
                }
                Job::Shutdown => break,
            }
            self.drain_backlog();
        }

        self.drain_backlog();
        if let Some(buffer) = self.buffer.take() {
            if let Err(e) = buffer.close() {
                warn!(error = %e, "log buffer flush failed at shutdown");
            }
        }
        debug!("log writer stopped");
    }

    /// Adopt the newest log left by an earlier run and queue every other
    /// file for archival or upload.
    pub(crate) fn recover(&mut self) {
        let dir = &self.settings.dir;
        if let Err(e) = fs::create_dir_all(dir) {
            error!(dir = %dir.display(), error = %e, "log directory unavailable");
            return;
        }
        let entries = scan(dir).unwrap_or_else(|e| {
            warn!(dir = %dir.display(), error = %e, "log directory scan failed");
            Vec::new()
        });
        let (logs, archives): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(|entry| entry.kind == EntryKind::Log);

        let mut pending_logs: Vec<PathBuf> = logs.iter().map(|entry| entry.path.clone()).collect();
        if let Some(newest) = pending_logs.pop() {
            match MappedBuffer::resume(&newest, self.settings.buffer_size) {
                Ok(Resumed::Ready(buffer)) => {
                    info!(path = %newest.display(), offset = buffer.offset(), "log resumed");
                    self.buffer = Some(buffer);
                }
                Ok(Resumed::Exhausted) => {
                    info!(path = %newest.display(), "resumed log exhausted; rotating");
                    telemetry::record_rotation();
                    pending_logs.push(newest);
                }
                Err(e) => {
                    warn!(path = %newest.display(), error = %e, "log could not be resumed; archiving");
                    pending_logs.push(newest);
                }
            }
        }

        let rearchived: Vec<PathBuf> = pending_logs.iter().map(|log| archive_path_for(log)).collect();
        for log in pending_logs {
            self.backlog.push_back(Maintenance::Archive(log));
        }
        for archive in archives {
            // Re-created and queued for upload by its archive task.
            if !rearchived.contains(&archive.path) {
                self.backlog.push_back(Maintenance::Upload(archive.path));
            }
        }
        self.backlog.push_back(Maintenance::Retain);

        if self.buffer.is_none() {
            self.open_fresh();
        }
    }

    pub(crate) fn append(&mut self, bytes: &[u8]) {
        let capacity = data_capacity(self.settings.buffer_size);
        if bytes.len() > capacity {
            warn!(len = bytes.len(), capacity, "record larger than a whole buffer; dropped");
            telemetry::record_dropped(DropReason::Oversized);
            return;
        }
        if self
            .buffer
            .as_ref()
            .is_some_and(|buffer| buffer.remaining() < bytes.len())
        {
            self.rotate();
        }
        if self.buffer.is_none() {
            self.open_fresh();
        }
        let Some(buffer) = self.buffer.as_mut() else {
            telemetry::record_dropped(DropReason::Unmapped);
            return;
        };
        match buffer.append(bytes) {
            Ok(()) => telemetry::record_written(bytes.len()),
            Err(e) => {
                warn!(error = %e, "record dropped");
                telemetry::record_dropped(DropReason::Unmapped);
            }
        }
    }

    /// Retire the current buffer and start a new one.
    pub(crate) fn rotate(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            let path = buffer.path().to_path_buf();
            if let Err(e) = buffer.close() {
                warn!(path = %path.display(), error = %e, "log flush failed before rotation");
            }
            info!(path = %path.display(), "log rotated");
            telemetry::record_rotation();
            self.backlog.push_back(Maintenance::Archive(path));
            self.backlog.push_back(Maintenance::Retain);
        }
        self.open_fresh();
    }

    fn open_fresh(&mut self) {
        let dir = &self.settings.dir;
        if let Err(e) = fs::create_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "log directory unavailable; retrying on next append");
            return;
        }
        let path = next_log_path(dir, Local::now());
        match MappedBuffer::create(&path, self.settings.buffer_size) {
            Ok(buffer) => {
                debug!(path = %path.display(), "log opened");
                self.buffer = Some(buffer);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "log buffer unavailable; retrying on next append");
                let _ = fs::remove_file(&path);
            }
        }
    }

    fn flush(&self) {
        if let Some(buffer) = &self.buffer {
            if let Err(e) = buffer.flush() {
                warn!(error = %e, "log flush failed");
            }
        }
    }

    pub(crate) fn drain_backlog(&mut self) {
        while let Some(task) = self.backlog.pop_front() {
            match task {
                Maintenance::Archive(log) => {
                    if let Some(archive) = self.archiver.archive(&log) {
                        self.backlog.push_back(Maintenance::Upload(archive));
                    }
                }
                Maintenance::Upload(archive) => {
                    if archive.exists() {
                        self.archiver.upload(&archive);
                    }
                }
                Maintenance::Retain => {
                    if let Err(e) = retention::enforce(&self.settings.dir, self.settings.max_cache_bytes) {
                        warn!(error = %e, "retention pass failed");
                    }
                }
            }
        }
    }

    #[cfg(test)]
    fn current(&self) -> Option<&MappedBuffer> {
        self.buffer.as_ref()
    }
}

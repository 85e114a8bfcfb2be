//! Compression and upload of finished logs.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::layout::archive_path_for;
use super::StoreError;
use crate::telemetry::{self, Outcome};

/// Remote submission of a finished archive.
///
/// Returning `true` confirms the upload; the archive is then deleted
/// locally. Anything else keeps it for the next attempt.
pub trait Uploader: Send + Sync {
    fn upload(&self, archive: &Path) -> bool;
}

/// Uploader that never succeeds. Archives stay on disk under retention.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUploader;

impl Uploader for NoopUploader {
    fn upload(&self, _archive: &Path) -> bool {
        false
    }
}

impl<F> Uploader for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn upload(&self, archive: &Path) -> bool {
        self(archive)
    }
}

pub struct Archiver {
    uploader: Arc<dyn Uploader>,
}

impl Archiver {
    pub fn new(uploader: Arc<dyn Uploader>) -> Self {
        Self { uploader }
    }

    /// Compress `log` and delete it. Returns the archive on success.
    ///
    /// On failure the log is left in place and picked up by the next
    /// recovery.
    pub fn archive(&self, log: &Path) -> Option<PathBuf> {
        match compress(log) {
            Ok(archive) => {
                telemetry::record_archive(Outcome::Ok);
                if let Err(e) = fs::remove_file(log) {
                    warn!(path = %log.display(), error = %e, "archived log could not be removed");
                }
                info!(path = %archive.display(), "log archived");
                Some(archive)
            }
            Err(e) => {
                telemetry::record_archive(Outcome::Failed);
                warn!(path = %log.display(), error = %e, "log archive failed");
                None
            }
        }
    }

    /// Hand `archive` to the uploader and delete it once confirmed.
    pub fn upload(&self, archive: &Path) -> bool {
        if !self.uploader.upload(archive) {
            telemetry::record_upload(Outcome::Failed);
            debug!(path = %archive.display(), "archive not uploaded");
            return false;
        }
        telemetry::record_upload(Outcome::Ok);
        if let Err(e) = fs::remove_file(archive) {
            warn!(path = %archive.display(), error = %e, "uploaded archive could not be removed");
        }
        info!(path = %archive.display(), "archive uploaded");
        true
    }
}

/// Write `log` as the single deflated entry of a sibling `.zip`.
///
/// An existing archive of the same name is replaced. A partial archive is
/// removed on failure.
pub fn compress(log: &Path) -> Result<PathBuf, StoreError> {
    let archive = archive_path_for(log);
    if archive.exists() {
        debug!(path = %archive.display(), "replacing stale archive");
        fs::remove_file(&archive)?;
    }
    let result = write_archive(log, &archive);
    if result.is_err() {
        let _ = fs::remove_file(&archive);
    }
    result.map(|()| archive)
}

fn write_archive(log: &Path, archive: &Path) -> Result<(), StoreError> {
    let entry = log
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let zip_err = |source| StoreError::Compress {
        path: log.to_path_buf(),
        source,
    };

    let mut source = File::open(log)?;
    let mut writer = ZipWriter::new(BufWriter::new(File::create(archive)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(entry.as_str(), options).map_err(zip_err)?;
    io::copy(&mut source, &mut writer)?;
    let mut out = writer.finish().map_err(zip_err)?;
    io::Write::flush(&mut out)?;
    Ok(())
}

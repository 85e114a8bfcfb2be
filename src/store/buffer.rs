//! The fixed-size mapped log buffer.
//!
//! Layout: a fixed-width ASCII header holding the number of valid data bytes,
//! left-justified and space padded, followed by the data region. The header is
//! as wide as the decimal form of the buffer size. Appends write the data
//! first and the header second, so after a crash the header may under-report
//! but never claims bytes that were not written.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use tracing::debug;

use super::StoreError;

/// Smallest buffer the store accepts.
pub const MIN_BUFFER_SIZE: usize = 4096;

/// Width of the header for a buffer of `buffer_size` bytes.
pub fn header_width(buffer_size: usize) -> usize {
    buffer_size.max(1).to_string().len()
}

/// Bytes available for records in a buffer of `buffer_size` bytes.
pub fn data_capacity(buffer_size: usize) -> usize {
    buffer_size.saturating_sub(header_width(buffer_size))
}

pub fn encode_header(value: usize, width: usize) -> String {
    format!("{:<width$}", value)
}

/// Parsed header contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    /// Never written.
    Blank,
    Offset(usize),
    Corrupt,
}

pub fn parse_header(raw: &[u8]) -> Header {
    let trimmed: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| *b != b' ' && *b != 0)
        .collect();
    if trimmed.is_empty() {
        return Header::Blank;
    }
    std::str::from_utf8(&trimmed)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .map_or(Header::Corrupt, Header::Offset)
}

/// Outcome of reopening an existing log.
#[derive(Debug)]
pub enum Resumed {
    Ready(MappedBuffer),
    /// Full, unreadable or sized for another configuration. Archive it.
    Exhausted,
}

pub struct MappedBuffer {
    path: PathBuf,
    map: MmapMut,
    _file: File,
    header_width: usize,
    offset: usize,
}

impl std::fmt::Debug for MappedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedBuffer")
            .field("path", &self.path)
            .field("offset", &self.offset)
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl MappedBuffer {
    /// Create a zero-filled buffer at `path` with a header of 0.
    pub fn create(path: &Path, buffer_size: usize) -> Result<Self, StoreError> {
        check_size(buffer_size)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(buffer_size as u64)?;
        let mut buffer = Self::map(path, file, buffer_size)?;
        buffer.write_header();
        buffer.map.flush_range(0, buffer.header_width)?;
        debug!(path = %path.display(), buffer_size, "log buffer created");
        Ok(buffer)
    }

    /// Reopen an existing log and position after its valid data.
    pub fn resume(path: &Path, buffer_size: usize) -> Result<Resumed, StoreError> {
        check_size(buffer_size)?;
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len != buffer_size as u64 {
            debug!(path = %path.display(), len, buffer_size, "log sized for another buffer");
            return Ok(Resumed::Exhausted);
        }
        let mut buffer = Self::map(path, file, buffer_size)?;
        match parse_header(&buffer.map[..buffer.header_width]) {
            Header::Blank => {
                buffer.write_header();
                buffer.map.flush_range(0, buffer.header_width)?;
                Ok(Resumed::Ready(buffer))
            }
            Header::Offset(offset) if offset < buffer.capacity() => {
                buffer.offset = offset;
                Ok(Resumed::Ready(buffer))
            }
            Header::Offset(_) | Header::Corrupt => Ok(Resumed::Exhausted),
        }
    }

    fn map(path: &Path, file: File, buffer_size: usize) -> Result<Self, StoreError> {
        // SAFETY: the log directory is owned by this process's writer thread;
        // nothing else truncates the file while it is mapped.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|source| StoreError::Map {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            map,
            _file: file,
            header_width: header_width(buffer_size),
            offset: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Valid data bytes, as recorded in the header.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the data region.
    pub fn capacity(&self) -> usize {
        self.map.len() - self.header_width
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.offset
    }

    /// Append `bytes` and advance the header past them.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        if bytes.len() > self.remaining() {
            return Err(StoreError::RecordTooLarge {
                len: bytes.len(),
                capacity: self.remaining(),
            });
        }
        self.stage(bytes);
        self.commit(bytes.len());
        Ok(())
    }

    fn stage(&mut self, bytes: &[u8]) {
        let start = self.header_width + self.offset;
        self.map[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn commit(&mut self, len: usize) {
        self.offset += len;
        self.write_header();
    }

    fn write_header(&mut self) {
        let header = encode_header(self.offset, self.header_width);
        self.map[..self.header_width].copy_from_slice(header.as_bytes());
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.map.flush()?;
        Ok(())
    }

    /// Flush and unmap, returning the file's path.
    pub fn close(self) -> Result<PathBuf, StoreError> {
        self.map.flush()?;
        Ok(self.path)
    }
}

fn check_size(buffer_size: usize) -> Result<(), StoreError> {
    if buffer_size < MIN_BUFFER_SIZE {
        return Err(StoreError::BufferTooSmall(buffer_size));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SIZE: usize = MIN_BUFFER_SIZE;

    fn header_of(path: &Path) -> Header {
        let bytes = std::fs::read(path).unwrap();
        parse_header(&bytes[..header_width(SIZE)])
    }

    #[test]
    fn header_is_padded_to_buffer_digits() {
        assert_eq!(header_width(1_048_576), 7);
        assert_eq!(encode_header(42, 7), "42     ");
        assert_eq!(parse_header(b"42     "), Header::Offset(42));
        assert_eq!(parse_header(b"\0\0\0\0"), Header::Blank);
        assert_eq!(parse_header(b"4x2 "), Header::Corrupt);
    }

    #[test]
    fn create_writes_zero_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let buffer = MappedBuffer::create(&path, SIZE).unwrap();
        assert_eq!(buffer.capacity(), SIZE - 4);
        assert_eq!(header_of(&path), Header::Offset(0));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), SIZE as u64);
    }

    #[test]
    fn create_rejects_small_buffers() {
        let dir = TempDir::new().unwrap();
        let err = MappedBuffer::create(&dir.path().join("a.log"), 100).unwrap_err();
        assert!(matches!(err, StoreError::BufferTooSmall(100)));
    }

    #[test]
    fn append_advances_header_by_record_length() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let mut buffer = MappedBuffer::create(&path, SIZE).unwrap();
        buffer.append(b"hello").unwrap();
        buffer.append(b" world").unwrap();
        buffer.flush().unwrap();

        assert_eq!(header_of(&path), Header::Offset(11));
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[4..15], b"hello world");
    }

    #[test]
    fn append_refuses_overflow() {
        let dir = TempDir::new().unwrap();
        let mut buffer = MappedBuffer::create(&dir.path().join("a.log"), SIZE).unwrap();
        let big = vec![b'x'; buffer.capacity()];
        buffer.append(&big).unwrap();
        assert_eq!(buffer.remaining(), 0);
        assert!(buffer.append(b"y").is_err());
    }

    #[test]
    fn interrupted_append_never_over_reports() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let mut buffer = MappedBuffer::create(&path, SIZE).unwrap();
        buffer.append(b"first").unwrap();
        // Data lands but the process dies before the header moves.
        buffer.stage(b"second");
        drop(buffer);

        match MappedBuffer::resume(&path, SIZE).unwrap() {
            Resumed::Ready(buffer) => assert_eq!(buffer.offset(), 5),
            Resumed::Exhausted => panic!("expected a resumable buffer"),
        }
    }

    #[test]
    fn resume_continues_after_valid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let mut buffer = MappedBuffer::create(&path, SIZE).unwrap();
        buffer.append(b"abc").unwrap();
        buffer.close().unwrap();

        let Resumed::Ready(mut buffer) = MappedBuffer::resume(&path, SIZE).unwrap() else {
            panic!("expected a resumable buffer");
        };
        buffer.append(b"def").unwrap();
        buffer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[4..10], b"abcdef");
        assert_eq!(header_of(&path), Header::Offset(6));
    }

    #[test]
    fn resume_persists_blank_header_as_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, vec![0u8; SIZE]).unwrap();

        let Resumed::Ready(buffer) = MappedBuffer::resume(&path, SIZE).unwrap() else {
            panic!("expected a resumable buffer");
        };
        assert_eq!(buffer.offset(), 0);
        drop(buffer);
        assert_eq!(header_of(&path), Header::Offset(0));
    }

    #[test]
    fn resume_reports_full_corrupt_or_resized_logs() {
        let dir = TempDir::new().unwrap();

        let full = dir.path().join("full.log");
        let mut bytes = vec![b' '; SIZE];
        bytes[..4].copy_from_slice(b"4092");
        std::fs::write(&full, &bytes).unwrap();
        assert!(matches!(MappedBuffer::resume(&full, SIZE).unwrap(), Resumed::Exhausted));

        let corrupt = dir.path().join("corrupt.log");
        bytes[..4].copy_from_slice(b"zz  ");
        std::fs::write(&corrupt, &bytes).unwrap();
        assert!(matches!(MappedBuffer::resume(&corrupt, SIZE).unwrap(), Resumed::Exhausted));

        let resized = dir.path().join("resized.log");
        std::fs::write(&resized, vec![0u8; SIZE * 2]).unwrap();
        assert!(matches!(MappedBuffer::resume(&resized, SIZE).unwrap(), Resumed::Exhausted));
    }
}

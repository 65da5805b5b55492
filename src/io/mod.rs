//! File accessors backing the address mapper.
//!
//! A `FileAccessor` exposes exactly two things: the total byte length of the
//! underlying file and a positioned read. Three implementations are provided:
//!
//! - [`DiskFile`] opens a fresh handle for every read and drops it before
//!   returning, so no descriptor outlives a call.
//! - [`MappedFile`] maps the file read-only once and serves reads from the
//!   shared mapping.
//! - [`MemoryFile`] wraps an in-memory buffer.
//!
//! All three return byte-identical results for the same file contents.

pub mod error;

use crate::config::{AccessMode, IoConfig};
use crate::io::error::{IoError, Result};
use bytes::Bytes;
use memmap2::Mmap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Positioned, read-only access to a file's bytes.
pub trait FileAccessor: Send + Sync {
    /// Total length of the file in bytes.
    fn len(&self) -> u64;

    /// Returns true when the file holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read. A short count means the read hit the
    /// end of the file; reads starting at or past the end return 0.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;
}

impl<T: FileAccessor + ?Sized> FileAccessor for &T {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_at(offset, buf)
    }
}

impl<T: FileAccessor + ?Sized> FileAccessor for Box<T> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_at(offset, buf)
    }
}

/// Opens `path` with the accessor selected by `config.access`.
pub fn open<P: AsRef<Path>>(path: P, config: &IoConfig) -> Result<Box<dyn FileAccessor>> {
    Ok(match config.access {
        AccessMode::Transient => Box::new(DiskFile::open(path, config.max_file_size)?),
        AccessMode::Mapped => Box::new(MappedFile::open(path, config.max_file_size)?),
    })
}

fn check_size(path: &Path, file_size: u64, max_file_size: u64) -> Result<()> {
    if file_size > max_file_size {
        warn!(
            path = %path.display(),
            size = file_size,
            limit = max_file_size,
            "File is too large"
        );
        return Err(IoError::FileTooLarge {
            limit: max_file_size,
            found: file_size,
        });
    }
    Ok(())
}

/// Disk-backed accessor that acquires a file handle per read.
#[derive(Debug, Clone)]
pub struct DiskFile {
    path: PathBuf,
    file_size: u64,
}

impl DiskFile {
    /// Records the path and size of a file without keeping it open.
    pub fn open<P: AsRef<Path>>(path: P, max_file_size: u64) -> Result<Self> {
        let path = path.as_ref();
        let file_size = std::fs::metadata(path)?.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limit = max_file_size,
            "Opening file for transient reads"
        );
        check_size(path, file_size, max_file_size)?;

        Ok(Self {
            path: path.to_path_buf(),
            file_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileAccessor for DiskFile {
    fn len(&self) -> u64 {
        self.file_size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.file_size {
            return Ok(0);
        }

        // The handle is dropped on every exit path, including read errors.
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        trace!(
            path = %self.path.display(),
            offset = offset,
            len = filled,
            "Performed transient read"
        );
        Ok(filled)
    }
}

/// Accessor over a shared read-only memory map.
pub struct MappedFile {
    path: PathBuf,
    // None when the file size is zero; memmap cannot map empty files.
    mmap: Option<Mmap>,
}

impl MappedFile {
    pub fn open<P: AsRef<Path>>(path: P, max_file_size: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limit = max_file_size,
            "Mapping file for shared reads"
        );
        check_size(path, file_size, max_file_size)?;

        let mmap = if file_size == 0 {
            None
        } else {
            // Safety: read-only map of a regular file; callers must not truncate it
            // while the mapping is alive.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileAccessor for MappedFile {
    fn len(&self) -> u64 {
        self.mmap.as_ref().map_or(0, |m| m.len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        match &self.mmap {
            Some(map) => Ok(copy_from(map, offset, buf)),
            None => Ok(0),
        }
    }
}

/// Accessor over bytes already in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    data: Bytes,
}

impl MemoryFile {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

impl FileAccessor for MemoryFile {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        Ok(copy_from(&self.data, offset, buf))
    }
}

fn copy_from(src: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= src.len() {
        return 0;
    }
    let end = start.saturating_add(buf.len()).min(src.len());
    let n = end - start;
    buf[..n].copy_from_slice(&src[start..end]);
    n
}

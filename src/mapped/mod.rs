//! Memory-Mapped File Module
//!
//! A **bounds-checked**, byte-addressable view of a file region, used for
//! both sides of the sstable lifecycle:
//!
//! - **Writable maps** back the sstable builder: the total file size is
//!   computed up front, the file is sized once, and header / entries /
//!   footer are written at their final offsets before a single `sync()`.
//! - **Read-only maps** back sealed sstables: point reads slice directly
//!   out of the map with every boundary verified first.
//!
//! # Concurrency
//!
//! Concurrent writers to the same mapping are prohibited by the engine's
//! single-writer discipline; this module does not add its own locking.
//! A view is extended by reopening the file with a larger size.
//!
//! # Safety
//!
//! Uses `unsafe { Mmap::map(...) }` / `unsafe { MmapMut::map_mut(...) }`
//! but is memory-safe in practice because:
//!
//! - Read-only maps are only ever taken over sealed, immutable files.
//! - Writable maps are private to the builder until renamed into place.
//! - All offsets and lengths are verified against the mapped size before
//!   slicing.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use memmap2::{Mmap, MmapMut};
use thiserror::Error;
use tracing::trace;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`MappedFile`] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MappedFileError {
    /// The backing file could not be opened or sized.
    #[error("open failed for {path}: {source}")]
    OpenFailed {
        /// Path of the file being opened.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The kernel refused the mapping.
    #[error("mmap failed for {path}: {source}")]
    MapFailed {
        /// Path of the file being mapped.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A read or write fell outside the mapped region.
    #[error("access out of bounds: offset {offset} + len {len} > size {size}")]
    OutOfBounds {
        /// Requested start offset.
        offset: usize,
        /// Requested length.
        len: usize,
        /// Total mapped size.
        size: usize,
    },

    /// A write was attempted through a read-only view.
    #[error("write attempted on read-only mapping")]
    ReadOnlyWrite,

    /// Flushing dirty pages to disk failed.
    #[error("sync failed: {0}")]
    SyncFailed(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// MappedFile
// ------------------------------------------------------------------------------------------------

enum View {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

/// A bounds-checked memory-mapped view over a whole file.
pub struct MappedFile {
    view: View,
    path: PathBuf,
}

impl MappedFile {
    /// Creates (or opens) a file of exactly `size` bytes and maps it.
    ///
    /// With `read_only = false` the file is created if missing and grown or
    /// truncated to `size`. With `read_only = true` the existing file is
    /// mapped as-is and `size` is ignored.
    pub fn create(
        path: impl AsRef<Path>,
        size: u64,
        read_only: bool,
    ) -> Result<Self, MappedFileError> {
        if read_only {
            return Self::open_read_only(path);
        }

        let path_ref = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path_ref)
            .map_err(|source| MappedFileError::OpenFailed {
                path: path_ref.to_path_buf(),
                source,
            })?;

        file.set_len(size)
            .map_err(|source| MappedFileError::OpenFailed {
                path: path_ref.to_path_buf(),
                source,
            })?;

        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|source| {
            MappedFileError::MapFailed {
                path: path_ref.to_path_buf(),
                source,
            }
        })?;

        trace!(path = %path_ref.display(), size, "writable mapping created");

        Ok(Self {
            view: View::ReadWrite(map),
            path: path_ref.to_path_buf(),
        })
    }

    /// Maps an existing file read-only, covering its full length.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, MappedFileError> {
        let path_ref = path.as_ref();
        let file = OpenOptions::new().read(true).open(path_ref).map_err(|source| {
            MappedFileError::OpenFailed {
                path: path_ref.to_path_buf(),
                source,
            }
        })?;

        let map = unsafe { Mmap::map(&file) }.map_err(|source| MappedFileError::MapFailed {
            path: path_ref.to_path_buf(),
            source,
        })?;

        trace!(path = %path_ref.display(), size = map.len(), "read-only mapping opened");

        Ok(Self {
            view: View::ReadOnly(map),
            path: path_ref.to_path_buf(),
        })
    }

    /// Total mapped size in bytes.
    pub fn len(&self) -> usize {
        match &self.view {
            View::ReadOnly(map) => map.len(),
            View::ReadWrite(map) => map.len(),
        }
    }

    /// True when nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when this view cannot be written through.
    pub fn is_read_only(&self) -> bool {
        matches!(self.view, View::ReadOnly(_))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `len` bytes starting at `offset`.
    pub fn read(&self, offset: usize, len: usize) -> Result<&[u8], MappedFileError> {
        self.check_bounds(offset, len)?;
        let slice = match &self.view {
            View::ReadOnly(map) => &map[offset..offset + len],
            View::ReadWrite(map) => &map[offset..offset + len],
        };
        Ok(slice)
    }

    /// The entire mapped region as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        match &self.view {
            View::ReadOnly(map) => map,
            View::ReadWrite(map) => map,
        }
    }

    /// Copies `bytes` into the mapping at `offset`.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MappedFileError> {
        self.check_bounds(offset, bytes.len())?;
        match &mut self.view {
            View::ReadOnly(_) => Err(MappedFileError::ReadOnlyWrite),
            View::ReadWrite(map) => {
                map[offset..offset + bytes.len()].copy_from_slice(bytes);
                Ok(())
            }
        }
    }

    /// Flushes dirty pages to disk. A no-op for read-only views.
    pub fn sync(&self) -> Result<(), MappedFileError> {
        match &self.view {
            View::ReadOnly(_) => Ok(()),
            View::ReadWrite(map) => map.flush().map_err(MappedFileError::SyncFailed),
        }
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<(), MappedFileError> {
        let size = self.len();
        let end = offset.checked_add(len);
        match end {
            Some(end) if end <= size => Ok(()),
            _ => Err(MappedFileError::OutOfBounds { offset, len, size }),
        }
    }
}

impl std::fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedFile")
            .field("path", &self.path)
            .field("len", &self.len())
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

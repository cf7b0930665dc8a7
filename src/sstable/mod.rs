//! Sorted String Table (SSTable) Module
//!
//! This module implements the **immutable**, **disk-backed**, sorted table
//! of the engine: a sealed `.bdb` container file plus an in-memory index
//! and a per-table bloom filter.
//!
//! ## Design Overview
//!
//! An sstable is produced exactly once — by a memtable flush or by a
//! compaction merge — then sealed by its footer and never modified. The
//! whole file is memory-mapped; point reads and range scans slice
//! entries straight out of the map with their CRCs verified at read time.
//!
//! # On-disk layout (see [`crate::container`])
//!
//! ```text
//! [HEADER]
//! [BatchStart]
//! [Insert/Update/Delete entry]...
//! [BatchEnd]
//! [FOOTER]
//! ```
//!
//! Keys within a file are strictly increasing; the index covers every
//! data entry in file order.
//!
//! # Filename contract
//!
//! `{table-type-name}_{level}_{creation-ms}_{entry-count}.bdb`, e.g.
//! `cookies_0_1700000000123_512.bdb`. Housekeeping tools and the engine's
//! recovery scan both rely on this shape, and the table-type field must
//! agree with the file header.
//!
//! # Corruption handling
//!
//! - Header or footer damage, file-CRC mismatch, or lost framing make the
//!   whole file unusable — the engine quarantines it.
//! - A damaged individual entry stays in the index; the read that touches
//!   it sees the CRC mismatch, counts a corruption event, and treats the
//!   entry as missing. Range scans skip it and keep going.
//!
//! # Concurrency model
//!
//! SSTables are immutable, so reads are lock-free aside from the atomic
//! corruption counter. Multiple readers share the same table via `Arc`.

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod builder;
pub mod iterator;

#[cfg(test)]
mod tests;

pub use builder::SstWriter;
pub use iterator::RangeScan;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use bloomfilter::Bloom;
use thiserror::Error;
use tracing::{debug, warn};

use crate::container::{
    ContainerError, EntryFrame, EntryKind, FOOTER_SIZE, FileFooter, FileHeader, HEADER_SIZE,
    LogEntry, TableType, compute_crc,
};
use crate::engine::utils::{HexKey, Record};
use crate::mapped::{MappedFile, MappedFileError};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by sstable operations (build, open, read).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SstableError {
    /// Container format or integrity error.
    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    /// Memory-mapping error.
    #[error("mapped file error: {0}")]
    Mapped(#[from] MappedFileError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The filename does not follow the
    /// `{type}_{level}_{ms}_{count}.bdb` contract.
    #[error("invalid sstable filename: {0}")]
    InvalidFilename(String),

    /// The filename's table-type field disagrees with the file header.
    #[error("table type mismatch: filename says {filename}, header says {header}")]
    TableTypeMismatch {
        /// Table type parsed from the filename.
        filename: TableType,
        /// Table type stored in the header.
        header: TableType,
    },

    /// An sstable cannot be built from zero records.
    #[error("cannot build an sstable from an empty record sequence")]
    EmptyInput,

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Filename contract
// ------------------------------------------------------------------------------------------------

/// Parsed form of an sstable filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SstableFileName {
    /// Table the file belongs to.
    pub table_type: TableType,
    /// Level the file was written at.
    pub level: u8,
    /// Creation time in milliseconds (third filename field).
    pub created_ms: u64,
    /// Number of data entries recorded at creation.
    pub entry_count: u64,
}

impl SstableFileName {
    /// Renders the filename for these fields.
    pub fn render(&self) -> String {
        format!(
            "{}_{}_{}_{}.bdb",
            self.table_type.name(),
            self.level,
            self.created_ms,
            self.entry_count
        )
    }

    /// Parses a bare filename (no directory components).
    ///
    /// Returns `None` for anything that is not a well-formed
    /// `{type}_{level}_{ms}_{count}.bdb` name.
    pub fn parse(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".bdb")?;
        let mut parts = stem.split('_');

        let table_type = TableType::from_name(parts.next()?)?;
        let level = parts.next()?.parse::<u8>().ok()?;
        let created_ms = parts.next()?.parse::<u64>().ok()?;
        let entry_count = parts.next()?.parse::<u64>().ok()?;
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            table_type,
            level,
            created_ms,
            entry_count,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// Index
// ------------------------------------------------------------------------------------------------

/// One index entry: where a data entry lives inside the file.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// The entry's key.
    pub key: Vec<u8>,

    /// Byte offset of the encoded entry within the file.
    pub offset: u64,

    /// Encoded size of the entry in bytes.
    pub size: u32,

    /// Write timestamp of the entry.
    pub timestamp: u64,
}

// ------------------------------------------------------------------------------------------------
// SSTable — immutable reader
// ------------------------------------------------------------------------------------------------

/// A fully memory-mapped, immutable sorted table.
pub struct SSTable {
    /// Path of the sealed `.bdb` file.
    path: PathBuf,

    /// Read-only mapping of the full file.
    mapped: MappedFile,

    /// Validated file header.
    header: FileHeader,

    /// Validated statistics footer.
    footer: FileFooter,

    /// Sorted index covering every data entry, in file order.
    index: Vec<IndexEntry>,

    /// Membership filter over all index keys.
    bloom: Bloom<Vec<u8>>,

    /// Level this file belongs to (from the filename).
    level: u8,

    /// Creation milliseconds (from the filename).
    created_ms: u64,

    /// Number of entries whose CRC failed during reads of this table.
    corruption_events: AtomicU64,
}

impl SSTable {
    /// Opens a sealed sstable, validates it end to end, and rebuilds the
    /// in-memory index and bloom filter.
    ///
    /// # Validation pipeline
    ///
    /// 1. Parse the filename against the contract.
    /// 2. Memory-map the file read-only.
    /// 3. Decode and CRC-check the header; cross-check the table type
    ///    against the filename.
    /// 4. Decode the footer; check size agreement and verify the file CRC
    ///    over the entry region.
    /// 5. Stream the entry region, collecting one [`IndexEntry`] per data
    ///    entry. A batch with no `BatchEnd` is a torn flush — its entries
    ///    are discarded.
    /// 6. Build the bloom filter from the surviving index keys.
    ///
    /// Entry CRCs are deliberately **not** verified here; see the module
    /// docs on corruption handling.
    pub fn open(path: impl AsRef<Path>, bloom_fp_rate: f64) -> Result<Self, SstableError> {
        let path = path.as_ref().to_path_buf();

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SstableError::InvalidFilename(path.display().to_string()))?;
        let file_name = SstableFileName::parse(name)
            .ok_or_else(|| SstableError::InvalidFilename(name.to_string()))?;

        let mapped = MappedFile::open_read_only(&path)?;
        let bytes = mapped.as_slice();

        if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(ContainerError::Truncated(format!(
                "file is {} bytes, smaller than header + footer",
                bytes.len()
            ))
            .into());
        }

        let header = FileHeader::decode(&bytes[..HEADER_SIZE])?;
        if header.table_type != file_name.table_type {
            return Err(SstableError::TableTypeMismatch {
                filename: file_name.table_type,
                header: header.table_type,
            });
        }

        let footer_start = bytes.len() - FOOTER_SIZE;
        let footer = FileFooter::decode(&bytes[footer_start..])?;

        if footer.file_size != bytes.len() as u64 {
            return Err(ContainerError::Truncated(format!(
                "footer claims {} bytes, file has {}",
                footer.file_size,
                bytes.len()
            ))
            .into());
        }
        if footer.data_offset != HEADER_SIZE as u64 {
            return Err(SstableError::Internal(format!(
                "footer data offset {} does not match header size",
                footer.data_offset
            )));
        }

        let entry_region = &bytes[HEADER_SIZE..footer_start];
        let computed = compute_crc(&[entry_region]);
        if computed != footer.file_crc {
            return Err(ContainerError::CrcMismatch {
                stored: footer.file_crc,
                computed,
            }
            .into());
        }

        let (index, data_frames) = Self::rebuild_index(entry_region, HEADER_SIZE as u64)?;
        if data_frames != footer.entry_count {
            return Err(ContainerError::Truncated(format!(
                "footer counts {} entries, entry region holds {}",
                footer.entry_count, data_frames
            ))
            .into());
        }

        let mut bloom: Bloom<Vec<u8>> = Bloom::new_for_fp_rate(index.len().max(1), bloom_fp_rate)
            .map_err(|e| SstableError::Internal(e.to_string()))?;
        for entry in &index {
            bloom.set(&entry.key);
        }

        debug!(
            path = %path.display(),
            level = file_name.level,
            entries = index.len(),
            "sstable opened"
        );

        Ok(Self {
            path,
            mapped,
            header,
            footer,
            index,
            bloom,
            level: file_name.level,
            created_ms: file_name.created_ms,
            corruption_events: AtomicU64::new(0),
        })
    }

    /// Streams the entry region, returning the index of all data entries
    /// that belong to complete batches (in file order) together with the
    /// total number of data frames seen, torn or not.
    fn rebuild_index(
        region: &[u8],
        base_offset: u64,
    ) -> Result<(Vec<IndexEntry>, u64), SstableError> {
        let mut index: Vec<IndexEntry> = Vec::new();
        let mut pending: Vec<IndexEntry> = Vec::new();
        let mut in_batch = false;
        let mut offset = 0usize;
        let mut data_frames = 0u64;
        let mut last_key: Option<Vec<u8>> = None;

        while offset < region.len() {
            let (frame, consumed) = EntryFrame::parse(&region[offset..])?;

            match frame.kind {
                EntryKind::BatchStart => {
                    if in_batch {
                        // A nested BatchStart means the previous batch was
                        // torn; drop what it accumulated.
                        warn!(dropped = pending.len(), "nested batch start, discarding torn batch");
                        pending.clear();
                    }
                    in_batch = true;
                }
                EntryKind::BatchEnd => {
                    index.append(&mut pending);
                    in_batch = false;
                }
                EntryKind::Insert | EntryKind::Update | EntryKind::Delete => {
                    data_frames += 1;
                    if let Some(prev) = &last_key
                        && frame.key <= *prev
                    {
                        return Err(SstableError::Internal(
                            "index keys not strictly increasing".into(),
                        ));
                    }
                    last_key = Some(frame.key.clone());

                    let entry = IndexEntry {
                        key: frame.key,
                        offset: base_offset + offset as u64,
                        size: consumed as u32,
                        timestamp: frame.timestamp,
                    };
                    if in_batch {
                        pending.push(entry);
                    } else {
                        index.push(entry);
                    }
                }
            }

            offset += consumed;
        }

        if in_batch && !pending.is_empty() {
            warn!(
                dropped = pending.len(),
                "entry stream ended mid-batch, discarding torn batch"
            );
        }

        Ok((index, data_frames))
    }

    /// Checks whether `key` *might* exist in this table.
    ///
    /// `false` is definitive; `true` means the index must be consulted.
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.bloom.check(&key.to_vec())
    }

    /// Looks up a single key.
    ///
    /// Returns the stored record — tombstones included, so the caller can
    /// apply shadowing — or `None` when the table has no intact entry for
    /// the key. A CRC failure on the stored entry counts one corruption
    /// event and reads as a miss.
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>, SstableError> {
        if !self.might_contain(key) {
            return Ok(None);
        }

        let Ok(idx) = self.index.binary_search_by(|e| e.key.as_slice().cmp(key)) else {
            return Ok(None);
        };

        Ok(self.read_entry(&self.index[idx]))
    }

    /// Reads and decodes the entry behind an index slot, verifying its
    /// CRC. Corrupt entries count one corruption event and return `None`.
    pub(crate) fn read_entry(&self, entry: &IndexEntry) -> Option<Record> {
        let bytes = match self.mapped.read(entry.offset as usize, entry.size as usize) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "index slot fell outside mapping");
                self.corruption_events.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match LogEntry::decode_from(bytes) {
            Ok((log_entry, _)) => Some(Record {
                deleted: log_entry.is_tombstone(),
                key: log_entry.key,
                value: log_entry.value,
                timestamp: log_entry.timestamp,
                kind: log_entry.kind,
                heat: 0.0,
            }),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    key = %HexKey(&entry.key),
                    error = %e,
                    "corrupt entry skipped"
                );
                self.corruption_events.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Returns a range iterator over `[low, high]` (inclusive).
    ///
    /// Yields records — tombstones included — in key order; entries whose
    /// CRC fails are skipped and counted.
    pub fn range(&self, low: &[u8], high: &[u8]) -> RangeScan<'_> {
        RangeScan::new(self, low, high)
    }

    // --------------------------------------------------------------------------------------------
    // Metadata accessors
    // --------------------------------------------------------------------------------------------

    /// Number of data entries recorded in the footer.
    pub fn entry_count(&self) -> u64 {
        self.footer.entry_count
    }

    /// Number of entries actually indexed (differs from
    /// [`entry_count`](Self::entry_count) only when a torn batch was
    /// discarded).
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// Total file size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.footer.file_size
    }

    /// Level this file belongs to.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Creation time in milliseconds (from the filename).
    pub fn creation_time(&self) -> u64 {
        self.created_ms
    }

    /// Table this file belongs to.
    pub fn table_type(&self) -> TableType {
        self.header.table_type
    }

    /// Smallest key in the table, if any entry survived indexing.
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.first().map(|e| e.key.as_slice())
    }

    /// Largest key in the table, if any entry survived indexing.
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.last().map(|e| e.key.as_slice())
    }

    /// True when `[min_key, max_key]` intersects `[low, high]`.
    pub fn overlaps(&self, low: &[u8], high: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => min <= high && low <= max,
            _ => false,
        }
    }

    /// True when `key` falls within `[min_key, max_key]`.
    pub fn covers_key(&self, key: &[u8]) -> bool {
        self.overlaps(key, key)
    }

    /// Number of corrupt entries encountered by reads so far.
    pub fn corruption_events(&self) -> u64 {
        self.corruption_events.load(Ordering::Relaxed)
    }

    /// Path of the sealed file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validated file header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Validated statistics footer.
    pub fn footer(&self) -> &FileFooter {
        &self.footer
    }

    /// The sorted index, in file order.
    pub(crate) fn index(&self) -> &[IndexEntry] {
        &self.index
    }
}

impl std::fmt::Debug for SSTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTable")
            .field("path", &self.path)
            .field("level", &self.level)
            .field("entries", &self.index.len())
            .field("size_bytes", &self.footer.file_size)
            .finish()
    }
}

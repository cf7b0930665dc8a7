//! SSTable writer — builds a sealed `.bdb` file from a sorted record
//! sequence.
//!
//! # Input Requirements
//!
//! - Records **must be sorted by key, strictly increasing** — the memtable
//!   drain and the compaction dedup both guarantee one record per key.
//! - Tombstones are written as `Delete` entries with an empty value.
//!
//! # Output Guarantees
//!
//! - The entry stream is bracketed by one `BatchStart`/`BatchEnd` pair so
//!   readers can detect a torn flush.
//! - The footer's statistics (entry count, key/value byte totals, max
//!   entry size, file CRC) reflect exactly what was written.
//! - The filename follows `{type}_{level}_{ms}_{count}.bdb`.
//!
//! # Atomicity
//!
//! 1. The total file size is computed up front and a writable mapping of
//!    that exact size is created at `<final-name>.tmp`.
//! 2. Header, entries, and footer are written at their final offsets and
//!    flushed with a single `sync()`.
//! 3. The temp file is renamed into place.
//!
//! A crash cannot produce a half-written file under the final name; an
//! orphaned `.tmp` is swept away by the engine's recovery scan.

use std::{fs, path::PathBuf};

use tracing::{debug, info};

use crate::container::{
    EntryKind, FOOTER_SIZE, FileFooter, FileHeader, HEADER_SIZE, IDENTITY_COMPRESSION_RATIO,
    LogEntry, TableType, compute_crc,
};
use crate::engine::utils::{Record, monotonic_millis};
use crate::mapped::MappedFile;
use crate::sstable::{SstableError, SstableFileName};

// ------------------------------------------------------------------------------------------------
// BuildStats — accumulates footer fields during construction
// ------------------------------------------------------------------------------------------------

/// Statistics gathered while writing entries, fed into the footer.
struct BuildStats {
    entry_count: u64,
    max_entry_size: u32,
    total_key_size: u64,
    total_value_size: u64,
}

impl BuildStats {
    fn new() -> Self {
        Self {
            entry_count: 0,
            max_entry_size: 0,
            total_key_size: 0,
            total_value_size: 0,
        }
    }

    fn track(&mut self, entry: &LogEntry, encoded_len: usize) {
        if entry.kind.is_data() {
            self.entry_count += 1;
            self.total_key_size += entry.key.len() as u64;
            self.total_value_size += entry.value.len() as u64;
        }
        self.max_entry_size = self.max_entry_size.max(encoded_len as u32);
    }

    fn into_footer(self, file_size: u64, file_crc: u32) -> FileFooter {
        FileFooter {
            entry_count: self.entry_count,
            file_size,
            data_offset: HEADER_SIZE as u64,
            max_entry_size: self.max_entry_size,
            total_key_size: self.total_key_size,
            total_value_size: self.total_value_size,
            compression_ratio: IDENTITY_COMPRESSION_RATIO,
            file_crc,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// SstWriter — public entry point
// ------------------------------------------------------------------------------------------------

/// Builds a sealed sstable file inside a database directory.
///
/// # Example
///
/// ```rust,ignore
/// let path = SstWriter::new(dir, TableType::History, 0).build(&records)?;
/// let table = SSTable::open(&path, 0.01)?;
/// ```
pub struct SstWriter {
    dir: PathBuf,
    table_type: TableType,
    level: u8,
}

impl SstWriter {
    /// Creates a writer targeting the given directory, table, and level.
    pub fn new(dir: impl Into<PathBuf>, table_type: TableType, level: u8) -> Self {
        Self {
            dir: dir.into(),
            table_type,
            level,
        }
    }

    /// Consumes a sorted record sequence and writes a complete sstable.
    ///
    /// Returns the path of the sealed file.
    ///
    /// # Errors
    ///
    /// - [`SstableError::EmptyInput`] for an empty sequence.
    /// - [`SstableError::Internal`] if keys are not strictly increasing
    ///   or a record carries a batch-marker kind.
    /// - I/O and mapping errors from writing or renaming.
    pub fn build(self, records: &[Record]) -> Result<PathBuf, SstableError> {
        if records.is_empty() {
            return Err(SstableError::EmptyInput);
        }

        for pair in records.windows(2) {
            if pair[1].key <= pair[0].key {
                return Err(SstableError::Internal(
                    "records must be sorted by strictly increasing key".into(),
                ));
            }
        }

        // Pre-encode all entries so the exact file size is known before
        // the mapping is created.
        let mut created_ms = monotonic_millis();
        let mut entries: Vec<LogEntry> = Vec::with_capacity(records.len() + 2);
        entries.push(LogEntry::batch_start(created_ms));
        for record in records {
            let kind = match record.kind {
                _ if record.deleted => EntryKind::Delete,
                EntryKind::Insert | EntryKind::Update => record.kind,
                other => {
                    return Err(SstableError::Internal(format!(
                        "record carries non-data kind {other:?}"
                    )));
                }
            };
            let value = if record.deleted {
                Vec::new()
            } else {
                record.value.clone()
            };
            entries.push(LogEntry::data(kind, record.key.clone(), value, record.timestamp));
        }
        entries.push(LogEntry::batch_end(created_ms));

        let entry_bytes: usize = entries.iter().map(LogEntry::encoded_len).sum();
        let file_size = HEADER_SIZE + entry_bytes + FOOTER_SIZE;

        // Pick a filename that is not already taken; consecutive flushes
        // within one millisecond bump the timestamp field.
        let mut final_path;
        loop {
            let name = SstableFileName {
                table_type: self.table_type,
                level: self.level,
                created_ms,
                entry_count: records.len() as u64,
            };
            final_path = self.dir.join(name.render());
            if !final_path.exists() {
                break;
            }
            created_ms += 1;
        }
        let tmp_path = {
            let mut name = final_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            name.push_str(".tmp");
            self.dir.join(name)
        };

        let mut mapped = MappedFile::create(&tmp_path, file_size as u64, false)?;

        // 1. Header
        let header = FileHeader::new(self.table_type, created_ms);
        mapped.write(0, &header.encode())?;

        // 2. Entry stream
        let mut stats = BuildStats::new();
        let mut cursor = HEADER_SIZE;
        let mut buf = Vec::new();
        for entry in &entries {
            buf.clear();
            entry.encode_to(&mut buf)?;
            stats.track(entry, buf.len());
            mapped.write(cursor, &buf)?;
            cursor += buf.len();
        }

        // 3. Footer (file CRC covers the freshly written entry region)
        let footer_start = cursor;
        let file_crc = compute_crc(&[mapped.read(HEADER_SIZE, entry_bytes)?]);
        let footer = stats.into_footer(file_size as u64, file_crc);
        mapped.write(footer_start, &footer.encode())?;

        // 4. Seal: flush, drop the mapping, rename into place.
        mapped.sync()?;
        drop(mapped);
        fs::rename(&tmp_path, &final_path)?;

        debug!(
            path = %final_path.display(),
            entries = records.len(),
            bytes = file_size,
            "sstable built"
        );
        info!(
            table = %self.table_type,
            level = self.level,
            entries = records.len(),
            "sstable sealed"
        );

        Ok(final_path)
    }
}

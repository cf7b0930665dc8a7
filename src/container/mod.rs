//! `.bdb` Container Format Module
//!
//! This module owns the **versioned**, **CRC-checked**, **append-only** binary
//! container shared by every table type. Because the crate owns this format,
//! the on-disk representation **never** changes due to a dependency upgrade.
//!
//! # On-disk layout
//!
//! ```text
//! [HEADER (46 B, fixed)]
//! [LOG ENTRY][LOG ENTRY]...
//! [FOOTER (52 B, fixed)]
//! ```
//!
//! **Header** (all integers little-endian):
//!
//! | Field       | Size | Notes                                   |
//! |-------------|------|-----------------------------------------|
//! | magic       | 8 B  | `BROWSRDB`                              |
//! | version     | 1 B  | currently `1`                           |
//! | created-at  | 8 B  | milliseconds since UNIX epoch           |
//! | modified-at | 8 B  | milliseconds since UNIX epoch           |
//! | flags       | 4 B  | reserved, zero                          |
//! | reserved    | 4 B  | reserved, zero                          |
//! | table-type  | 1 B  | [`TableType`] discriminant              |
//! | compression | 1 B  | identity (`0`); round-tripped verbatim  |
//! | encryption  | 1 B  | identity (`0`); round-tripped verbatim  |
//! | padding     | 6 B  | zero                                    |
//! | header CRC  | 4 B  | CRC32 over all preceding bytes          |
//!
//! **Log entry**:
//!
//! ```text
//! [kind (1 B)][key-len (varint)][value-len (varint)]
//! [key bytes][value bytes][timestamp (8 B LE)][entry CRC32 (4 B LE)]
//! ```
//!
//! The entry CRC covers `kind || key || value || timestamp`. Delete entries
//! and batch markers carry no value bytes; batch markers carry no key either.
//!
//! **Footer**:
//!
//! | Field             | Size | Notes                                     |
//! |-------------------|------|-------------------------------------------|
//! | entry count       | 8 B  | data entries only, batch markers excluded |
//! | file size         | 8 B  | total bytes including this footer         |
//! | data offset       | 8 B  | = header size                             |
//! | max entry size    | 4 B  | largest encoded entry                     |
//! | total key size    | 8 B  | sum of data-entry key lengths             |
//! | total value size  | 8 B  | sum of data-entry value lengths           |
//! | compression ratio | 2 B  | percent × 100 (`10000` = identity)        |
//! | padding           | 2 B  | zero                                      |
//! | file CRC32        | 4 B  | over `[data_offset, file_size − 52)`      |
//!
//! # Safety limits
//!
//! To prevent allocation bombs from corrupted or crafted inputs, decoders
//! enforce upper bounds: keys and values are capped at [`MAX_KEY_OR_VALUE_LEN`]
//! (1 MiB) and varints at [`MAX_VARINT_BYTES`] (10) encoded bytes.
//!
//! # Zero-panic guarantee
//!
//! No function in this module uses `unwrap()`, `expect()`, or any other
//! panicking path. All errors are propagated via [`ContainerError`].

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use crc32fast::Hasher as Crc32;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// 8-byte format magic written at offset 0 of every `.bdb` file.
pub const MAGIC: [u8; 8] = *b"BROWSRDB";

/// Current container format version. Readers reject anything newer.
pub const FORMAT_VERSION: u8 = 1;

/// Fixed encoded size of the file header, including its trailing CRC32.
pub const HEADER_SIZE: usize = 46;

/// Fixed encoded size of the file footer, including the file CRC32.
pub const FOOTER_SIZE: usize = 52;

/// Maximum byte length of a single key or value (1 MiB).
pub const MAX_KEY_OR_VALUE_LEN: usize = 1024 * 1024;

/// Maximum number of encoded bytes a varint may occupy.
pub const MAX_VARINT_BYTES: usize = 10;

/// Compression ratio stored by the identity codec: 100.00%.
pub const IDENTITY_COMPRESSION_RATIO: u16 = 10_000;

/// Fixed per-entry overhead: kind byte + timestamp + CRC32.
const ENTRY_FIXED_OVERHEAD: usize = 1 + 8 + 4;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors raised while encoding or decoding container structures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContainerError {
    /// Header magic or header CRC did not match.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The file was written by a newer format version than this reader supports.
    #[error("format version {found} exceeds supported version {supported}")]
    VersionTooNew {
        /// Version byte found in the header.
        found: u8,
        /// Highest version this reader understands.
        supported: u8,
    },

    /// A varint ran past [`MAX_VARINT_BYTES`] without terminating.
    #[error("varint exceeds {MAX_VARINT_BYTES} bytes")]
    VarIntTooLarge,

    /// The buffer ended before a complete structure could be decoded.
    #[error("incomplete entry (need {needed} bytes, have {available})")]
    IncompleteEntry {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// A decoded key or value length exceeds [`MAX_KEY_OR_VALUE_LEN`].
    #[error("key or value length {0} exceeds limit ({MAX_KEY_OR_VALUE_LEN} bytes)")]
    EntryTooLarge(usize),

    /// Data integrity failure — a stored CRC32 did not match.
    #[error("CRC mismatch (stored {stored:08x}, computed {computed:08x})")]
    CrcMismatch {
        /// Checksum read from disk.
        stored: u32,
        /// Checksum computed over the covered bytes.
        computed: u32,
    },

    /// The file is shorter than its fixed regions require.
    #[error("file truncated: {0}")]
    Truncated(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// Table type
// ------------------------------------------------------------------------------------------------

/// The browser-state table a container file belongs to.
///
/// Stored in the file header; a file belongs to exactly one table type and
/// must never be read as another. The lower-case variant name is also the
/// first field of the sstable filename contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TableType {
    /// Navigation history.
    History = 1,
    /// Cookie jar.
    Cookies = 2,
    /// HTTP cache bodies.
    Cache = 3,
    /// Per-origin key-value storage.
    LocalStore = 4,
    /// User settings.
    Settings = 5,
}

impl TableType {
    /// All table types, in discriminant order.
    pub const ALL: [TableType; 5] = [
        TableType::History,
        TableType::Cookies,
        TableType::Cache,
        TableType::LocalStore,
        TableType::Settings,
    ];

    /// The header discriminant byte.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a header discriminant byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(TableType::History),
            2 => Some(TableType::Cookies),
            3 => Some(TableType::Cache),
            4 => Some(TableType::LocalStore),
            5 => Some(TableType::Settings),
            _ => None,
        }
    }

    /// The lower-case name used in sstable filenames.
    pub fn name(self) -> &'static str {
        match self {
            TableType::History => "history",
            TableType::Cookies => "cookies",
            TableType::Cache => "cache",
            TableType::LocalStore => "localstore",
            TableType::Settings => "settings",
        }
    }

    /// Parse a lower-case filename field back into a table type.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "history" => Some(TableType::History),
            "cookies" => Some(TableType::Cookies),
            "cache" => Some(TableType::Cache),
            "localstore" => Some(TableType::LocalStore),
            "settings" => Some(TableType::Settings),
            _ => None,
        }
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ------------------------------------------------------------------------------------------------
// Entry kind
// ------------------------------------------------------------------------------------------------

/// Discriminant of a single log entry.
///
/// `Insert` and `Update` are equivalent for visibility (last write wins by
/// timestamp); the distinction is preserved for audit only. `Delete` is a
/// tombstone. `BatchStart`/`BatchEnd` bracket the entries produced by a
/// single flush so readers can detect torn writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    /// A fresh key-value pair.
    Insert = 1,
    /// An overwrite of an existing key.
    Update = 2,
    /// A tombstone; carries a key and an empty value.
    Delete = 3,
    /// Opens a flush batch.
    BatchStart = 4,
    /// Closes a flush batch.
    BatchEnd = 5,
}

impl EntryKind {
    /// The on-disk discriminant byte.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse an on-disk discriminant byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(EntryKind::Insert),
            2 => Some(EntryKind::Update),
            3 => Some(EntryKind::Delete),
            4 => Some(EntryKind::BatchStart),
            5 => Some(EntryKind::BatchEnd),
            _ => None,
        }
    }

    /// True for `Insert`/`Update`/`Delete` — the kinds that carry a key and
    /// count toward the footer's entry count.
    pub fn is_data(self) -> bool {
        matches!(self, EntryKind::Insert | EntryKind::Update | EntryKind::Delete)
    }
}

// ------------------------------------------------------------------------------------------------
// Varint — unsigned LEB128
// ------------------------------------------------------------------------------------------------

/// Appends `value` to `buf` as an unsigned little-endian base-128 varint.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Decodes an unsigned LEB128 varint from the start of `buf`.
///
/// Returns `(value, bytes_consumed)`. Fails with
/// [`ContainerError::VarIntTooLarge`] if no terminator appears within
/// [`MAX_VARINT_BYTES`] bytes, or [`ContainerError::IncompleteEntry`] if the
/// buffer ends mid-varint.
pub fn read_varint(buf: &[u8]) -> Result<(u64, usize), ContainerError> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;

    for (idx, &byte) in buf.iter().enumerate() {
        if idx >= MAX_VARINT_BYTES {
            return Err(ContainerError::VarIntTooLarge);
        }
        // The 10th byte of a u64 varint may only contribute its low bit.
        if shift >= 63 && (byte & 0x7E) != 0 {
            return Err(ContainerError::VarIntTooLarge);
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, idx + 1));
        }
        shift += 7;
    }

    if buf.len() >= MAX_VARINT_BYTES {
        Err(ContainerError::VarIntTooLarge)
    } else {
        Err(ContainerError::IncompleteEntry {
            needed: buf.len() + 1,
            available: buf.len(),
        })
    }
}

/// Number of bytes `value` occupies as a varint.
pub fn varint_len(value: u64) -> usize {
    match value {
        0 => 1,
        v => (64 - v.leading_zeros() as usize).div_ceil(7),
    }
}

// ------------------------------------------------------------------------------------------------
// CRC helpers
// ------------------------------------------------------------------------------------------------

/// Computes a CRC32 (IEEE, reflected) over one or more byte slices.
pub fn compute_crc(parts: &[&[u8]]) -> u32 {
    let mut hasher = Crc32::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

/// Verifies that the CRC32 over `parts` matches `stored`.
pub fn verify_crc(parts: &[&[u8]], stored: u32) -> Result<(), ContainerError> {
    let computed = compute_crc(parts);
    if computed != stored {
        return Err(ContainerError::CrcMismatch { stored, computed });
    }
    Ok(())
}

/// Verify that `buf` has at least `needed` bytes remaining.
#[inline]
fn require(buf: &[u8], needed: usize) -> Result<(), ContainerError> {
    if buf.len() < needed {
        Err(ContainerError::IncompleteEntry {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

#[inline]
fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

#[inline]
fn read_u64_le(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_le_bytes(bytes)
}

// ------------------------------------------------------------------------------------------------
// FileHeader
// ------------------------------------------------------------------------------------------------

/// Decoded form of the fixed 46-byte file header.
///
/// The compression and encryption bytes are not interpreted by this
/// implementation; whatever a file carries is preserved verbatim when the
/// header is rewritten on close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Creation time in milliseconds since UNIX epoch.
    pub created_at: u64,

    /// Last modification time in milliseconds since UNIX epoch.
    pub modified_at: u64,

    /// Reserved flag bits; zero when written by this implementation.
    pub flags: u32,

    /// Reserved field; zero when written by this implementation.
    pub reserved: u32,

    /// The table this file belongs to.
    pub table_type: TableType,

    /// Compression codec byte (`0` = identity).
    pub compression: u8,

    /// Encryption codec byte (`0` = identity).
    pub encryption: u8,
}

impl FileHeader {
    /// Creates a fresh identity-codec header for `table_type`.
    pub fn new(table_type: TableType, created_at: u64) -> Self {
        Self {
            created_at,
            modified_at: created_at,
            flags: 0,
            reserved: 0,
            table_type,
            compression: 0,
            encryption: 0,
        }
    }

    /// Encodes the header, computing and embedding the trailing CRC32.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8] = FORMAT_VERSION;
        buf[9..17].copy_from_slice(&self.created_at.to_le_bytes());
        buf[17..25].copy_from_slice(&self.modified_at.to_le_bytes());
        buf[25..29].copy_from_slice(&self.flags.to_le_bytes());
        buf[29..33].copy_from_slice(&self.reserved.to_le_bytes());
        buf[33] = self.table_type.as_byte();
        buf[34] = self.compression;
        buf[35] = self.encryption;
        // buf[36..42] is zero padding.
        let crc = compute_crc(&[&buf[..HEADER_SIZE - 4]]);
        buf[42..46].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes and validates a header from the first [`HEADER_SIZE`] bytes
    /// of `buf`.
    ///
    /// # Errors
    ///
    /// - [`ContainerError::Truncated`] if `buf` is shorter than the header.
    /// - [`ContainerError::InvalidHeader`] on magic mismatch, CRC mismatch,
    ///   or an unknown table-type byte.
    /// - [`ContainerError::VersionTooNew`] if the version byte exceeds
    ///   [`FORMAT_VERSION`].
    pub fn decode(buf: &[u8]) -> Result<Self, ContainerError> {
        if buf.len() < HEADER_SIZE {
            return Err(ContainerError::Truncated(format!(
                "header needs {HEADER_SIZE} bytes, have {}",
                buf.len()
            )));
        }

        let stored_crc = read_u32_le(buf, HEADER_SIZE - 4);
        verify_crc(&[&buf[..HEADER_SIZE - 4]], stored_crc)
            .map_err(|_| ContainerError::InvalidHeader("header CRC mismatch".into()))?;

        if buf[0..8] != MAGIC {
            return Err(ContainerError::InvalidHeader("bad magic".into()));
        }

        let version = buf[8];
        if version > FORMAT_VERSION {
            return Err(ContainerError::VersionTooNew {
                found: version,
                supported: FORMAT_VERSION,
            });
        }

        let table_type = TableType::from_byte(buf[33]).ok_or_else(|| {
            ContainerError::InvalidHeader(format!("unknown table type byte {}", buf[33]))
        })?;

        Ok(Self {
            created_at: read_u64_le(buf, 9),
            modified_at: read_u64_le(buf, 17),
            flags: read_u32_le(buf, 25),
            reserved: read_u32_le(buf, 29),
            table_type,
            compression: buf[34],
            encryption: buf[35],
        })
    }
}

// ------------------------------------------------------------------------------------------------
// LogEntry
// ------------------------------------------------------------------------------------------------

/// A single decoded log entry from the container's entry stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// What this entry represents.
    pub kind: EntryKind,

    /// The key; empty for batch markers.
    pub key: Vec<u8>,

    /// The value; empty for tombstones and batch markers.
    pub value: Vec<u8>,

    /// Write timestamp in milliseconds.
    pub timestamp: u64,
}

impl LogEntry {
    /// Creates a data entry (`Insert`, `Update`, or `Delete`).
    pub fn data(kind: EntryKind, key: Vec<u8>, value: Vec<u8>, timestamp: u64) -> Self {
        Self {
            kind,
            key,
            value,
            timestamp,
        }
    }

    /// Creates a `BatchStart` marker.
    pub fn batch_start(timestamp: u64) -> Self {
        Self {
            kind: EntryKind::BatchStart,
            key: Vec::new(),
            value: Vec::new(),
            timestamp,
        }
    }

    /// Creates a `BatchEnd` marker.
    pub fn batch_end(timestamp: u64) -> Self {
        Self {
            kind: EntryKind::BatchEnd,
            key: Vec::new(),
            value: Vec::new(),
            timestamp,
        }
    }

    /// True if this entry is a `Delete` tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.kind == EntryKind::Delete
    }

    /// The exact number of bytes [`encode_to`](Self::encode_to) will append.
    pub fn encoded_len(&self) -> usize {
        ENTRY_FIXED_OVERHEAD
            + varint_len(self.key.len() as u64)
            + varint_len(self.value.len() as u64)
            + self.key.len()
            + self.value.len()
    }

    /// Appends the encoded entry to `buf`.
    ///
    /// # Errors
    ///
    /// [`ContainerError::EntryTooLarge`] if the key or value exceeds
    /// [`MAX_KEY_OR_VALUE_LEN`].
    pub fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), ContainerError> {
        if self.key.len() > MAX_KEY_OR_VALUE_LEN {
            return Err(ContainerError::EntryTooLarge(self.key.len()));
        }
        if self.value.len() > MAX_KEY_OR_VALUE_LEN {
            return Err(ContainerError::EntryTooLarge(self.value.len()));
        }

        buf.push(self.kind.as_byte());
        write_varint(buf, self.key.len() as u64);
        write_varint(buf, self.value.len() as u64);
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        let ts_bytes = self.timestamp.to_le_bytes();
        buf.extend_from_slice(&ts_bytes);

        let crc = compute_crc(&[&[self.kind.as_byte()], &self.key, &self.value, &ts_bytes]);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(())
    }

    /// Decodes one entry from the start of `buf`.
    ///
    /// Returns `(entry, bytes_consumed)`.
    ///
    /// # Errors
    ///
    /// - [`ContainerError::IncompleteEntry`] if `buf` ends mid-entry.
    /// - [`ContainerError::VarIntTooLarge`] on a runaway length varint.
    /// - [`ContainerError::EntryTooLarge`] if a stored length exceeds the cap.
    /// - [`ContainerError::Truncated`] on an unknown kind byte (the stream
    ///   has lost framing at this point).
    /// - [`ContainerError::CrcMismatch`] if the stored entry CRC disagrees
    ///   with the decoded bytes.
    pub fn decode_from(buf: &[u8]) -> Result<(Self, usize), ContainerError> {
        require(buf, 1)?;
        let kind = EntryKind::from_byte(buf[0]).ok_or_else(|| {
            ContainerError::Truncated(format!("unknown entry kind byte {}", buf[0]))
        })?;
        let mut offset = 1;

        let (key_len, n) = read_varint(&buf[offset..])?;
        offset += n;
        let (value_len, n) = read_varint(&buf[offset..])?;
        offset += n;

        if key_len as usize > MAX_KEY_OR_VALUE_LEN {
            return Err(ContainerError::EntryTooLarge(key_len as usize));
        }
        if value_len as usize > MAX_KEY_OR_VALUE_LEN {
            return Err(ContainerError::EntryTooLarge(value_len as usize));
        }
        let key_len = key_len as usize;
        let value_len = value_len as usize;

        require(&buf[offset..], key_len + value_len + 8 + 4)?;

        let key = buf[offset..offset + key_len].to_vec();
        offset += key_len;
        let value = buf[offset..offset + value_len].to_vec();
        offset += value_len;

        let ts_bytes: [u8; 8] = buf[offset..offset + 8]
            .try_into()
            .map_err(|_| ContainerError::IncompleteEntry {
                needed: 8,
                available: buf.len() - offset,
            })?;
        let timestamp = u64::from_le_bytes(ts_bytes);
        offset += 8;

        let stored_crc = read_u32_le(buf, offset);
        offset += 4;

        verify_crc(&[&[kind.as_byte()], &key, &value, &ts_bytes], stored_crc)?;

        Ok((
            Self {
                kind,
                key,
                value,
                timestamp,
            },
            offset,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// EntryFrame — structure-only view of an encoded entry
// ------------------------------------------------------------------------------------------------

/// The framing of one encoded entry, parsed without verifying its CRC.
///
/// Used when rebuilding an sstable index: the frame pins down each
/// entry's key, kind, and extent, while CRC verification is deferred to
/// the read that actually consumes the entry (a corrupt entry then
/// surfaces as a counted miss rather than an unreadable file).
#[derive(Debug, Clone)]
pub struct EntryFrame {
    /// The entry's kind byte.
    pub kind: EntryKind,

    /// The key bytes; empty for batch markers.
    pub key: Vec<u8>,

    /// Stored value length in bytes (the value itself is not copied).
    pub value_len: usize,

    /// Write timestamp in milliseconds.
    pub timestamp: u64,
}

impl EntryFrame {
    /// Parses the frame of one entry from the start of `buf` **without**
    /// checking the entry CRC.
    ///
    /// Returns `(frame, bytes_consumed)`. Framing failures (short buffer,
    /// runaway varint, oversized length, unknown kind byte) still error —
    /// once framing is lost, the rest of the stream is unreadable.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), ContainerError> {
        require(buf, 1)?;
        let kind = EntryKind::from_byte(buf[0]).ok_or_else(|| {
            ContainerError::Truncated(format!("unknown entry kind byte {}", buf[0]))
        })?;
        let mut offset = 1;

        let (key_len, n) = read_varint(&buf[offset..])?;
        offset += n;
        let (value_len, n) = read_varint(&buf[offset..])?;
        offset += n;

        if key_len as usize > MAX_KEY_OR_VALUE_LEN {
            return Err(ContainerError::EntryTooLarge(key_len as usize));
        }
        if value_len as usize > MAX_KEY_OR_VALUE_LEN {
            return Err(ContainerError::EntryTooLarge(value_len as usize));
        }
        let key_len = key_len as usize;
        let value_len = value_len as usize;

        require(&buf[offset..], key_len + value_len + 8 + 4)?;

        let key = buf[offset..offset + key_len].to_vec();
        offset += key_len + value_len;

        let mut ts_bytes = [0u8; 8];
        ts_bytes.copy_from_slice(&buf[offset..offset + 8]);
        let timestamp = u64::from_le_bytes(ts_bytes);
        offset += 8 + 4;

        Ok((
            Self {
                kind,
                key,
                value_len,
                timestamp,
            },
            offset,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// FileFooter
// ------------------------------------------------------------------------------------------------

/// Decoded form of the fixed 52-byte statistics footer.
///
/// The footer is rewritten each time a file is sealed; its `file_crc`
/// covers the entry region `[data_offset, file_size − FOOTER_SIZE)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFooter {
    /// Number of data entries (batch markers excluded).
    pub entry_count: u64,

    /// Total file size in bytes, footer included.
    pub file_size: u64,

    /// Offset where the entry stream begins (= [`HEADER_SIZE`]).
    pub data_offset: u64,

    /// Encoded size of the largest single entry.
    pub max_entry_size: u32,

    /// Sum of all data-entry key lengths.
    pub total_key_size: u64,

    /// Sum of all data-entry value lengths.
    pub total_value_size: u64,

    /// Compression ratio as percent × 100 (`10000` for identity).
    pub compression_ratio: u16,

    /// CRC32 over the entry region.
    pub file_crc: u32,
}

impl FileFooter {
    /// Encodes the footer into its fixed 52-byte layout.
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..8].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[8..16].copy_from_slice(&self.file_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.data_offset.to_le_bytes());
        buf[24..28].copy_from_slice(&self.max_entry_size.to_le_bytes());
        buf[28..36].copy_from_slice(&self.total_key_size.to_le_bytes());
        buf[36..44].copy_from_slice(&self.total_value_size.to_le_bytes());
        buf[44..46].copy_from_slice(&self.compression_ratio.to_le_bytes());
        // buf[46..48] is zero padding.
        buf[48..52].copy_from_slice(&self.file_crc.to_le_bytes());
        buf
    }

    /// Decodes a footer from the first [`FOOTER_SIZE`] bytes of `buf`.
    ///
    /// Field-level validation (file size agreement, entry-region CRC) is the
    /// caller's responsibility — the footer itself carries no self-checksum.
    pub fn decode(buf: &[u8]) -> Result<Self, ContainerError> {
        if buf.len() < FOOTER_SIZE {
            return Err(ContainerError::Truncated(format!(
                "footer needs {FOOTER_SIZE} bytes, have {}",
                buf.len()
            )));
        }

        Ok(Self {
            entry_count: read_u64_le(buf, 0),
            file_size: read_u64_le(buf, 8),
            data_offset: read_u64_le(buf, 16),
            max_entry_size: read_u32_le(buf, 24),
            total_key_size: read_u64_le(buf, 28),
            total_value_size: read_u64_le(buf, 36),
            compression_ratio: read_u16_le(buf, 44),
            file_crc: read_u32_le(buf, 48),
        })
    }
}

//! Engine utilities — the shared record type, merge ordering, k-way merge
//! iterator, visibility filter, and the write-timestamp clock.
//!
//! This module defines:
//!
//! - [`Record`] — the unified in-memory representation of a stored entry
//!   used across all engine layers (memtable, sstable, compaction, scan).
//! - [`MergeIterator`] — a heap-based k-way merge iterator that combines
//!   multiple sorted record streams into a single stream ordered by
//!   `(key ASC, timestamp DESC, source recency)`.
//! - [`VisibilityFilter`] — collapses a merged stream to one visible value
//!   per key, suppressing tombstoned keys.
//! - [`monotonic_millis`] — the process-wide, never-decreasing millisecond
//!   clock used to stamp writes.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::container::EntryKind;

// ------------------------------------------------------------------------------------------------
// Record
// ------------------------------------------------------------------------------------------------

/// A single stored entry as it travels between engine layers.
///
/// The `heat` field is a transient, runtime-only score in `[0.0, 1.0]`
/// maintained by the memtable; it is never persisted and is ignored by
/// equality.
#[derive(Debug, Clone)]
pub struct Record {
    /// The key (opaque bytes).
    pub key: Vec<u8>,

    /// The value (opaque bytes); empty for tombstones.
    pub value: Vec<u8>,

    /// Write timestamp in milliseconds, used only for merge tie-breaking.
    pub timestamp: u64,

    /// The audit kind this record was written with.
    pub kind: EntryKind,

    /// True when this record is a tombstone.
    pub deleted: bool,

    /// Transient access-frequency score; not persisted.
    pub heat: f32,
}

impl Record {
    /// Creates a fresh `Insert` record.
    pub fn insert(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, timestamp: u64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            timestamp,
            kind: EntryKind::Insert,
            deleted: false,
            heat: 0.0,
        }
    }

    /// Creates an `Update` record (equivalent to `Insert` for visibility).
    pub fn update(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, timestamp: u64) -> Self {
        Self {
            kind: EntryKind::Update,
            ..Self::insert(key, value, timestamp)
        }
    }

    /// Creates a `Delete` tombstone.
    pub fn tombstone(key: impl Into<Vec<u8>>, timestamp: u64) -> Self {
        Self {
            key: key.into(),
            value: Vec::new(),
            timestamp,
            kind: EntryKind::Delete,
            deleted: true,
            heat: 0.0,
        }
    }

    /// Approximate in-memory footprint used for memtable accounting.
    pub fn accounted_size(&self) -> usize {
        std::mem::size_of::<Record>() + self.key.len() + self.value.len()
    }
}

/// Equality ignores the transient heat score.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.deleted == other.deleted
            && self.timestamp == other.timestamp
            && self.key == other.key
            && self.value == other.value
    }
}

impl Eq for Record {}

// ------------------------------------------------------------------------------------------------
// Merge ordering — (key ASC, timestamp DESC)
// ------------------------------------------------------------------------------------------------

/// Compares two records by `(key ASC, timestamp DESC)`.
///
/// For a given key the newest record sorts first, ensuring merge
/// consumers see the winning version before older ones. Exact timestamp
/// ties are left `Equal` here; [`MergeIterator`] breaks them by source
/// recency.
pub fn record_cmp(a: &Record, b: &Record) -> Ordering {
    match a.key.cmp(&b.key) {
        Ordering::Equal => b.timestamp.cmp(&a.timestamp),
        ord => ord,
    }
}

// ------------------------------------------------------------------------------------------------
// MergeIterator — heap-based k-way merge over Record streams
// ------------------------------------------------------------------------------------------------

/// A heap-based merge iterator yielding [`Record`]s from multiple sorted
/// sources in `(key ASC, timestamp DESC, source recency)` order.
///
/// Sources **must** be passed newest-first: on an exact `(key, timestamp)`
/// tie the lower source index wins, which is what makes newest-file-first
/// Level-0 merges deterministic.
///
/// Used by both the engine range-scan path and the compaction merge core.
/// The lifetime `'a` bounds any borrowed state inside the source
/// iterators; pass `'static` when the sources own their data.
pub struct MergeIterator<'a> {
    iters: Vec<Box<dyn Iterator<Item = Record> + 'a>>,
    heap: BinaryHeap<MergeHeapEntry<'a>>,
}

struct MergeHeapEntry<'a> {
    record: Record,
    source_idx: usize,
    /// Marker so the struct is invariant over `'a` without storing a
    /// reference — the borrowed data lives inside the iterator.
    _marker: std::marker::PhantomData<&'a ()>,
}

impl Ord for MergeHeapEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: reverse so the smallest key / newest timestamp /
        // newest source pops first.
        record_cmp(&self.record, &other.record)
            .then_with(|| self.source_idx.cmp(&other.source_idx))
            .reverse()
    }
}

impl PartialOrd for MergeHeapEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MergeHeapEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeHeapEntry<'_> {}

impl<'a> MergeIterator<'a> {
    /// Builds a merge over the given sources, newest source first.
    pub fn new(mut iters: Vec<Box<dyn Iterator<Item = Record> + 'a>>) -> Self {
        let mut heap = BinaryHeap::new();

        for (idx, iter) in iters.iter_mut().enumerate() {
            if let Some(record) = iter.next() {
                heap.push(MergeHeapEntry {
                    record,
                    source_idx: idx,
                    _marker: std::marker::PhantomData,
                });
            }
        }

        Self { iters, heap }
    }
}

impl Iterator for MergeIterator<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.heap.pop()?;
        let result = entry.record;
        let idx = entry.source_idx;

        if let Some(next_record) = self.iters[idx].next() {
            self.heap.push(MergeHeapEntry {
                record: next_record,
                source_idx: idx,
                _marker: std::marker::PhantomData,
            });
        }

        Some(result)
    }
}

// ------------------------------------------------------------------------------------------------
// VisibilityFilter
// ------------------------------------------------------------------------------------------------

/// Filters a merged record stream down to visible `(key, value)` pairs.
///
/// The input **must** be ordered `(key ASC, timestamp DESC, source
/// recency)` — the order produced by [`MergeIterator`]. For each distinct
/// key the first record is the winner; it is emitted unless it is a
/// tombstone, and every older version of the key is discarded.
pub struct VisibilityFilter<I>
where
    I: Iterator<Item = Record>,
{
    /// Underlying merged record stream.
    input: I,
    /// The key most recently emitted or suppressed (used for dedup).
    current_key: Option<Vec<u8>>,
}

impl<I> VisibilityFilter<I>
where
    I: Iterator<Item = Record>,
{
    pub fn new(input: I) -> Self {
        Self {
            input,
            current_key: None,
        }
    }
}

impl<I> Iterator for VisibilityFilter<I>
where
    I: Iterator<Item = Record>,
{
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        for record in self.input.by_ref() {
            // Older version of a key we already resolved — skip.
            if self.current_key.as_deref() == Some(record.key.as_slice()) {
                continue;
            }

            self.current_key = Some(record.key.clone());

            if record.deleted {
                continue;
            }

            return Some((record.key, record.value));
        }

        None
    }
}

// ------------------------------------------------------------------------------------------------
// Write clock
// ------------------------------------------------------------------------------------------------

static LAST_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Returns the current time in milliseconds since the UNIX epoch, clamped
/// so that it never decreases within this process.
///
/// Timestamps only break ties between duplicate keys during merge; they
/// are never relied on for visibility. The clamp keeps tie-breaking
/// stable when the wall clock steps backwards.
pub fn monotonic_millis() -> u64 {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    LAST_MILLIS.fetch_max(wall, AtomicOrdering::SeqCst);
    LAST_MILLIS.load(AtomicOrdering::SeqCst)
}

// ------------------------------------------------------------------------------------------------
// Tracing helper
// ------------------------------------------------------------------------------------------------

/// Displays a key as abbreviated hex for trace output.
pub(crate) struct HexKey<'a>(pub &'a [u8]);

impl std::fmt::Display for HexKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.len() <= 32 {
            for byte in self.0 {
                write!(f, "{byte:02x}")?;
            }
        } else {
            for byte in &self.0[..16] {
                write!(f, "{byte:02x}")?;
            }
            write!(f, "...[{} bytes]", self.0.len())?;
        }
        Ok(())
    }
}

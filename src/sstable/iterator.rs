//! Range-scan iterator over a single sstable.
//!
//! The iterator walks the in-memory index from the lower bound forward,
//! decoding each entry out of the mapping with its CRC verified. Corrupt
//! entries are skipped (and counted by the table); the scan keeps going.

use crate::engine::utils::Record;
use crate::sstable::SSTable;

/// Iterator over the records of one sstable within `[low, high]`
/// (inclusive), in key order.
///
/// Tombstones are yielded — merging layers apply shadowing.
pub struct RangeScan<'a> {
    table: &'a SSTable,
    pos: usize,
    high: Vec<u8>,
}

impl<'a> RangeScan<'a> {
    pub(crate) fn new(table: &'a SSTable, low: &[u8], high: &[u8]) -> Self {
        // First index slot at or past the lower bound.
        let pos = table.index().partition_point(|e| e.key.as_slice() < low);
        Self {
            table,
            pos,
            high: high.to_vec(),
        }
    }
}

impl Iterator for RangeScan<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.table.index();

        while self.pos < index.len() {
            let entry = &index[self.pos];
            if entry.key.as_slice() > self.high.as_slice() {
                return None;
            }
            self.pos += 1;

            // A corrupt entry reads as None; skip it and continue.
            if let Some(record) = self.table.read_entry(entry) {
                return Some(record);
            }
        }

        None
    }
}

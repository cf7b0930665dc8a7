//! # Memtable Module
//!
//! ## Design Invariants
//!
//! - Records are kept in insertion order; a parallel map points each key
//!   at the index of its latest record.
//! - `put` overwrites the latest record for an existing key in place;
//!   `delete` always appends a tombstone.
//! - Deletes are represented via tombstones, not physical removal, so a
//!   flush carries them down to the sstables where compaction can honor
//!   them.
//! - The accounted byte size tracks every live record; a write that would
//!   push it past the configured maximum fails with
//!   [`MemtableError::OutOfCapacity`] instead of growing unbounded.
//!
//! ## Flush Semantics
//!
//! - [`Memtable::should_flush`] reports true once the accounted size
//!   reaches 80% of the maximum; the engine drains at that point.
//! - [`Memtable::drain_sorted`] returns the latest record per key sorted
//!   by `(key ASC, timestamp DESC)`, tombstones included, and clears the
//!   buffer.
//!
//! ## Heat
//!
//! Each record carries a transient heat score in `[0.0, 1.0]`: +0.1 on
//! every `put` of its key, ×1.1 on every `get` hit, both capped at 1.0.
//! The score seeds hot-cache admission decisions and is never persisted.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use thiserror::Error;
use tracing::{error, trace};

use crate::container::EntryKind;
use crate::engine::utils::{HexKey, Record, monotonic_millis};

const PUT_HEAT_INCREMENT: f32 = 0.1;
const GET_HEAT_FACTOR: f32 = 1.1;
const FLUSH_THRESHOLD_RATIO: f64 = 0.8;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Represents possible errors returned by [`Memtable`] operations.
#[derive(Debug, Error)]
pub enum MemtableError {
    /// The write would push the accounted size past the configured
    /// maximum; the caller should flush and retry.
    #[error("memtable over capacity (need {needed} bytes, max {max})")]
    OutOfCapacity {
        /// Accounted size the write would have produced.
        needed: usize,
        /// Configured maximum accounted size.
        max: usize,
    },

    /// Internal invariant violation or poisoned lock.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Memtable Core
// ------------------------------------------------------------------------------------------------

/// The mutable, in-memory write buffer of the storage engine.
///
/// The memtable:
/// - Accepts writes (`put`, `delete`)
/// - Serves point reads (`get`) and snapshot range reads
/// - Is drained to a sorted record sequence on flush
///
/// # Concurrency
/// - All operations go through an internal `RwLock`; `get` takes the
///   write side briefly because a hit bumps the record's heat score.
pub struct Memtable {
    /// Thread-safe container for in-memory data and metadata.
    inner: Arc<RwLock<MemtableInner>>,

    /// Configured maximum accounted size in bytes.
    max_bytes: usize,
}

/// Internal shared state of the memtable.
///
/// This structure is protected by an `RwLock` and must never be accessed
/// directly outside the memtable implementation.
struct MemtableInner {
    /// Records in insertion order. Overwritten keys are updated in place;
    /// tombstones are appended.
    log: Vec<Record>,

    /// Key → index of the latest record for that key in `log`.
    latest: HashMap<Vec<u8>, usize>,

    /// Approximate in-memory footprint of all live records.
    accounted_bytes: usize,
}

impl Memtable {
    /// Creates an empty memtable with the given maximum accounted size.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemtableInner {
                log: Vec::new(),
                latest: HashMap::new(),
                accounted_bytes: 0,
            })),
            max_bytes,
        }
    }

    /// Inserts or updates a key with a new value.
    ///
    /// # Behavior
    /// - An existing key's latest record is overwritten in place and the
    ///   accounted size adjusted by the delta; a new key appends.
    /// - The record's heat score gains +0.1, capped at 1.0.
    /// - A fresh write timestamp is assigned from the monotonic clock.
    ///
    /// # Errors
    /// [`MemtableError::OutOfCapacity`] if the new accounted size would
    /// exceed the configured maximum; the memtable is left unchanged.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>, kind: EntryKind) -> Result<(), MemtableError> {
        trace!("put() started, key: {}", HexKey(&key));

        let timestamp = monotonic_millis();
        let mut guard = self.write_guard("put")?;

        let mut record = Record {
            key: key.clone(),
            value,
            timestamp,
            kind,
            deleted: kind == EntryKind::Delete,
            heat: 0.0,
        };
        let new_size = record.accounted_size();

        match guard.latest.get(&key).copied() {
            Some(idx) => {
                let old = &guard.log[idx];
                let old_size = old.accounted_size();
                let projected = guard.accounted_bytes - old_size + new_size;
                if projected > self.max_bytes {
                    return Err(MemtableError::OutOfCapacity {
                        needed: projected,
                        max: self.max_bytes,
                    });
                }

                record.heat = (old.heat + PUT_HEAT_INCREMENT).min(1.0);
                guard.log[idx] = record;
                guard.accounted_bytes = projected;
            }
            None => {
                let projected = guard.accounted_bytes + new_size;
                if projected > self.max_bytes {
                    return Err(MemtableError::OutOfCapacity {
                        needed: projected,
                        max: self.max_bytes,
                    });
                }

                record.heat = PUT_HEAT_INCREMENT;
                let idx = guard.log.len();
                guard.log.push(record);
                guard.latest.insert(key.clone(), idx);
                guard.accounted_bytes = projected;
            }
        }

        trace!(
            timestamp,
            accounted = guard.accounted_bytes,
            "put completed, key: {}",
            HexKey(&key)
        );
        Ok(())
    }

    /// Returns the latest non-tombstone record for `key`, or `None`.
    ///
    /// A hit multiplies the record's heat score by 1.1 (capped at 1.0),
    /// which is why this takes the write side of the lock.
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>, MemtableError> {
        Ok(self.get_raw(key)?.filter(|record| !record.deleted))
    }

    /// Returns the latest record for `key` regardless of tombstone state.
    ///
    /// The engine read path needs to see tombstones so they can shadow
    /// older sstable versions. A live hit warms the record exactly like
    /// [`get`](Self::get); tombstone hits do not.
    pub fn get_raw(&self, key: &[u8]) -> Result<Option<Record>, MemtableError> {
        let mut guard = self.write_guard("get_raw")?;

        let Some(idx) = guard.latest.get(key).copied() else {
            return Ok(None);
        };

        let record = &mut guard.log[idx];
        if !record.deleted {
            record.heat = (record.heat * GET_HEAT_FACTOR).min(1.0);
        }
        Ok(Some(record.clone()))
    }

    /// Appends a tombstone record for `key`.
    ///
    /// The tombstone becomes the key's latest record; any earlier record
    /// stays in the log until the next drain.
    pub fn delete(&self, key: Vec<u8>) -> Result<(), MemtableError> {
        trace!("delete() started, key: {}", HexKey(&key));

        let timestamp = monotonic_millis();
        let mut guard = self.write_guard("delete")?;

        let record = Record::tombstone(key.clone(), timestamp);
        let projected = guard.accounted_bytes + record.accounted_size();
        if projected > self.max_bytes {
            return Err(MemtableError::OutOfCapacity {
                needed: projected,
                max: self.max_bytes,
            });
        }

        let idx = guard.log.len();
        guard.log.push(record);
        guard.latest.insert(key.clone(), idx);
        guard.accounted_bytes = projected;

        trace!(timestamp, "delete completed, key: {}", HexKey(&key));
        Ok(())
    }

    /// True once the accounted size has reached 80% of the maximum.
    pub fn should_flush(&self) -> bool {
        match self.inner.read() {
            Ok(guard) => {
                guard.accounted_bytes as f64 >= self.max_bytes as f64 * FLUSH_THRESHOLD_RATIO
            }
            Err(_) => false,
        }
    }

    /// Non-destructive snapshot of the latest record per key, sorted by
    /// `(key ASC, timestamp DESC)`, tombstones included.
    ///
    /// The flush path builds the sstable from this snapshot and calls
    /// [`clear`](Self::clear) only once the file is sealed, so a failed
    /// build leaves every buffered record in place.
    pub fn snapshot_sorted(&self) -> Result<Vec<Record>, MemtableError> {
        let guard = self.read_guard("snapshot_sorted")?;

        let mut records: Vec<Record> = guard
            .latest
            .values()
            .map(|&idx| guard.log[idx].clone())
            .collect();
        records.sort_by(crate::engine::utils::record_cmp);

        Ok(records)
    }

    /// Discards all buffered records and resets the accounting.
    pub fn clear(&self) -> Result<(), MemtableError> {
        let mut guard = self.write_guard("clear")?;
        guard.log.clear();
        guard.latest.clear();
        guard.accounted_bytes = 0;
        Ok(())
    }

    /// Drains the memtable: returns the latest record per key sorted by
    /// `(key ASC, timestamp DESC)`, tombstones included, and clears all
    /// state.
    ///
    /// After draining, no two returned records share a key.
    pub fn drain_sorted(&self) -> Result<Vec<Record>, MemtableError> {
        let records = self.snapshot_sorted()?;
        self.clear()?;

        trace!(drained = records.len(), "memtable drained");
        Ok(records)
    }

    /// Non-destructive snapshot of the latest record per key within
    /// `[low, high]` (inclusive), sorted by key, tombstones included.
    ///
    /// Feeds the engine's merge-sorted range scan; heat is not touched.
    pub fn snapshot_range(&self, low: &[u8], high: &[u8]) -> Result<Vec<Record>, MemtableError> {
        let guard = self.read_guard("snapshot_range")?;

        let mut records: Vec<Record> = guard
            .latest
            .iter()
            .filter(|(key, _)| key.as_slice() >= low && key.as_slice() <= high)
            .map(|(_, &idx)| guard.log[idx].clone())
            .collect();
        records.sort_by(crate::engine::utils::record_cmp);

        Ok(records)
    }

    /// Number of distinct live keys.
    pub fn len(&self) -> usize {
        self.inner.read().map(|guard| guard.latest.len()).unwrap_or(0)
    }

    /// True when no records are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current accounted size in bytes.
    pub fn accounted_bytes(&self) -> usize {
        self.inner
            .read()
            .map(|guard| guard.accounted_bytes)
            .unwrap_or(0)
    }

    /// Configured maximum accounted size in bytes.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Current heat score for `key`, if buffered.
    pub fn heat(&self, key: &[u8]) -> Option<f32> {
        let guard = self.inner.read().ok()?;
        guard.latest.get(key).map(|&idx| guard.log[idx].heat)
    }

    fn write_guard(
        &self,
        op: &str,
    ) -> Result<std::sync::RwLockWriteGuard<'_, MemtableInner>, MemtableError> {
        self.inner.write().map_err(|_| {
            error!("read-write lock poisoned during {op}");
            MemtableError::Internal("RwLock poisoned".into())
        })
    }

    fn read_guard(
        &self,
        op: &str,
    ) -> Result<std::sync::RwLockReadGuard<'_, MemtableInner>, MemtableError> {
        self.inner.read().map_err(|_| {
            error!("read-write lock poisoned during {op}");
            MemtableError::Internal("RwLock poisoned".into())
        })
    }
}

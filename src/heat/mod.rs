//! Heat Tracker Module
//!
//! Per-key access-frequency accounting with time decay. The tracker is the
//! **source of truth** for hotness: the hot cache in front of the read
//! path is only a shortcut and never feeds heat back.
//!
//! ## Model
//!
//! Every access adds a kind-weighted increment to the key's raw heat
//! (saturating): Read = 1, Write = 2, Delete = 3, Compact = 4. The
//! *effective* heat decays exponentially with the time since the last
//! access — one configured factor (default 0.95) per 60-second cycle,
//! with fractional cycles computed from elapsed seconds. A maintenance
//! sweep evicts entries whose effective heat has fallen below 1.
//!
//! ## Workload signal
//!
//! Aggregate read/write/delete counters classify the workload as
//! write-heavy, read-heavy, or mixed; the hybrid compaction strategy
//! keys off this signal.

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
    sync::RwLock,
};

use tracing::{debug, trace};

use crate::engine::utils::{HexKey, monotonic_millis};

/// Length of one decay cycle in milliseconds.
pub const DECAY_CYCLE_MS: u64 = 60_000;

/// Entries whose effective heat falls below this are evicted.
pub const EVICTION_FLOOR: f64 = 1.0;

const PATTERN_HASH_PRIME: u64 = 0x0000_0100_0000_01B3;

// ------------------------------------------------------------------------------------------------
// Access kinds
// ------------------------------------------------------------------------------------------------

/// The kind of access being recorded, in increasing heat weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// A point or range read.
    Read,
    /// A put.
    Write,
    /// A delete.
    Delete,
    /// A compaction touched the key.
    Compact,
}

impl AccessKind {
    /// Heat added by one access of this kind.
    pub fn increment(self) -> u32 {
        match self {
            AccessKind::Read => 1,
            AccessKind::Write => 2,
            AccessKind::Delete => 3,
            AccessKind::Compact => 4,
        }
    }
}

/// Coarse classification of the recent workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadSignal {
    /// Mutations dominate reads.
    WriteHeavy,
    /// Reads dominate mutations.
    ReadHeavy,
    /// Neither side dominates.
    Mixed,
}

// ------------------------------------------------------------------------------------------------
// HeatEntry
// ------------------------------------------------------------------------------------------------

/// Tracked state for one key.
#[derive(Debug, Clone)]
pub struct HeatEntry {
    /// Raw accumulated heat (kind-weighted, saturating).
    pub heat: u32,

    /// Number of accesses recorded.
    pub access_count: u32,

    /// Milliseconds timestamp of the most recent access.
    pub last_access: u64,

    /// Milliseconds timestamp of the first access.
    pub created_at: u64,

    /// Rolling hash over inter-access gaps, for workload diagnostics.
    pub pattern_hash: u64,
}

impl HeatEntry {
    /// Effective heat at `now_ms`: raw heat decayed by the configured
    /// factor once per elapsed 60-second cycle (fractional cycles from
    /// elapsed seconds).
    pub fn effective_heat(&self, now_ms: u64, decay_factor: f64) -> f64 {
        let elapsed_ms = now_ms.saturating_sub(self.last_access);
        let cycles = elapsed_ms as f64 / DECAY_CYCLE_MS as f64;
        f64::from(self.heat) * decay_factor.powf(cycles)
    }
}

// ------------------------------------------------------------------------------------------------
// HeatTracker
// ------------------------------------------------------------------------------------------------

struct HeatInner {
    entries: HashMap<Vec<u8>, HeatEntry>,
    reads: u64,
    writes: u64,
    deletes: u64,
    last_sweep_ms: u64,
}

/// Tracks per-key access frequency with exponential time decay.
pub struct HeatTracker {
    inner: RwLock<HeatInner>,
    decay_factor: f64,
}

impl HeatTracker {
    /// Creates a tracker with the given per-cycle decay factor.
    pub fn new(decay_factor: f64) -> Self {
        Self {
            inner: RwLock::new(HeatInner {
                entries: HashMap::new(),
                reads: 0,
                writes: 0,
                deletes: 0,
                last_sweep_ms: 0,
            }),
            decay_factor,
        }
    }

    /// Records one access of `kind` against `key` at the current time.
    pub fn record_access(&self, key: &[u8], kind: AccessKind) {
        self.record_access_at(key, kind, monotonic_millis());
    }

    /// Records one access at an explicit timestamp.
    pub fn record_access_at(&self, key: &[u8], kind: AccessKind, now_ms: u64) {
        let Ok(mut inner) = self.inner.write() else {
            return;
        };

        match kind {
            AccessKind::Read => inner.reads += 1,
            AccessKind::Write => inner.writes += 1,
            AccessKind::Delete => inner.deletes += 1,
            AccessKind::Compact => {}
        }

        match inner.entries.get_mut(key) {
            Some(entry) => {
                let gap = now_ms.saturating_sub(entry.last_access);
                entry.heat = entry.heat.saturating_add(kind.increment());
                entry.access_count = entry.access_count.saturating_add(1);
                entry.pattern_hash = (entry.pattern_hash ^ gap).wrapping_mul(PATTERN_HASH_PRIME);
                entry.last_access = now_ms;
            }
            None => {
                inner.entries.insert(
                    key.to_vec(),
                    HeatEntry {
                        heat: kind.increment(),
                        access_count: 1,
                        last_access: now_ms,
                        created_at: now_ms,
                        pattern_hash: PATTERN_HASH_PRIME,
                    },
                );
            }
        }

        trace!(kind = ?kind, "access recorded, key: {}", HexKey(key));
    }

    /// Effective (decayed) heat for `key` at the current time, or 0.
    pub fn effective_heat(&self, key: &[u8]) -> f64 {
        self.effective_heat_at(key, monotonic_millis())
    }

    /// Effective heat at an explicit timestamp.
    pub fn effective_heat_at(&self, key: &[u8], now_ms: u64) -> f64 {
        let Ok(inner) = self.inner.read() else {
            return 0.0;
        };
        inner
            .entries
            .get(key)
            .map(|e| e.effective_heat(now_ms, self.decay_factor))
            .unwrap_or(0.0)
    }

    /// Snapshot of the tracked entry for `key`.
    pub fn entry(&self, key: &[u8]) -> Option<HeatEntry> {
        self.inner.read().ok()?.entries.get(key).cloned()
    }

    /// Runs one decay sweep if a full cycle has elapsed since the last.
    ///
    /// Returns the number of entries evicted. Called opportunistically
    /// from the engine's hot paths; cheap when the cycle has not elapsed.
    pub fn maybe_sweep(&self) -> usize {
        self.maybe_sweep_at(monotonic_millis())
    }

    /// Sweep gate at an explicit timestamp.
    pub fn maybe_sweep_at(&self, now_ms: u64) -> usize {
        {
            let Ok(inner) = self.inner.read() else {
                return 0;
            };
            if now_ms.saturating_sub(inner.last_sweep_ms) < DECAY_CYCLE_MS {
                return 0;
            }
        }
        self.sweep_at(now_ms)
    }

    /// Unconditionally evicts every entry whose effective heat at
    /// `now_ms` is below [`EVICTION_FLOOR`]. Returns the eviction count.
    pub fn sweep_at(&self, now_ms: u64) -> usize {
        let Ok(mut inner) = self.inner.write() else {
            return 0;
        };
        let decay_factor = self.decay_factor;
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, e| e.effective_heat(now_ms, decay_factor) >= EVICTION_FLOOR);
        inner.last_sweep_ms = now_ms;
        let evicted = before - inner.entries.len();
        if evicted > 0 {
            debug!(evicted, live = inner.entries.len(), "heat sweep evicted cold keys");
        }
        evicted
    }

    /// The `n` keys with the highest effective heat, hottest first.
    pub fn hot_keys(&self, n: usize) -> Vec<Vec<u8>> {
        self.hot_keys_at(n, monotonic_millis())
    }

    /// Hot-key extraction at an explicit timestamp.
    pub fn hot_keys_at(&self, n: usize, now_ms: u64) -> Vec<Vec<u8>> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };

        let mut scored: Vec<(f64, &Vec<u8>)> = inner
            .entries
            .iter()
            .map(|(key, e)| (e.effective_heat(now_ms, self.decay_factor), key))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(n).map(|(_, key)| key.clone()).collect()
    }

    /// Number of live tracked keys.
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.entries.len()).unwrap_or(0)
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classifies the workload from the aggregate access counters.
    ///
    /// Mutations dominating reads 2:1 reads as write-heavy; the reverse
    /// as read-heavy; anything in between as mixed.
    pub fn workload(&self) -> WorkloadSignal {
        let Ok(inner) = self.inner.read() else {
            return WorkloadSignal::Mixed;
        };
        let mutations = inner.writes + inner.deletes;
        let reads = inner.reads;

        if mutations > reads.saturating_mul(2) {
            WorkloadSignal::WriteHeavy
        } else if reads > mutations.saturating_mul(2) {
            WorkloadSignal::ReadHeavy
        } else {
            WorkloadSignal::Mixed
        }
    }
}

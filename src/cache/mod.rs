//! Hot Cache Module
//!
//! A bounded, heat-ordered value cache that sits in front of the
//! memtable/sstable search. Admission is driven by the heat tracker (the
//! engine inserts a value once its key's effective heat crosses the hot
//! threshold); eviction removes the entry with the **lowest heat**, ties
//! broken by the **oldest last access**.
//!
//! The cache is a read-through shortcut only: it never feeds heat back
//! into the tracker, and the engine invalidates a key's cached value on
//! every write to that key so read-your-writes holds.

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
    sync::{
        RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::trace;

use crate::engine::utils::{HexKey, monotonic_millis};

// ------------------------------------------------------------------------------------------------
// CachedValue
// ------------------------------------------------------------------------------------------------

/// One cached value together with its admission heat and usage stats.
#[derive(Debug, Clone)]
pub struct CachedValue {
    /// The cached value bytes.
    pub value: Vec<u8>,

    /// Effective heat at admission (or the last refresh).
    pub heat: f64,

    /// Milliseconds timestamp of the last cache hit or admission.
    pub last_access: u64,

    /// Number of cache hits served from this entry.
    pub access_count: u32,
}

// ------------------------------------------------------------------------------------------------
// HotCache
// ------------------------------------------------------------------------------------------------

/// Bounded map from hot keys to their values.
pub struct HotCache {
    inner: RwLock<HashMap<Vec<u8>, CachedValue>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HotCache {
    /// Creates a cache bounded at `capacity` entries. A capacity of 0
    /// disables caching entirely.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks up `key`, refreshing its usage stats on a hit.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let Ok(mut inner) = self.inner.write() else {
            return None;
        };

        match inner.get_mut(key) {
            Some(cached) => {
                cached.last_access = monotonic_millis();
                cached.access_count = cached.access_count.saturating_add(1);
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!("hot cache hit, key: {}", HexKey(key));
                Some(cached.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Admits (or refreshes) a value with the given effective heat.
    ///
    /// When the cache is full and `key` is new, the entry with the lowest
    /// heat is evicted first — ties broken by the oldest last access.
    pub fn insert(&self, key: Vec<u8>, value: Vec<u8>, heat: f64) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut inner) = self.inner.write() else {
            return;
        };

        if !inner.contains_key(&key) && inner.len() >= self.capacity {
            let victim = inner
                .iter()
                .min_by(|(_, a), (_, b)| {
                    a.heat
                        .partial_cmp(&b.heat)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.last_access.cmp(&b.last_access))
                })
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                trace!("hot cache evicting, key: {}", HexKey(&victim));
                inner.remove(&victim);
            }
        }

        inner.insert(
            key,
            CachedValue {
                value,
                heat,
                last_access: monotonic_millis(),
                access_count: 0,
            },
        );
    }

    /// Drops a key's cached value; used by the engine to keep
    /// read-your-writes intact on every mutation.
    pub fn remove(&self, key: &[u8]) {
        if let Ok(mut inner) = self.inner.write() {
            inner.remove(key);
        }
    }

    /// Drops every cached value.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.clear();
        }
    }

    /// Snapshot of a cached entry, without touching its stats.
    pub fn peek(&self, key: &[u8]) -> Option<CachedValue> {
        self.inner.read().ok()?.get(key).cloned()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.len()).unwrap_or(0)
    }

    /// True when the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured entry capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total hits served.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total misses observed.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

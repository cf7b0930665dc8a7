//! # LSM Storage Engine
//!
//! This module implements the engine that ties the storage stack
//! together: one memtable, ten levels of sealed sstables, a heat tracker
//! and hot cache on the read path, and a background compaction pool.
//!
//! ## Design Overview
//!
//! Data is queried newest-first:
//!
//! 1. **Hot cache** — bounded, heat-ordered shortcut for proven-hot keys.
//! 2. **Memtable** — the in-memory write buffer.
//! 3. **Levels 0..9** — Level 0 files may overlap and are searched
//!    newest-file-first; deeper levels are disjoint, so at most one
//!    candidate file per level is consulted (binary search on key
//!    ranges). Each file's bloom filter gates the disk work.
//!
//! The first definitive answer wins — a tombstone answers `None`.
//!
//! Writes go to the memtable; at 80% of the configured capacity the
//! memtable is drained into a fresh Level-0 sstable. When Level 0
//! exceeds its file target, a compaction toward Level 1 is scheduled on
//! the worker pool, and so on down the tree.
//!
//! ## Concurrency Model
//!
//! All level/memtable state lives behind a single `RwLock` — writes and
//! flushes take the write lock, reads take the read lock. Compaction
//! merges run on worker threads against `Arc`-shared immutable file
//! snapshots and only take the write lock for the final install step.
//!
//! ## Recovery
//!
//! On open, the database directory is scanned: orphaned `.tmp` files are
//! removed, every `.bdb` file of this table is validated end to end
//! (header CRC, footer CRC, entry-count consistency, filename contract),
//! and anything that fails is **quarantined** — moved into `quarantine/`,
//! never deleted — while the engine continues with the remainder.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::HotCache;
use crate::compaction::{self, CompactionError, CompactionPool, CompactionStrategy};
use crate::container::{ContainerError, EntryKind, MAX_KEY_OR_VALUE_LEN, TableType};
use crate::heat::{AccessKind, HeatTracker};
use crate::mapped::MappedFileError;
use crate::memtable::{Memtable, MemtableError};
use crate::sstable::{SSTable, SstWriter, SstableError, SstableFileName};

pub mod utils;
pub use utils::{MergeIterator, Record, VisibilityFilter};

#[cfg(test)]
mod tests;

/// Subdirectory for files that failed validation on open.
pub const QUARANTINE_DIR: &str = "quarantine";

/// Subdirectory for best-effort copies of compaction inputs.
pub const COMPACTION_BACKUP_DIR: &str = "compaction_backup";

/// Subdirectory reserved for housekeeping backups.
pub const CLEANUP_BACKUP_DIR: &str = "cleanup_backup";

/// Subdirectory reserved for user-initiated backups.
pub const MANUAL_BACKUP_DIR: &str = "manual_backup";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Container format or integrity error.
    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    /// Memory-mapping error.
    #[error("mapped file error: {0}")]
    Mapped(#[from] MappedFileError),

    /// Error originating from the memtable subsystem.
    #[error("memtable error: {0}")]
    Memtable(#[from] MemtableError),

    /// Error originating from the sstable subsystem.
    #[error("sstable error: {0}")]
    Sstable(#[from] SstableError),

    /// Error originating from the compaction subsystem.
    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A key or value longer than the container format can hold.
    #[error("key or value length {0} exceeds limit ({MAX_KEY_OR_VALUE_LEN} bytes)")]
    KeyOrValueTooLarge(usize),

    /// Operation on a closed (or never opened) handle.
    #[error("engine is not initialized")]
    NotInitialized,

    /// Internal invariant violation (poisoned lock, unexpected state).
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for an [`Engine`] instance.
///
/// Construct with struct-update syntax over [`DbConfig::default`]:
///
/// ```rust
/// use browserdb::DbConfig;
///
/// let config = DbConfig {
///     memtable_max_bytes: 4096,
///     ..DbConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Maximum accounted memtable size in bytes; a flush is triggered at
    /// 80% of this.
    pub memtable_max_bytes: usize,

    /// Number of levels in the tree.
    pub level_count: usize,

    /// Per-level growth multiplier for the size target.
    pub level_size_multiplier: u64,

    /// File-count target for Level 0.
    pub l0_file_target: usize,

    /// File-count target for every level below 0.
    pub deeper_file_target: usize,

    /// Size of the background compaction worker pool.
    pub max_concurrent_compactions: usize,

    /// Target false-positive rate for per-sstable bloom filters.
    pub bloom_fp_rate: f64,

    /// Entry capacity of the hot cache (0 disables it).
    pub hot_cache_entries: usize,

    /// Heat decay factor applied once per 60-second cycle.
    pub heat_decay_factor: f64,

    /// Effective heat at which a key's value is admitted to the hot
    /// cache.
    pub hot_threshold: f64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            memtable_max_bytes: 64 * 1024 * 1024,
            level_count: 10,
            level_size_multiplier: 10,
            l0_file_target: 4,
            deeper_file_target: 10,
            max_concurrent_compactions: 4,
            bloom_fp_rate: 0.01,
            hot_cache_entries: 1024,
            heat_decay_factor: 0.95,
            hot_threshold: 10.0,
        }
    }
}

impl DbConfig {
    /// Rejects nonsensical configuration values.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.memtable_max_bytes == 0 {
            return Err(EngineError::InvalidConfig("memtable_max_bytes must be > 0".into()));
        }
        if self.level_count == 0 || self.level_count > u8::MAX as usize {
            return Err(EngineError::InvalidConfig("level_count must be in 1..=255".into()));
        }
        if self.level_size_multiplier < 2 {
            return Err(EngineError::InvalidConfig(
                "level_size_multiplier must be at least 2".into(),
            ));
        }
        if self.l0_file_target == 0 || self.deeper_file_target == 0 {
            return Err(EngineError::InvalidConfig("file targets must be > 0".into()));
        }
        if self.max_concurrent_compactions == 0 {
            return Err(EngineError::InvalidConfig(
                "max_concurrent_compactions must be > 0".into(),
            ));
        }
        if !(self.bloom_fp_rate > 0.0 && self.bloom_fp_rate < 1.0) {
            return Err(EngineError::InvalidConfig(
                "bloom_fp_rate must be inside (0, 1)".into(),
            ));
        }
        if !(self.heat_decay_factor > 0.0 && self.heat_decay_factor <= 1.0) {
            return Err(EngineError::InvalidConfig(
                "heat_decay_factor must be inside (0, 1]".into(),
            ));
        }
        if self.hot_threshold <= 0.0 {
            return Err(EngineError::InvalidConfig("hot_threshold must be > 0".into()));
        }
        Ok(())
    }

    /// File-count target for a level.
    pub fn level_file_target(&self, level: u8) -> usize {
        if level == 0 {
            self.l0_file_target
        } else {
            self.deeper_file_target
        }
    }

    /// Total-size target in bytes for a level: the memtable cap grown by
    /// the multiplier once per level.
    pub fn level_size_target(&self, level: u8) -> u64 {
        let mut target = self.memtable_max_bytes as u64;
        for _ in 0..level {
            target = target.saturating_mul(self.level_size_multiplier);
        }
        target
    }
}

// ------------------------------------------------------------------------------------------------
// Stats
// ------------------------------------------------------------------------------------------------

/// Snapshot of engine statistics returned by [`Engine::stats`].
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Accounted bytes currently buffered in the memtable.
    pub memtable_bytes: usize,
    /// Distinct keys currently buffered in the memtable.
    pub memtable_records: usize,
    /// File count per level, index 0 = Level 0.
    pub level_file_counts: Vec<usize>,
    /// Total sstable bytes per level.
    pub level_bytes: Vec<u64>,
    /// Total number of sstables across all levels.
    pub sstable_count: usize,
    /// Total on-disk sstable bytes.
    pub total_sstable_bytes: u64,
    /// Corrupt entries encountered by reads since open.
    pub corruption_events: u64,
    /// Keys currently tracked by the heat tracker.
    pub tracked_keys: usize,
    /// Entries currently held by the hot cache.
    pub hot_cache_entries: usize,
    /// Hot cache hits since open.
    pub hot_cache_hits: u64,
    /// Hot cache misses since open.
    pub hot_cache_misses: u64,
    /// Compactions completed since open.
    pub compactions_completed: u64,
}

// ------------------------------------------------------------------------------------------------
// Engine internals
// ------------------------------------------------------------------------------------------------

pub(crate) struct EngineInner {
    /// The in-memory write buffer.
    pub(crate) memtable: Memtable,

    /// Levels of sealed sstables. Level 0 is kept newest-first; deeper
    /// levels are kept sorted by `min_key` (their ranges are disjoint).
    pub(crate) levels: Vec<Vec<Arc<SSTable>>>,

    /// Set once `close()` has run.
    pub(crate) closed: bool,
}

/// Engine state shared between handles and compaction workers.
pub(crate) struct EngineShared {
    pub(crate) inner: RwLock<EngineInner>,
    pub(crate) heat: HeatTracker,
    pub(crate) cache: HotCache,
    pub(crate) config: DbConfig,
    pub(crate) table_type: TableType,
    pub(crate) dir: PathBuf,
    pub(crate) pool: CompactionPool,
    pub(crate) compactions_done: AtomicU64,
}

/// The main LSM storage engine handle.
///
/// Thread-safe — can be cloned and shared across threads; all clones
/// address the same underlying state.
pub struct Engine {
    shared: Arc<EngineShared>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("table_type", &self.shared.table_type)
            .field("dir", &self.shared.dir)
            .finish()
    }
}

impl Clone for Engine {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Engine {
    /// Opens (or creates) a database directory for one table type.
    ///
    /// Recovery runs as part of opening: orphaned `.tmp` files are
    /// removed, each `.bdb` file belonging to this table is validated,
    /// invalid files are quarantined, and the levels are rebuilt from
    /// the surviving filenames. Files of other table types are left
    /// untouched.
    pub fn open(
        dir: impl AsRef<Path>,
        table_type: TableType,
        config: DbConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let levels = Self::recover_levels(&dir, table_type, &config)?;
        let file_count: usize = levels.iter().map(Vec::len).sum();

        let shared = Arc::new(EngineShared {
            inner: RwLock::new(EngineInner {
                memtable: Memtable::new(config.memtable_max_bytes),
                levels,
                closed: false,
            }),
            heat: HeatTracker::new(config.heat_decay_factor),
            cache: HotCache::new(config.hot_cache_entries),
            table_type,
            dir: dir.clone(),
            pool: CompactionPool::new(config.max_concurrent_compactions),
            compactions_done: AtomicU64::new(0),
            config,
        });
        shared.pool.start(&shared);

        info!(
            dir = %dir.display(),
            table = %table_type,
            sstables = file_count,
            "engine opened"
        );

        Ok(Self { shared })
    }

    /// Scans the directory, validates every file of this table, and
    /// rebuilds the level lists. Invalid files are quarantined.
    fn recover_levels(
        dir: &Path,
        table_type: TableType,
        config: &DbConfig,
    ) -> Result<Vec<Vec<Arc<SSTable>>>, EngineError> {
        let mut levels: Vec<Vec<Arc<SSTable>>> = vec![Vec::new(); config.level_count];

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            // A writer died mid-build; the partial output has no footer.
            if name.ends_with(".tmp") {
                warn!(file = name, "removing orphaned temp file");
                let _ = fs::remove_file(&path);
                continue;
            }

            if !name.ends_with(".bdb") {
                continue;
            }

            let Some(parsed) = SstableFileName::parse(name) else {
                warn!(file = name, "quarantining: filename violates the contract");
                Self::quarantine(dir, &path);
                continue;
            };

            // Files of other tables share the namespace; leave them be.
            if parsed.table_type != table_type {
                continue;
            }

            if parsed.level as usize >= config.level_count {
                warn!(file = name, level = parsed.level, "quarantining: level out of range");
                Self::quarantine(dir, &path);
                continue;
            }

            match SSTable::open(&path, config.bloom_fp_rate) {
                Ok(table) => {
                    levels[parsed.level as usize].push(Arc::new(table));
                }
                Err(e) => {
                    warn!(file = name, error = %e, "quarantining: validation failed");
                    Self::quarantine(dir, &path);
                }
            }
        }

        // Level 0: newest first. Deeper levels: by range position.
        levels[0].sort_by(|a, b| b.creation_time().cmp(&a.creation_time()));
        for level in levels.iter_mut().skip(1) {
            level.sort_by(|a, b| a.min_key().cmp(&b.min_key()));
            for pair in level.windows(2) {
                if let (Some(max), Some(min)) = (pair[0].max_key(), pair[1].min_key())
                    && max >= min
                {
                    warn!(
                        left = %pair[0].path().display(),
                        right = %pair[1].path().display(),
                        "overlapping ranges below level 0; compaction will restore disjointness"
                    );
                }
            }
        }

        Ok(levels)
    }

    /// Moves a failed file into `quarantine/`, never deleting data.
    fn quarantine(dir: &Path, path: &Path) {
        let quarantine_dir = dir.join(QUARANTINE_DIR);
        if let Err(e) = fs::create_dir_all(&quarantine_dir) {
            warn!(error = %e, "could not create quarantine directory");
            return;
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let mut target = quarantine_dir.join(&name);
        let mut attempt = 1u32;
        while target.exists() {
            target = quarantine_dir.join(format!("{name}.{attempt}"));
            attempt += 1;
        }

        match fs::rename(path, &target) {
            Ok(()) => info!(from = %path.display(), to = %target.display(), "file quarantined"),
            Err(e) => warn!(error = %e, file = %path.display(), "quarantine move failed"),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Write path
    // --------------------------------------------------------------------------------------------

    /// Inserts or updates a key.
    ///
    /// Oversized keys and values are rejected before any state changes.
    /// Triggers a flush when the memtable crosses its threshold; a full
    /// memtable is drained and the write retried once.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), EngineError> {
        Self::check_entry_sizes(&key, &value)?;

        self.shared.heat.record_access(&key, AccessKind::Write);
        self.shared.heat.maybe_sweep();

        let mut inner = self.write_inner()?;
        if inner.closed {
            return Err(EngineError::NotInitialized);
        }

        // Keep read-your-writes intact: any cached value is now stale.
        self.shared.cache.remove(&key);

        match inner.memtable.put(key.clone(), value.clone(), EntryKind::Insert) {
            Ok(()) => {}
            Err(MemtableError::OutOfCapacity { .. }) => {
                // Capacity errors are recoverable: flush, then retry once.
                self.flush_locked(&mut inner)?;
                inner.memtable.put(key, value, EntryKind::Insert)?;
            }
            Err(e) => return Err(e.into()),
        }

        if inner.memtable.should_flush() {
            self.flush_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Deletes a key by writing a tombstone.
    pub fn delete(&self, key: Vec<u8>) -> Result<(), EngineError> {
        Self::check_entry_sizes(&key, &[])?;

        self.shared.heat.record_access(&key, AccessKind::Delete);
        self.shared.heat.maybe_sweep();

        let mut inner = self.write_inner()?;
        if inner.closed {
            return Err(EngineError::NotInitialized);
        }

        self.shared.cache.remove(&key);

        match inner.memtable.delete(key.clone()) {
            Ok(()) => {}
            Err(MemtableError::OutOfCapacity { .. }) => {
                self.flush_locked(&mut inner)?;
                inner.memtable.delete(key)?;
            }
            Err(e) => return Err(e.into()),
        }

        if inner.memtable.should_flush() {
            self.flush_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Drains the memtable into a fresh Level-0 sstable.
    ///
    /// A no-op when the memtable is empty.
    pub fn flush(&self) -> Result<(), EngineError> {
        let mut inner = self.write_inner()?;
        if inner.closed {
            return Err(EngineError::NotInitialized);
        }
        self.flush_locked(&mut inner)
    }

    fn flush_locked(&self, inner: &mut RwLockWriteGuard<'_, EngineInner>) -> Result<(), EngineError> {
        let records = inner.memtable.snapshot_sorted()?;
        if records.is_empty() {
            return Ok(());
        }

        // The memtable is cleared only once the sstable is sealed and
        // reopened; a failed build leaves every buffered record in place.
        let path = SstWriter::new(&self.shared.dir, self.shared.table_type, 0).build(&records)?;
        let table = SSTable::open(&path, self.shared.config.bloom_fp_rate)?;
        inner.memtable.clear()?;
        debug!(
            path = %path.display(),
            records = records.len(),
            "memtable flushed to level 0"
        );
        inner.levels[0].insert(0, Arc::new(table));

        if inner.levels[0].len() > self.shared.config.l0_file_target {
            self.shared.pool.schedule(0, CompactionStrategy::Hybrid);
        }
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Read path
    // --------------------------------------------------------------------------------------------

    /// Looks up a single key.
    ///
    /// Search order: hot cache → memtable → Level 0 newest-file-first →
    /// deeper levels (one candidate file each, picked by range
    /// disjointness). The first definitive answer wins; a tombstone
    /// answers `None`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        self.shared.heat.record_access(key, AccessKind::Read);
        self.shared.heat.maybe_sweep();

        if let Some(value) = self.shared.cache.get(key) {
            return Ok(Some(value));
        }

        let inner = self.read_inner()?;
        if inner.closed {
            return Err(EngineError::NotInitialized);
        }

        let found = self.search_layers(&inner, key)?;
        drop(inner);

        if let Some(value) = &found {
            // Admission is the tracker's call, not the cache's.
            let effective = self.shared.heat.effective_heat(key);
            if effective >= self.shared.config.hot_threshold {
                self.shared
                    .cache
                    .insert(key.to_vec(), value.clone(), effective);
            }
        }

        Ok(found)
    }

    /// Memtable and level search, first definitive answer wins.
    fn search_layers(
        &self,
        inner: &EngineInner,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, EngineError> {
        if let Some(record) = inner.memtable.get_raw(key)? {
            return Ok(if record.deleted { None } else { Some(record.value) });
        }

        for (level_no, level) in inner.levels.iter().enumerate() {
            if level_no == 0 {
                for table in level {
                    if !table.might_contain(key) {
                        continue;
                    }
                    if let Some(record) = table.get(key)? {
                        return Ok(if record.deleted { None } else { Some(record.value) });
                    }
                }
            } else if let Some(table) = Self::deeper_candidate(level, key) {
                if table.might_contain(key)
                    && let Some(record) = table.get(key)?
                {
                    return Ok(if record.deleted { None } else { Some(record.value) });
                }
            }
        }

        Ok(None)
    }

    /// Picks the single file in a disjoint level whose range covers
    /// `key`, if any.
    fn deeper_candidate<'level>(
        level: &'level [Arc<SSTable>],
        key: &[u8],
    ) -> Option<&'level Arc<SSTable>> {
        let idx = level.partition_point(|table| {
            table.min_key().is_some_and(|min| min <= key)
        });
        if idx == 0 {
            return None;
        }
        let table = &level[idx - 1];
        table.covers_key(key).then_some(table)
    }

    /// Scans all live keys in `[low, high]` (inclusive).
    ///
    /// Merge-sorts the memtable snapshot and every intersecting sstable,
    /// newest source first; the newest version of each key wins and
    /// tombstoned keys are suppressed. The result iterates in ascending
    /// key order and owns its data.
    pub fn range(
        &self,
        low: &[u8],
        high: &[u8],
    ) -> Result<impl Iterator<Item = (Vec<u8>, Vec<u8>)> + use<>, EngineError> {
        let inner = self.read_inner()?;
        if inner.closed {
            return Err(EngineError::NotInitialized);
        }

        let mut sources: Vec<Box<dyn Iterator<Item = Record>>> = Vec::new();

        let memtable_records = inner.memtable.snapshot_range(low, high)?;
        sources.push(Box::new(memtable_records.into_iter()));

        for level in &inner.levels {
            for table in level {
                if !table.overlaps(low, high) {
                    continue;
                }
                let records: Vec<Record> = table.range(low, high).collect();
                sources.push(Box::new(records.into_iter()));
            }
        }

        Ok(VisibilityFilter::new(MergeIterator::new(sources)))
    }

    // --------------------------------------------------------------------------------------------
    // Compaction API
    // --------------------------------------------------------------------------------------------

    /// Runs one compaction of `level` with the given strategy,
    /// synchronously.
    ///
    /// Returns `Ok(true)` if a merge was performed, `Ok(false)` if the
    /// strategy found nothing to do. A level outside the configured
    /// range surfaces as [`CompactionError::InvalidLevel`].
    pub fn compact(&self, strategy: CompactionStrategy, level: u8) -> Result<bool, EngineError> {
        {
            let inner = self.read_inner()?;
            if inner.closed {
                return Err(EngineError::NotInitialized);
            }
        }
        Ok(compaction::run(&self.shared, level, strategy)?)
    }

    // --------------------------------------------------------------------------------------------
    // Stats / lifecycle
    // --------------------------------------------------------------------------------------------

    /// Returns a snapshot of engine statistics.
    pub fn stats(&self) -> Result<EngineStats, EngineError> {
        let inner = self.read_inner()?;

        let level_file_counts: Vec<usize> = inner.levels.iter().map(Vec::len).collect();
        let level_bytes: Vec<u64> = inner
            .levels
            .iter()
            .map(|level| level.iter().map(|t| t.size_bytes()).sum())
            .collect();
        let corruption_events = inner
            .levels
            .iter()
            .flatten()
            .map(|t| t.corruption_events())
            .sum();

        Ok(EngineStats {
            memtable_bytes: inner.memtable.accounted_bytes(),
            memtable_records: inner.memtable.len(),
            sstable_count: level_file_counts.iter().sum(),
            total_sstable_bytes: level_bytes.iter().sum(),
            level_file_counts,
            level_bytes,
            corruption_events,
            tracked_keys: self.shared.heat.len(),
            hot_cache_entries: self.shared.cache.len(),
            hot_cache_hits: self.shared.cache.hits(),
            hot_cache_misses: self.shared.cache.misses(),
            compactions_completed: self.shared.compactions_done.load(Ordering::Relaxed),
        })
    }

    /// The `n` hottest keys by effective heat, hottest first.
    pub fn hot_keys(&self, n: usize) -> Vec<Vec<u8>> {
        self.shared.heat.hot_keys(n)
    }

    /// Gracefully shuts the engine down: flushes the memtable, stops the
    /// compaction pool, and fsyncs the database directory. Idempotent.
    pub fn close(&self) -> Result<(), EngineError> {
        {
            let mut inner = self.write_inner()?;
            if inner.closed {
                return Ok(());
            }
            self.flush_locked(&mut inner)?;
            inner.closed = true;
        }

        self.shared.pool.shutdown();
        self.shared.cache.clear();

        // Workers are joined; dropping the level lists releases the mmaps.
        if let Ok(mut inner) = self.shared.inner.write() {
            for level in inner.levels.iter_mut() {
                level.clear();
            }
        }

        if let Ok(dir) = fs::File::open(&self.shared.dir) {
            dir.sync_all()?;
        }

        info!(dir = %self.shared.dir.display(), "engine closed");
        Ok(())
    }

    /// The table this engine serves.
    pub fn table_type(&self) -> TableType {
        self.shared.table_type
    }

    /// The database directory.
    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    /// Rejects keys or values the container format cannot hold, before
    /// any state is touched.
    fn check_entry_sizes(key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        if key.len() > MAX_KEY_OR_VALUE_LEN {
            return Err(EngineError::KeyOrValueTooLarge(key.len()));
        }
        if value.len() > MAX_KEY_OR_VALUE_LEN {
            return Err(EngineError::KeyOrValueTooLarge(value.len()));
        }
        Ok(())
    }

    fn read_inner(&self) -> Result<std::sync::RwLockReadGuard<'_, EngineInner>, EngineError> {
        self.shared
            .inner
            .read()
            .map_err(|_| EngineError::Internal("RwLock poisoned".into()))
    }

    fn write_inner(&self) -> Result<RwLockWriteGuard<'_, EngineInner>, EngineError> {
        self.shared
            .inner
            .write()
            .map_err(|_| EngineError::Internal("RwLock poisoned".into()))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Last handle out stops the worker pool; data durability is the
        // caller's close() responsibility.
        if Arc::strong_count(&self.shared) == 1 {
            self.shared.pool.shutdown();
        }
    }
}

//! # Compaction Module
//!
//! Merges sstables across levels to reduce file count, reclaim space from
//! shadowed records, and keep non-zero levels range-disjoint. Three
//! strategies share one merge core:
//!
//! ## Leveled
//!
//! Picks the overflow files at a level (all of Level 0, whose ranges
//! overlap; the oldest overflow files elsewhere) plus every overlapping
//! file one level deeper, and rewrites them as range-partitioned output
//! files at the deeper level.
//!
//! ## Size-Tiered
//!
//! Groups a level's files into buckets of similar size (1.5× ratio
//! threshold) and merges the fullest bucket downward. Overlapping files
//! at the destination join the merge so the level below stays disjoint.
//!
//! ## Hybrid
//!
//! Resolves to one of the above per invocation: a write-heavy workload
//! favors size-tiered, a read-heavy workload favors leveled, and a mixed
//! workload decides by the spread of file sizes at the level.
//!
//! ## Merge core
//!
//! Inputs are merged newest-first in `(key ASC, timestamp DESC)` order
//! and deduplicated to the newest record per key. A winning tombstone is
//! dropped entirely when no file outside the merge could still hold the
//! key; otherwise it is preserved. Output is split into multiple files
//! honoring the destination's per-file size target.
//!
//! ## Concurrency & crash safety
//!
//! Compactions run on a bounded worker pool. The merge reads `Arc`-shared
//! immutable snapshots without holding the engine lock; only the final
//! install (swap file lists) takes the write lock. Input files are
//! claimed so two compactions never share an input. Inputs are copied
//! into `compaction_backup/` best-effort before being unlinked, and a
//! crash mid-merge leaves the pre-compaction files fully intact — partial
//! outputs carry a `.tmp` suffix and are swept on the next open.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

mod planning;

pub(crate) use planning::plan;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::utils::{MergeIterator, Record};
use crate::engine::{COMPACTION_BACKUP_DIR, EngineShared};
use crate::heat::AccessKind;
use crate::sstable::{SSTable, SstWriter, SstableError};

// ------------------------------------------------------------------------------------------------
// Strategy selector
// ------------------------------------------------------------------------------------------------

/// Which selection policy a compaction uses. A small closed set — the
/// engine matches on it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategy {
    /// Overflow files plus overlapping deeper files; restores the
    /// disjointness of the destination level.
    Leveled,
    /// Buckets of similarly-sized files merged downward.
    SizeTiered,
    /// Picks between the other two from file-size spread and the
    /// workload signal.
    Hybrid,
}

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors raised by the compaction engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompactionError {
    /// Error reading inputs or writing outputs.
    #[error("sstable error: {0}")]
    Sstable(#[from] SstableError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A level number outside the configured range.
    #[error("invalid level {level} (levels run 0..{count})")]
    InvalidLevel {
        /// The requested level.
        level: u8,
        /// Configured level count.
        count: usize,
    },

    /// The concurrent-compaction budget is exhausted.
    #[error("too many concurrent compactions")]
    TooManyCompactions,

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Worker pool
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub(crate) struct Task {
    level: u8,
    strategy: CompactionStrategy,
}

/// Bounded background pool executing compaction tasks.
///
/// Workers hold only a `Weak` reference to the engine state, so an
/// abandoned engine shuts its pool down instead of being kept alive by
/// it.
pub(crate) struct CompactionPool {
    sender: Mutex<Option<Sender<Task>>>,
    receiver: Mutex<Option<Receiver<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: AtomicBool,
    active: AtomicUsize,
    max_active: usize,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl CompactionPool {
    /// Creates a pool with `max_active` workers and a task queue bounded
    /// at four tasks per worker.
    pub(crate) fn new(max_active: usize) -> Self {
        let (sender, receiver) = bounded(max_active * 4);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            workers: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            max_active,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Spawns the worker threads. Called once right after the engine's
    /// shared state is assembled.
    pub(crate) fn start(&self, shared: &Arc<EngineShared>) {
        let Some(receiver) = self.receiver.lock().ok().and_then(|mut r| r.take()) else {
            return;
        };

        let mut workers = match self.workers.lock() {
            Ok(workers) => workers,
            Err(_) => return,
        };

        for worker_id in 0..self.max_active {
            let receiver = receiver.clone();
            let weak: Weak<EngineShared> = Arc::downgrade(shared);
            let handle = std::thread::Builder::new()
                .name(format!("compaction-{worker_id}"))
                .spawn(move || {
                    while let Ok(task) = receiver.recv() {
                        let Some(shared) = weak.upgrade() else {
                            break;
                        };
                        match run(&shared, task.level, task.strategy) {
                            Ok(true) => {}
                            Ok(false) => {
                                debug!(level = task.level, "scheduled compaction found nothing to do");
                            }
                            Err(CompactionError::TooManyCompactions) => {
                                // Another worker will revisit the level later.
                            }
                            Err(e) => {
                                warn!(level = task.level, error = %e, "background compaction failed");
                            }
                        }
                    }
                });
            match handle {
                Ok(handle) => workers.push(handle),
                Err(e) => warn!(error = %e, "failed to spawn compaction worker"),
            }
        }
    }

    /// Enqueues a compaction; returns false when the queue is full or the
    /// pool is shut down. Never blocks.
    pub(crate) fn schedule(&self, level: u8, strategy: CompactionStrategy) -> bool {
        if self.shutting_down() {
            return false;
        }
        let Ok(sender) = self.sender.lock() else {
            return false;
        };
        let Some(sender) = sender.as_ref() else {
            return false;
        };
        match sender.try_send(Task { level, strategy }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(level, "compaction queue full, dropping request");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// True once shutdown has begun; merges poll this between output
    /// files so cancellation lands on a file boundary.
    pub(crate) fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Stops accepting tasks, cancels at the next file boundary, and
    /// joins the workers. Idempotent; must not be called from a worker.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        if let Ok(mut workers) = self.workers.lock() {
            for handle in workers.drain(..) {
                let _ = handle.join();
            }
        }
    }

    /// Reserves one compaction slot, or reports the budget exhausted.
    fn begin(&self) -> Result<ActiveGuard<'_>, CompactionError> {
        let reserved = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                (active < self.max_active).then_some(active + 1)
            });
        match reserved {
            Ok(_) => Ok(ActiveGuard { pool: self }),
            Err(_) => Err(CompactionError::TooManyCompactions),
        }
    }

    /// Claims exclusive rights on the given input files. Returns `None`
    /// when any of them is already part of a running compaction.
    fn claim(&self, inputs: &[Arc<SSTable>]) -> Option<ClaimGuard<'_>> {
        let mut in_flight = self.in_flight.lock().ok()?;
        let paths: Vec<PathBuf> = inputs.iter().map(|t| t.path().to_path_buf()).collect();
        if paths.iter().any(|p| in_flight.contains(p)) {
            return None;
        }
        for path in &paths {
            in_flight.insert(path.clone());
        }
        Some(ClaimGuard { pool: self, paths })
    }
}

impl Drop for CompactionPool {
    fn drop(&mut self) {
        // Dropping the sender lets workers drain and exit; joining here
        // could deadlock when the last engine reference dies on a worker.
        self.shutdown.store(true, Ordering::SeqCst);
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

struct ActiveGuard<'pool> {
    pool: &'pool CompactionPool,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.pool.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ClaimGuard<'pool> {
    pool: &'pool CompactionPool,
    paths: Vec<PathBuf>,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.pool.in_flight.lock() {
            for path in &self.paths {
                in_flight.remove(path);
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Merge core
// ------------------------------------------------------------------------------------------------

/// One planned compaction: the claimed inputs, the destination level,
/// and the files outside the merge that can still shadow keys.
pub(crate) struct Plan {
    /// Input files, newest first (merge tie-break order).
    pub(crate) inputs: Vec<Arc<SSTable>>,

    /// Level the outputs are written to.
    pub(crate) dest: u8,

    /// Files not participating in the merge; a tombstone whose key any
    /// of these could hold must be preserved.
    pub(crate) shadows: Vec<Arc<SSTable>>,
}

/// Executes one compaction of `level` under `strategy`.
///
/// Returns `Ok(true)` if a merge was performed and installed, `Ok(false)`
/// when there was nothing to do (threshold not met, inputs contended, or
/// the pool is shutting down).
pub(crate) fn run(
    shared: &EngineShared,
    level: u8,
    strategy: CompactionStrategy,
) -> Result<bool, CompactionError> {
    if (level as usize) >= shared.config.level_count {
        return Err(CompactionError::InvalidLevel {
            level,
            count: shared.config.level_count,
        });
    }
    if shared.pool.shutting_down() {
        return Ok(false);
    }
    let _active = shared.pool.begin()?;

    // Plan against a consistent snapshot of the level lists.
    let plan = {
        let inner = shared
            .inner
            .read()
            .map_err(|_| CompactionError::Internal("RwLock poisoned".into()))?;
        plan(&inner.levels, &shared.config, &shared.heat, level, strategy)
    };
    let Some(plan) = plan else {
        return Ok(false);
    };

    let Some(_claim) = shared.pool.claim(&plan.inputs) else {
        debug!(level, "inputs contended by another compaction");
        return Ok(false);
    };

    let input_count = plan.inputs.len();
    let input_bytes: u64 = plan.inputs.iter().map(|t| t.size_bytes()).sum();
    info!(
        level,
        dest = plan.dest,
        inputs = input_count,
        input_bytes,
        strategy = ?strategy,
        "compaction started"
    );

    // ----------------------------------------------------------------------------------------
    // Merge (no engine lock held)
    // ----------------------------------------------------------------------------------------

    let merged = merge_inputs(shared, &plan);

    // Honor the destination's per-file size budget.
    let per_file_target = (shared.config.level_size_target(plan.dest)
        / shared.config.level_file_target(plan.dest).max(1) as u64)
        .max(1);

    let mut output_paths: Vec<PathBuf> = Vec::new();
    for chunk in split_records(merged, per_file_target) {
        // Cancellation lands on file boundaries: written outputs are
        // discarded, inputs remain untouched.
        if shared.pool.shutting_down() {
            for path in &output_paths {
                let _ = fs::remove_file(path);
            }
            info!(level, "compaction cancelled at file boundary");
            return Ok(false);
        }

        let path = SstWriter::new(&shared.dir, shared.table_type, plan.dest).build(&chunk)?;
        output_paths.push(path);
    }

    // Load outputs before touching the engine lock.
    let mut outputs: Vec<Arc<SSTable>> = Vec::with_capacity(output_paths.len());
    for path in &output_paths {
        outputs.push(Arc::new(SSTable::open(path, shared.config.bloom_fp_rate)?));
    }

    // ----------------------------------------------------------------------------------------
    // Install (write lock): add outputs, then drop inputs
    // ----------------------------------------------------------------------------------------

    let dest_pressure = {
        let mut inner = shared
            .inner
            .write()
            .map_err(|_| CompactionError::Internal("RwLock poisoned".into()))?;

        // The plan snapshot predates the claim; if a racing compaction
        // consumed any input in between, installing would duplicate data.
        let all_present = plan.inputs.iter().all(|input| {
            inner
                .levels
                .iter()
                .flatten()
                .any(|table| Arc::ptr_eq(input, table))
        });
        if !all_present {
            drop(inner);
            for path in &output_paths {
                let _ = fs::remove_file(path);
            }
            debug!(level, "inputs changed under the plan, compaction abandoned");
            return Ok(false);
        }

        let dest_level = &mut inner.levels[plan.dest as usize];
        dest_level.extend(outputs);
        dest_level.sort_by(|a, b| a.min_key().cmp(&b.min_key()).then(b.creation_time().cmp(&a.creation_time())));

        for level_files in inner.levels.iter_mut() {
            level_files.retain(|table| {
                !plan.inputs.iter().any(|input| Arc::ptr_eq(input, table))
            });
        }

        let dest_files = &inner.levels[plan.dest as usize];
        let dest_bytes: u64 = dest_files.iter().map(|t| t.size_bytes()).sum();
        dest_files.len() > shared.config.level_file_target(plan.dest)
            || dest_bytes > shared.config.level_size_target(plan.dest)
    };

    // Readers that grabbed the old list keep their Arcs; the files below
    // are unlinked but stay mapped until the last reader drops them.
    remove_inputs_with_backup(shared, &plan.inputs);

    shared
        .compactions_done
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    info!(
        level,
        dest = plan.dest,
        inputs = input_count,
        outputs = output_paths.len(),
        "compaction installed"
    );

    if dest_pressure && (plan.dest as usize + 1) < shared.config.level_count {
        shared.pool.schedule(plan.dest, strategy);
    }

    Ok(true)
}

/// Merges the plan's inputs into deduplicated output records in key
/// order, applying the tombstone drop rule.
fn merge_inputs(shared: &EngineShared, plan: &Plan) -> Vec<Record> {
    let mut sources: Vec<Box<dyn Iterator<Item = Record> + '_>> = Vec::new();
    for table in &plan.inputs {
        // Each table's own bounds cover its full contents.
        let (Some(low), Some(high)) = (table.min_key(), table.max_key()) else {
            continue;
        };
        sources.push(Box::new(table.range(low, high)));
    }
    let merge = MergeIterator::new(sources);

    let mut records: Vec<Record> = Vec::new();
    let mut last_key: Option<Vec<u8>> = None;

    for record in merge {
        if last_key.as_deref() == Some(record.key.as_slice()) {
            // An older version of a key we already resolved: merged away.
            shared.heat.record_access(&record.key, AccessKind::Compact);
            continue;
        }
        last_key = Some(record.key.clone());

        if record.deleted {
            let shadowed = plan
                .shadows
                .iter()
                .any(|table| table.covers_key(&record.key));
            if !shadowed {
                // Nothing outside the merge can resurrect this key; the
                // tombstone has done its job.
                shared.heat.record_access(&record.key, AccessKind::Compact);
                continue;
            }
        }

        records.push(record);
    }

    records
}

/// Splits a sorted record run into chunks of roughly `per_file_target`
/// encoded bytes each.
fn split_records(records: Vec<Record>, per_file_target: u64) -> Vec<Vec<Record>> {
    let mut chunks: Vec<Vec<Record>> = Vec::new();
    let mut current: Vec<Record> = Vec::new();
    let mut current_bytes = 0u64;

    for record in records {
        current_bytes += (record.key.len() + record.value.len() + 24) as u64;
        current.push(record);
        if current_bytes >= per_file_target {
            chunks.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Copies each input into `compaction_backup/` (best effort) and unlinks
/// it from the database directory.
fn remove_inputs_with_backup(shared: &EngineShared, inputs: &[Arc<SSTable>]) {
    let backup_dir = shared.dir.join(COMPACTION_BACKUP_DIR);
    let backup_ready = match fs::create_dir_all(&backup_dir) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "could not create compaction backup directory");
            false
        }
    };

    for input in inputs {
        let path = input.path();
        if backup_ready
            && let Some(name) = path.file_name()
            && let Err(e) = fs::copy(path, backup_dir.join(name))
        {
            warn!(file = %path.display(), error = %e, "backup copy failed");
        }
        if let Err(e) = fs::remove_file(path) {
            warn!(file = %path.display(), error = %e, "failed to remove compacted input");
        }
    }
}

//! Input selection for the three compaction strategies.
//!
//! All selectors share the same postcondition: the returned plan's
//! inputs are files of the compacted level plus every file one level
//! deeper whose key range overlaps them, newest first. Merging the
//! overlapping destination files back in is what keeps non-zero levels
//! range-disjoint.

use std::sync::Arc;

use tracing::debug;

use crate::compaction::{CompactionStrategy, Plan};
use crate::engine::DbConfig;
use crate::heat::{HeatTracker, WorkloadSignal};
use crate::sstable::SSTable;

/// Size-ratio threshold for grouping files into one size-tiered bucket.
const BUCKET_RATIO: f64 = 1.5;

/// Coefficient-of-variation cutoff above which a mixed workload prefers
/// size-tiered selection.
const SIZE_SPREAD_CUTOFF: f64 = 0.5;

/// Plans one compaction of `level`, or returns `None` when the strategy's
/// preconditions are not met.
pub(crate) fn plan(
    levels: &[Vec<Arc<SSTable>>],
    config: &DbConfig,
    heat: &HeatTracker,
    level: u8,
    strategy: CompactionStrategy,
) -> Option<Plan> {
    let dest = level + 1;
    if (dest as usize) >= config.level_count {
        return None;
    }
    if levels[level as usize].is_empty() {
        return None;
    }

    let picked = match resolve(levels, heat, level, strategy) {
        CompactionStrategy::Leveled => select_leveled(levels, config, level),
        CompactionStrategy::SizeTiered => select_size_tiered(levels, level),
        CompactionStrategy::Hybrid => unreachable!("hybrid resolves to a concrete strategy"),
    }?;

    finish_plan(levels, dest, picked)
}

/// Resolves `Hybrid` into a concrete strategy using the file-size spread
/// at the level and the tracker's workload signal.
fn resolve(
    levels: &[Vec<Arc<SSTable>>],
    heat: &HeatTracker,
    level: u8,
    strategy: CompactionStrategy,
) -> CompactionStrategy {
    if strategy != CompactionStrategy::Hybrid {
        return strategy;
    }

    let resolved = match heat.workload() {
        WorkloadSignal::WriteHeavy => CompactionStrategy::SizeTiered,
        WorkloadSignal::ReadHeavy => CompactionStrategy::Leveled,
        WorkloadSignal::Mixed => {
            if size_spread(&levels[level as usize]) >= SIZE_SPREAD_CUTOFF {
                CompactionStrategy::SizeTiered
            } else {
                CompactionStrategy::Leveled
            }
        }
    };
    debug!(level, resolved = ?resolved, "hybrid strategy resolved");
    resolved
}

/// Coefficient of variation (stddev / mean) of the level's file sizes.
fn size_spread(files: &[Arc<SSTable>]) -> f64 {
    if files.len() < 2 {
        return 0.0;
    }
    let sizes: Vec<f64> = files.iter().map(|t| t.size_bytes() as f64).collect();
    let mean = sizes.iter().sum::<f64>() / sizes.len() as f64;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = sizes.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / sizes.len() as f64;
    variance.sqrt() / mean
}

/// Leveled selection: every file at Level 0 (their ranges overlap), or
/// the oldest overflow files at a deeper level.
fn select_leveled(
    levels: &[Vec<Arc<SSTable>>],
    config: &DbConfig,
    level: u8,
) -> Option<Vec<Arc<SSTable>>> {
    let files = &levels[level as usize];

    if level == 0 {
        // Level-0 ranges interleave arbitrarily; partial picks would let
        // older versions overtake newer ones.
        return Some(files.clone());
    }

    let target = config.level_file_target(level);
    if files.len() <= target {
        return None;
    }

    let overflow = files.len() - target;
    let mut by_age = files.clone();
    by_age.sort_by_key(|table| table.creation_time());
    by_age.truncate(overflow);
    Some(by_age)
}

/// Size-tiered selection: the fullest bucket of similarly-sized files
/// (each within [`BUCKET_RATIO`] of the bucket's smallest member).
fn select_size_tiered(levels: &[Vec<Arc<SSTable>>], level: u8) -> Option<Vec<Arc<SSTable>>> {
    let files = &levels[level as usize];
    if files.len() < 2 {
        return None;
    }

    let mut by_size = files.clone();
    by_size.sort_by_key(|table| table.size_bytes());

    let mut best: Vec<Arc<SSTable>> = Vec::new();
    let mut bucket: Vec<Arc<SSTable>> = Vec::new();
    let mut bucket_floor = 0u64;

    for table in by_size {
        let size = table.size_bytes();
        if bucket.is_empty() || size as f64 <= bucket_floor as f64 * BUCKET_RATIO {
            if bucket.is_empty() {
                bucket_floor = size.max(1);
            }
            bucket.push(table);
        } else {
            if bucket.len() > best.len() {
                best = std::mem::take(&mut bucket);
            } else {
                bucket.clear();
            }
            bucket_floor = size.max(1);
            bucket.push(table);
        }
    }
    if bucket.len() > best.len() {
        best = bucket;
    }

    (best.len() >= 2).then_some(best)
}

/// Expands the picked files with every overlapping destination file,
/// orders inputs newest-first, and snapshots the shadow set.
fn finish_plan(
    levels: &[Vec<Arc<SSTable>>],
    dest: u8,
    mut picked: Vec<Arc<SSTable>>,
) -> Option<Plan> {
    if picked.is_empty() {
        return None;
    }

    // Union of the picked key ranges.
    let low = picked.iter().filter_map(|t| t.min_key()).min()?.to_vec();
    let high = picked.iter().filter_map(|t| t.max_key()).max()?.to_vec();

    // Newer data sorts first within the level inputs.
    picked.sort_by(|a, b| b.creation_time().cmp(&a.creation_time()));

    // Destination files overlapping the union join the merge; they are
    // older than anything at the level above by construction.
    let mut dest_inputs: Vec<Arc<SSTable>> = levels[dest as usize]
        .iter()
        .filter(|table| table.overlaps(&low, &high))
        .cloned()
        .collect();
    dest_inputs.sort_by(|a, b| b.creation_time().cmp(&a.creation_time()));

    let mut inputs = picked;
    inputs.extend(dest_inputs);

    // Everything not merging can still shadow a tombstoned key.
    let shadows: Vec<Arc<SSTable>> = levels
        .iter()
        .flatten()
        .filter(|table| !inputs.iter().any(|input| Arc::ptr_eq(input, table)))
        .cloned()
        .collect();

    Some(Plan {
        inputs,
        dest,
        shadows,
    })
}

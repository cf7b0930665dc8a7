//! Shared fixtures for engine tests.

use crate::container::TableType;
use crate::engine::{DbConfig, Engine};
use std::path::Path;
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

pub fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::TRACE)
        .try_init();
}

/// Small memtable so flushes are easy to trigger deliberately.
pub fn small_config() -> DbConfig {
    DbConfig {
        memtable_max_bytes: 8 * 1024,
        ..DbConfig::default()
    }
}

pub fn open_history(dir: &TempDir) -> Engine {
    Engine::open(dir.path(), TableType::History, small_config()).unwrap()
}

/// Number of `.bdb` files in the directory root.
pub fn bdb_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_file() && e.path().extension().is_some_and(|ext| ext == "bdb")
        })
        .count()
}

/// Paths of `.bdb` files in the directory root.
pub fn bdb_paths(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "bdb"))
        .collect();
    paths.sort();
    paths
}

//! Integration tests for the public engine API.
//!
//! These tests exercise the full storage stack (memtable → sstable →
//! compaction → recovery) through the public `browserdb` surface only.
//! No internal modules are referenced.
//!
//! ## Coverage areas
//! - **Lifecycle**: open, close, idempotent close, reopen
//! - **CRUD**: put, get, delete, overwrite, nonexistent keys
//! - **Range**: ordered scans, tombstone filtering, inclusive bounds
//! - **Persistence**: data and deletes survive close → reopen
//! - **Compaction**: all three strategies preserve visibility
//! - **Heat**: hot-key extraction over a skewed access pattern
//! - **Concurrency**: readers during writes across threads

use browserdb::{CompactionStrategy, DbConfig, Engine, EngineError, TableType};
use std::thread;
use tempfile::TempDir;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Small write buffer to trigger frequent flushes and compactions.
fn small_buffer_config() -> DbConfig {
    DbConfig {
        memtable_max_bytes: 8 * 1024,
        ..DbConfig::default()
    }
}

fn reopen(path: &std::path::Path) -> Engine {
    Engine::open(path, TableType::History, small_buffer_config()).expect("reopen")
}

// ================================================================================================
// Lifecycle
// ================================================================================================

/// # Scenario
/// Open a fresh database and immediately close it.
///
/// # Expected behavior
/// Both operations succeed; closing twice stays silent.
#[test]
fn open_close_empty() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), TableType::History, DbConfig::default()).unwrap();
    engine.close().unwrap();
    engine.close().unwrap();
}

#[test]
fn operations_after_close_fail_cleanly() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), TableType::History, DbConfig::default()).unwrap();
    engine.close().unwrap();

    assert!(matches!(
        engine.put(b"k".to_vec(), b"v".to_vec()),
        Err(EngineError::NotInitialized)
    ));
    assert!(matches!(engine.get(b"k"), Err(EngineError::NotInitialized)));
}

// ================================================================================================
// CRUD + Range
// ================================================================================================

/// # Scenario
/// A thousand sequential writes, a point read, a delete, and a bounded
/// range scan.
///
/// # Actions
/// 1. Put `key0000..key0999` with matching values.
/// 2. Read `key0500`, then delete it and read again.
/// 3. Scan `[key0498, key0501]`.
///
/// # Expected behavior
/// The read sees the put; the delete hides it; the scan yields the three
/// surviving neighbours in ascending key order.
#[test]
fn thousand_writes_point_read_delete_range() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), TableType::History, small_buffer_config()).unwrap();

    for i in 0..1000u32 {
        engine
            .put(
                format!("key{i:04}").into_bytes(),
                format!("v{i}").into_bytes(),
            )
            .unwrap();
    }

    assert_eq!(engine.get(b"key0500").unwrap(), Some(b"v500".to_vec()));

    engine.delete(b"key0500".to_vec()).unwrap();
    assert_eq!(engine.get(b"key0500").unwrap(), None);

    let values: Vec<Vec<u8>> = engine
        .range(b"key0498", b"key0501")
        .unwrap()
        .map(|(_, v)| v)
        .collect();
    assert_eq!(
        values,
        vec![b"v498".to_vec(), b"v499".to_vec(), b"v501".to_vec()]
    );

    engine.close().unwrap();
}

#[test]
fn overwrite_returns_latest_value() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), TableType::History, DbConfig::default()).unwrap();

    for round in 0..10u8 {
        engine.put(b"counter".to_vec(), vec![round]).unwrap();
    }
    assert_eq!(engine.get(b"counter").unwrap(), Some(vec![9u8]));
    engine.close().unwrap();
}

#[test]
fn large_values_round_trip() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), TableType::Cache, DbConfig::default()).unwrap();

    // A cache body near the 1 MiB value ceiling.
    let body = vec![0x5A; 1024 * 1024];
    engine.put(b"https://example.org/big.js".to_vec(), body.clone()).unwrap();
    engine.flush().unwrap();

    assert_eq!(
        engine.get(b"https://example.org/big.js").unwrap(),
        Some(body)
    );
    engine.close().unwrap();
}

// ================================================================================================
// Persistence
// ================================================================================================

/// # Scenario
/// Writes and deletes must survive a full close → reopen cycle.
#[test]
fn persistence_across_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let engine = reopen(dir.path());
        for i in 0..200u32 {
            engine
                .put(format!("k{i:03}").into_bytes(), format!("v{i}").into_bytes())
                .unwrap();
        }
        engine.delete(b"k042".to_vec()).unwrap();
        engine.close().unwrap();
    }

    let engine = reopen(dir.path());
    assert_eq!(engine.get(b"k000").unwrap(), Some(b"v0".to_vec()));
    assert_eq!(engine.get(b"k199").unwrap(), Some(b"v199".to_vec()));
    assert_eq!(engine.get(b"k042").unwrap(), None);

    let scanned: Vec<_> = engine.range(b"k040", b"k044").unwrap().collect();
    let keys: Vec<Vec<u8>> = scanned.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(
        keys,
        vec![
            b"k040".to_vec(),
            b"k041".to_vec(),
            b"k043".to_vec(),
            b"k044".to_vec()
        ]
    );
    engine.close().unwrap();
}

#[test]
fn tables_share_a_directory_without_crosstalk() {
    let dir = TempDir::new().unwrap();

    let history = Engine::open(dir.path(), TableType::History, DbConfig::default()).unwrap();
    let cookies = Engine::open(dir.path(), TableType::Cookies, DbConfig::default()).unwrap();

    history.put(b"shared-key".to_vec(), b"from-history".to_vec()).unwrap();
    cookies.put(b"shared-key".to_vec(), b"from-cookies".to_vec()).unwrap();
    history.flush().unwrap();
    cookies.flush().unwrap();

    assert_eq!(
        history.get(b"shared-key").unwrap(),
        Some(b"from-history".to_vec())
    );
    assert_eq!(
        cookies.get(b"shared-key").unwrap(),
        Some(b"from-cookies".to_vec())
    );

    history.close().unwrap();
    cookies.close().unwrap();
}

// ================================================================================================
// Compaction
// ================================================================================================

/// # Scenario
/// Each strategy compacts a populated Level 0 without losing a key.
#[test]
fn every_strategy_preserves_visibility() {
    for strategy in [
        CompactionStrategy::Leveled,
        CompactionStrategy::SizeTiered,
        CompactionStrategy::Hybrid,
    ] {
        let dir = TempDir::new().unwrap();
        let config = DbConfig {
            memtable_max_bytes: 8 * 1024,
            l0_file_target: 100,
            ..DbConfig::default()
        };
        let engine = Engine::open(dir.path(), TableType::History, config).unwrap();

        for round in 0..5u8 {
            for key in 0..8u8 {
                engine.put(vec![key], vec![round, key]).unwrap();
            }
            engine.flush().unwrap();
        }

        engine.compact(strategy, 0).unwrap();

        for key in 0..8u8 {
            assert_eq!(
                engine.get(&[key]).unwrap(),
                Some(vec![4u8, key]),
                "{strategy:?} lost key {key}"
            );
        }
        engine.close().unwrap();
    }
}

#[test]
fn deleted_keys_stay_deleted_through_compaction_and_reopen() {
    let dir = TempDir::new().unwrap();
    let config = DbConfig {
        memtable_max_bytes: 8 * 1024,
        l0_file_target: 100,
        ..DbConfig::default()
    };
    let engine = Engine::open(dir.path(), TableType::History, config.clone()).unwrap();

    for i in 0..20u8 {
        engine.put(vec![i], vec![i; 8]).unwrap();
    }
    engine.flush().unwrap();
    for i in 0..10u8 {
        engine.delete(vec![i]).unwrap();
    }
    engine.flush().unwrap();
    engine.compact(CompactionStrategy::Leveled, 0).unwrap();

    for i in 0..10u8 {
        assert_eq!(engine.get(&[i]).unwrap(), None);
    }
    for i in 10..20u8 {
        assert_eq!(engine.get(&[i]).unwrap(), Some(vec![i; 8]));
    }
    engine.close().unwrap();

    let engine = Engine::open(dir.path(), TableType::History, config).unwrap();
    for i in 0..10u8 {
        assert_eq!(engine.get(&[i]).unwrap(), None);
    }
    engine.close().unwrap();
}

// ================================================================================================
// Heat
// ================================================================================================

/// # Scenario
/// A heavily skewed read pattern must surface exactly the hammered keys.
#[test]
fn hot_keys_reflect_skewed_access() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), TableType::Settings, DbConfig::default()).unwrap();

    for i in 0..500u32 {
        engine
            .put(format!("setting{i}").into_bytes(), b"off".to_vec())
            .unwrap();
    }

    let favorites: Vec<Vec<u8>> = (0..10u32)
        .map(|i| format!("favorite{i}").into_bytes())
        .collect();
    for key in &favorites {
        engine.put(key.clone(), b"on".to_vec()).unwrap();
        for _ in 0..100 {
            engine.get(key).unwrap();
        }
    }

    let hottest = engine.hot_keys(10);
    assert_eq!(hottest.len(), 10);
    for key in hottest {
        assert!(favorites.contains(&key));
    }
    engine.close().unwrap();
}

// ================================================================================================
// Concurrency
// ================================================================================================

/// # Scenario
/// Four writer threads and four reader threads share one engine.
///
/// # Expected behavior
/// No panics or lost writes; every key written is readable afterwards.
#[test]
fn concurrent_writers_and_readers() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), TableType::History, small_buffer_config()).unwrap();

    let mut handles = Vec::new();
    for writer in 0..4u8 {
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            for i in 0..100u32 {
                engine
                    .put(
                        format!("w{writer}-{i:03}").into_bytes(),
                        vec![writer; 16],
                    )
                    .unwrap();
            }
        }));
    }
    for _ in 0..4 {
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            for i in 0..100u32 {
                // Reads race the writers; any answer is fine, no panic.
                let _ = engine.get(format!("w0-{i:03}").as_bytes()).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for writer in 0..4u8 {
        for i in 0..100u32 {
            assert_eq!(
                engine.get(format!("w{writer}-{i:03}").as_bytes()).unwrap(),
                Some(vec![writer; 16])
            );
        }
    }
    engine.close().unwrap();
}

// ================================================================================================
// Full stack
// ================================================================================================

/// # Scenario
/// A full lifecycle: bulk writes across flush boundaries, deletes,
/// explicit compaction, a scan, stats, shutdown, reopen.
#[test]
fn full_stack_lifecycle() {
    let dir = TempDir::new().unwrap();
    let engine = reopen(dir.path());

    for i in 0..300u32 {
        engine
            .put(
                format!("row{i:04}").into_bytes(),
                format!("payload-{i}").into_bytes(),
            )
            .unwrap();
    }
    for i in (0..300u32).step_by(3) {
        engine.delete(format!("row{i:04}").into_bytes()).unwrap();
    }
    engine.flush().unwrap();
    // Background compactions may already occupy the pool; an exhausted
    // budget is acceptable here, anything else is not.
    match engine.compact(CompactionStrategy::Hybrid, 0) {
        Ok(_) => {}
        Err(EngineError::Compaction(browserdb::CompactionError::TooManyCompactions)) => {}
        Err(e) => panic!("compaction failed: {e}"),
    }

    let survivors = engine.range(b"row0000", b"row0299").unwrap().count();
    assert_eq!(survivors, 200);

    let stats = engine.stats().unwrap();
    assert_eq!(stats.corruption_events, 0);
    assert!(stats.sstable_count >= 1);
    assert_eq!(stats.level_file_counts.len(), 10);

    engine.close().unwrap();

    let engine = reopen(dir.path());
    assert_eq!(engine.get(b"row0000").unwrap(), None);
    assert_eq!(
        engine.get(b"row0001").unwrap(),
        Some(b"payload-1".to_vec())
    );
    assert_eq!(engine.range(b"row0000", b"row0299").unwrap().count(), 200);
    engine.close().unwrap();
}

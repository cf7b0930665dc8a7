//! Merged range scans across memtable and levels.

use super::helpers::open_history;
use tempfile::TempDir;

#[test]
fn range_merges_memtable_and_files_in_key_order() {
    let dir = TempDir::new().unwrap();
    let engine = open_history(&dir);

    engine.put(b"b".to_vec(), b"2".to_vec()).unwrap();
    engine.put(b"d".to_vec(), b"4".to_vec()).unwrap();
    engine.flush().unwrap();
    engine.put(b"a".to_vec(), b"1".to_vec()).unwrap();
    engine.put(b"c".to_vec(), b"3".to_vec()).unwrap();

    let scanned: Vec<_> = engine.range(b"a", b"d").unwrap().collect();
    assert_eq!(
        scanned,
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
            (b"d".to_vec(), b"4".to_vec()),
        ]
    );
    engine.close().unwrap();
}

#[test]
fn range_yields_newest_version_per_key() {
    let dir = TempDir::new().unwrap();
    let engine = open_history(&dir);

    engine.put(b"k".to_vec(), b"old".to_vec()).unwrap();
    engine.flush().unwrap();
    engine.put(b"k".to_vec(), b"mid".to_vec()).unwrap();
    engine.flush().unwrap();
    engine.put(b"k".to_vec(), b"new".to_vec()).unwrap();

    let scanned: Vec<_> = engine.range(b"a", b"z").unwrap().collect();
    assert_eq!(scanned, vec![(b"k".to_vec(), b"new".to_vec())]);
    engine.close().unwrap();
}

#[test]
fn range_suppresses_tombstoned_keys() {
    let dir = TempDir::new().unwrap();
    let engine = open_history(&dir);

    for i in 498..502u32 {
        engine
            .put(
                format!("key{i:04}").into_bytes(),
                format!("v{i}").into_bytes(),
            )
            .unwrap();
    }
    engine.flush().unwrap();
    engine.delete(b"key0500".to_vec()).unwrap();

    let values: Vec<Vec<u8>> = engine
        .range(b"key0498", b"key0501")
        .unwrap()
        .map(|(_, v)| v)
        .collect();
    assert_eq!(
        values,
        vec![b"v498".to_vec(), b"v499".to_vec(), b"v501".to_vec()],
        "deleted key must vanish, the rest stay ordered"
    );
    engine.close().unwrap();
}

#[test]
fn range_bounds_are_inclusive() {
    let dir = TempDir::new().unwrap();
    let engine = open_history(&dir);

    for key in [&b"a"[..], b"b", b"c"] {
        engine.put(key.to_vec(), key.to_vec()).unwrap();
    }

    let keys: Vec<Vec<u8>> = engine.range(b"a", b"c").unwrap().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

    let keys: Vec<Vec<u8>> = engine.range(b"b", b"b").unwrap().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![b"b".to_vec()]);
    engine.close().unwrap();
}

#[test]
fn empty_range_yields_nothing() {
    let dir = TempDir::new().unwrap();
    let engine = open_history(&dir);
    engine.put(b"k".to_vec(), b"v".to_vec()).unwrap();

    assert_eq!(engine.range(b"x", b"z").unwrap().count(), 0);
    engine.close().unwrap();
}

#[test]
fn end_to_end_thousand_records_with_delete() {
    let dir = TempDir::new().unwrap();
    let engine = open_history(&dir);

    for i in 0..1000u32 {
        engine
            .put(
                format!("key{i:04}").into_bytes(),
                format!("v{i}").into_bytes(),
            )
            .unwrap();
    }

    assert_eq!(
        engine.get(b"key0500").unwrap(),
        Some(b"v500".to_vec()),
        "freshly written key must be visible"
    );

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

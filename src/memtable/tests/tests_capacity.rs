//! Capacity accounting and the flush threshold.

use crate::container::EntryKind;
use crate::engine::utils::Record;
use crate::memtable::{Memtable, MemtableError};

/// Accounted size of one record with the given key/value lengths.
fn record_size(key_len: usize, value_len: usize) -> usize {
    std::mem::size_of::<Record>() + key_len + value_len
}

#[test]
fn put_past_capacity_is_rejected_and_state_unchanged() {
    // Room for exactly two small records.
    let max = record_size(1, 8) * 2;
    let mem = Memtable::new(max);

    mem.put(b"a".to_vec(), vec![0u8; 8], EntryKind::Insert)
        .unwrap();
    mem.put(b"b".to_vec(), vec![0u8; 8], EntryKind::Insert)
        .unwrap();

    let before = mem.accounted_bytes();
    let err = mem
        .put(b"c".to_vec(), vec![0u8; 8], EntryKind::Insert)
        .unwrap_err();
    assert!(matches!(err, MemtableError::OutOfCapacity { .. }), "got {err:?}");

    // Failed write left nothing behind.
    assert_eq!(mem.accounted_bytes(), before);
    assert_eq!(mem.len(), 2);
    assert!(mem.get(b"c").unwrap().is_none());
}

#[test]
fn overwrite_that_shrinks_never_trips_capacity() {
    let max = record_size(1, 64) + 8;
    let mem = Memtable::new(max);

    mem.put(b"k".to_vec(), vec![0u8; 64], EntryKind::Insert)
        .unwrap();
    // Replacing with a smaller value must succeed even near the cap.
    mem.put(b"k".to_vec(), vec![0u8; 8], EntryKind::Update)
        .unwrap();

    assert_eq!(mem.accounted_bytes(), record_size(1, 8));
}

#[test]
fn should_flush_at_eighty_percent() {
    let unit = record_size(1, 10);
    let mem = Memtable::new(unit * 10);

    for i in 0..7u8 {
        mem.put(vec![i], vec![0u8; 10], EntryKind::Insert).unwrap();
    }
    assert!(!mem.should_flush(), "70% full should not flush yet");

    mem.put(vec![200], vec![0u8; 10], EntryKind::Insert).unwrap();
    assert!(mem.should_flush(), "80% full must request a flush");
}

#[test]
fn drain_resets_accounting() {
    let mem = Memtable::new(64 * 1024);
    for i in 0..16u8 {
        mem.put(vec![i], vec![i; 32], EntryKind::Insert).unwrap();
    }
    assert!(mem.accounted_bytes() > 0);

    let drained = mem.drain_sorted().unwrap();
    assert_eq!(drained.len(), 16);
    assert_eq!(mem.accounted_bytes(), 0);
    assert!(mem.is_empty());
    assert!(!mem.should_flush());
}

#[test]
fn insert_64_byte_records_until_flush_then_drain() {
    // Mirrors the flush lifecycle: a 4 KiB buffer accepts 64-byte
    // payload records until the threshold trips, then drains them all.
    let mem = Memtable::new(4096);
    let mut inserted = 0u32;

    while !mem.should_flush() {
        let key = format!("key{inserted:04}").into_bytes();
        mem.put(key, vec![0xAB; 48], EntryKind::Insert).unwrap();
        inserted += 1;
        assert!(inserted < 1000, "threshold never tripped");
    }

    let drained = mem.drain_sorted().unwrap();
    assert_eq!(drained.len(), inserted as usize);
}

//! Corruption handling: per-entry CRC damage reads as counted misses;
//! header/footer damage makes the file unusable.

use crate::container::{ContainerError, FOOTER_SIZE, HEADER_SIZE, TableType, compute_crc};
use crate::engine::utils::Record;
use crate::sstable::{SSTable, SstWriter, SstableError};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FP_RATE: f64 = 0.01;

fn build_sample(dir: &TempDir) -> PathBuf {
    let records = vec![
        Record::insert(&b"k498"[..], &b"v498"[..], 1),
        Record::insert(&b"k499"[..], &b"v499"[..], 2),
        Record::insert(&b"k500"[..], &b"v500"[..], 3),
        Record::insert(&b"k501"[..], &b"v501"[..], 4),
    ];
    SstWriter::new(dir.path(), TableType::History, 0)
        .build(&records)
        .unwrap()
}

/// Re-computes and stores the footer's entry-region CRC so that only the
/// targeted damage is visible to the reader.
fn reseal_file_crc(bytes: &mut [u8]) {
    let footer_start = bytes.len() - FOOTER_SIZE;
    let crc = compute_crc(&[&bytes[HEADER_SIZE..footer_start]]);
    bytes[footer_start + 48..footer_start + 52].copy_from_slice(&crc.to_le_bytes());
}

/// Nudges the stored CRC of the entry holding `key` by `delta`, then
/// reseals the footer so the file itself still validates.
fn corrupt_entry_crc(path: &Path, key: &[u8], delta: i64) {
    let slot = {
        let table = SSTable::open(path, FP_RATE).unwrap();
        table
            .index()
            .iter()
            .find(|e| e.key == key)
            .cloned()
            .expect("key must be indexed")
    };

    let mut bytes = fs::read(path).unwrap();
    let crc_off = (slot.offset + u64::from(slot.size) - 4) as usize;
    let stored = u32::from_le_bytes(bytes[crc_off..crc_off + 4].try_into().unwrap());
    let tweaked = (i64::from(stored) + delta) as u32;
    bytes[crc_off..crc_off + 4].copy_from_slice(&tweaked.to_le_bytes());

    reseal_file_crc(&mut bytes);
    fs::write(path, bytes).unwrap();
}

#[test]
fn entry_crc_off_by_one_reads_as_counted_miss() {
    for delta in [1i64, -1] {
        let dir = TempDir::new().unwrap();
        let path = build_sample(&dir);
        corrupt_entry_crc(&path, b"k500", delta);

        let table = SSTable::open(&path, FP_RATE).unwrap();

        // Point lookup: miss, exactly one corruption event.
        assert!(table.get(b"k500").unwrap().is_none());
        assert_eq!(table.corruption_events(), 1);

        // Neighbours are unaffected.
        assert_eq!(table.get(b"k499").unwrap().unwrap().value, b"v499");
        assert_eq!(table.get(b"k501").unwrap().unwrap().value, b"v501");
    }
}

#[test]
fn range_scan_skips_corrupt_entry_and_counts_once() {
    let dir = TempDir::new().unwrap();
    let path = build_sample(&dir);
    corrupt_entry_crc(&path, b"k500", 1);

    let table = SSTable::open(&path, FP_RATE).unwrap();
    let values: Vec<Vec<u8>> = table.range(b"k498", b"k501").map(|r| r.value).collect();

    assert_eq!(
        values,
        vec![b"v498".to_vec(), b"v499".to_vec(), b"v501".to_vec()],
        "scan must yield the surrounding records in order"
    );
    assert_eq!(table.corruption_events(), 1);
}

#[test]
fn flipped_payload_byte_without_reseal_fails_open() {
    let dir = TempDir::new().unwrap();
    let path = build_sample(&dir);

    let mut bytes = fs::read(&path).unwrap();
    bytes[HEADER_SIZE + 10] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    // The entry-region CRC no longer matches the footer.
    let err = SSTable::open(&path, FP_RATE).unwrap_err();
    assert!(
        matches!(err, SstableError::Container(ContainerError::CrcMismatch { .. })),
        "got {err:?}"
    );
}

#[test]
fn version_byte_ff_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = build_sample(&dir);

    let mut bytes = fs::read(&path).unwrap();
    bytes[8] = 0xFF;
    // Re-seal the header CRC so the version check itself fires.
    let crc = compute_crc(&[&bytes[..HEADER_SIZE - 4]]);
    bytes[42..46].copy_from_slice(&crc.to_le_bytes());
    fs::write(&path, bytes).unwrap();

    let err = SSTable::open(&path, FP_RATE).unwrap_err();
    assert!(
        matches!(err, SstableError::Container(ContainerError::VersionTooNew { .. })),
        "got {err:?}"
    );
}

#[test]
fn damaged_header_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = build_sample(&dir);

    let mut bytes = fs::read(&path).unwrap();
    bytes[0] = b'X';
    fs::write(&path, bytes).unwrap();

    let err = SSTable::open(&path, FP_RATE).unwrap_err();
    assert!(
        matches!(err, SstableError::Container(ContainerError::InvalidHeader(_))),
        "got {err:?}"
    );
}

#[test]
fn truncated_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = build_sample(&dir);

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 7]).unwrap();

    let err = SSTable::open(&path, FP_RATE).unwrap_err();
    assert!(matches!(err, SstableError::Container(_)), "got {err:?}");
}

#[test]
fn footer_entry_count_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = build_sample(&dir);

    let mut bytes = fs::read(&path).unwrap();
    let footer_start = bytes.len() - FOOTER_SIZE;
    // Footer claims one more entry than the stream holds.
    let claimed = u64::from_le_bytes(bytes[footer_start..footer_start + 8].try_into().unwrap());
    bytes[footer_start..footer_start + 8].copy_from_slice(&(claimed + 1).to_le_bytes());
    fs::write(&path, bytes).unwrap();

    let err = SSTable::open(&path, FP_RATE).unwrap_err();
    assert!(
        matches!(err, SstableError::Container(ContainerError::Truncated(_))),
        "got {err:?}"
    );
}

//! Bounds-checked read/write/sync behavior of the mapped file.

use crate::mapped::{MappedFile, MappedFileError};
use tempfile::TempDir;

#[test]
fn create_write_sync_read_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("region.bin");

    let mut mapped = MappedFile::create(&path, 64, false).unwrap();
    assert_eq!(mapped.len(), 64);
    assert!(!mapped.is_read_only());

    mapped.write(0, b"head").unwrap();
    mapped.write(60, b"tail").unwrap();
    mapped.sync().unwrap();

    assert_eq!(mapped.read(0, 4).unwrap(), b"head");
    assert_eq!(mapped.read(60, 4).unwrap(), b"tail");
    // Untouched bytes read as zero.
    assert_eq!(mapped.read(4, 4).unwrap(), &[0, 0, 0, 0]);
}

#[test]
fn contents_survive_reopen_read_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("region.bin");

    {
        let mut mapped = MappedFile::create(&path, 16, false).unwrap();
        mapped.write(3, b"payload").unwrap();
        mapped.sync().unwrap();
    }

    let reopened = MappedFile::open_read_only(&path).unwrap();
    assert!(reopened.is_read_only());
    assert_eq!(reopened.len(), 16);
    assert_eq!(reopened.read(3, 7).unwrap(), b"payload");
}

#[test]
fn read_out_of_bounds_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mapped = MappedFile::create(dir.path().join("r.bin"), 8, false).unwrap();

    let err = mapped.read(4, 8).unwrap_err();
    assert!(matches!(err, MappedFileError::OutOfBounds { .. }), "got {err:?}");

    let err = mapped.read(9, 0).unwrap_err();
    assert!(matches!(err, MappedFileError::OutOfBounds { .. }), "got {err:?}");

    // Offset + len overflowing usize must not wrap around.
    let err = mapped.read(usize::MAX, 2).unwrap_err();
    assert!(matches!(err, MappedFileError::OutOfBounds { .. }), "got {err:?}");
}

#[test]
fn write_out_of_bounds_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut mapped = MappedFile::create(dir.path().join("w.bin"), 8, false).unwrap();

    let err = mapped.write(6, b"xyz").unwrap_err();
    assert!(matches!(err, MappedFileError::OutOfBounds { .. }), "got {err:?}");
}

#[test]
fn write_through_read_only_view_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ro.bin");
    {
        let mut mapped = MappedFile::create(&path, 8, false).unwrap();
        mapped.write(0, b"original").unwrap();
        mapped.sync().unwrap();
    }

    let mut mapped = MappedFile::open_read_only(&path).unwrap();
    let err = mapped.write(0, b"x").unwrap_err();
    assert!(matches!(err, MappedFileError::ReadOnlyWrite), "got {err:?}");
    // Read-only sync is a no-op, never an error.
    mapped.sync().unwrap();
    assert_eq!(mapped.read(0, 8).unwrap(), b"original");
}

#[test]
fn create_read_only_opens_existing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("existing.bin");
    {
        let mut mapped = MappedFile::create(&path, 4, false).unwrap();
        mapped.write(0, b"abcd").unwrap();
        mapped.sync().unwrap();
    }

    // `size` is ignored for read-only opens; the file length rules.
    let mapped = MappedFile::create(&path, 9999, true).unwrap();
    assert_eq!(mapped.len(), 4);
    assert_eq!(mapped.as_slice(), b"abcd");
}

#[test]
fn open_read_only_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let err = MappedFile::open_read_only(dir.path().join("absent.bin")).unwrap_err();
    assert!(matches!(err, MappedFileError::OpenFailed { .. }), "got {err:?}");
}

#[test]
fn view_extends_by_reopening_larger() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grow.bin");

    {
        let mut mapped = MappedFile::create(&path, 8, false).unwrap();
        mapped.write(0, b"12345678").unwrap();
        mapped.sync().unwrap();
    }

    let mut mapped = MappedFile::create(&path, 16, false).unwrap();
    assert_eq!(mapped.len(), 16);
    // Existing bytes preserved, new region zeroed.
    assert_eq!(mapped.read(0, 8).unwrap(), b"12345678");
    assert_eq!(mapped.read(8, 8).unwrap(), &[0u8; 8]);
    mapped.write(8, b"9abcdef0").unwrap();
    mapped.sync().unwrap();
}

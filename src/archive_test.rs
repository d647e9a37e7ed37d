use std::convert::TryInto;

use super::*;

#[test]
fn test_write_appends_data_and_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records");
    let archiver = FileArchiver::open(&path).unwrap();

    assert!(archiver.write(b"hello"));
    assert!(archiver.write(b"world!"));

    let data = std::fs::read(path.with_extension("data")).unwrap();
    assert_eq!(data, b"helloworld!");

    let index = std::fs::read(path.with_extension("index")).unwrap();
    assert_eq!(index.len(), 4 * 8);
    let off0 = u64::from_le_bytes(index[0..8].try_into().unwrap());
    let len0 = u64::from_le_bytes(index[8..16].try_into().unwrap());
    let off1 = u64::from_le_bytes(index[16..24].try_into().unwrap());
    let len1 = u64::from_le_bytes(index[24..32].try_into().unwrap());
    assert_eq!((off0, len0), (0, 5));
    assert_eq!((off1, len1), (5, 6));
}

#[test]
fn test_reopen_appends_after_existing_offset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records");
    {
        let archiver = FileArchiver::open(&path).unwrap();
        archiver.write(b"first");
    }
    let archiver = FileArchiver::open(&path).unwrap();
    archiver.write(b"second");
    let data = std::fs::read(path.with_extension("data")).unwrap();
    assert_eq!(data, b"firstsecond");
}

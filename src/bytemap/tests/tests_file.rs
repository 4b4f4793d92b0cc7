//! FileByteMap coverage — reopen replay, torn-tail truncation, corruption
//! rejection.

#[cfg(test)]
mod tests {
    use crate::bytemap::{Batch, ByteMapError, FileByteMap, MapSnapshot, SortedByteMap};
    use std::fs::OpenOptions;
    use std::io::{Read, Seek, SeekFrom, Write};
    use tempfile::TempDir;

    fn log_path(tmp: &TempDir) -> std::path::PathBuf {
        tmp.path().join("bytemap.log")
    }

    fn put_one(map: &FileByteMap, key: &[u8], value: &[u8]) {
        let mut batch = Batch::new();
        batch.put(key.to_vec(), value.to_vec());
        map.apply(batch).unwrap();
    }

    #[test]
    fn reopen_replays_committed_batches() {
        let tmp = TempDir::new().unwrap();
        let path = log_path(&tmp);

        {
            let map = FileByteMap::open(&path).unwrap();
            put_one(&map, b"a", b"1");
            put_one(&map, b"b", b"2");

            let mut batch = Batch::new();
            batch.remove(b"a".to_vec());
            map.apply(batch).unwrap();
        }

        let map = FileByteMap::open(&path).unwrap();
        let snap = map.snapshot();
        assert_eq!(snap.get(b"a"), None);
        assert_eq!(snap.get(b"b"), Some(b"2".to_vec()));
    }

    #[test]
    fn reopen_replays_range_removal() {
        let tmp = TempDir::new().unwrap();
        let path = log_path(&tmp);

        {
            let map = FileByteMap::open(&path).unwrap();
            put_one(&map, b"k1", b"x");
            put_one(&map, b"k2", b"y");
            put_one(&map, b"k3", b"z");

            let mut batch = Batch::new();
            batch.remove_range(b"k1".to_vec(), b"k3".to_vec());
            map.apply(batch).unwrap();
        }

        let map = FileByteMap::open(&path).unwrap();
        let snap = map.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get(b"k3"), Some(b"z".to_vec()));
    }

    #[test]
    fn empty_log_reopens_empty() {
        let tmp = TempDir::new().unwrap();
        let path = log_path(&tmp);
        drop(FileByteMap::open(&path).unwrap());
        let map = FileByteMap::open(&path).unwrap();
        assert!(map.snapshot().is_empty());
    }

    #[test]
    fn torn_tail_is_truncated_and_tolerated() {
        let tmp = TempDir::new().unwrap();
        let path = log_path(&tmp);

        {
            let map = FileByteMap::open(&path).unwrap();
            put_one(&map, b"a", b"1");
            put_one(&map, b"b", b"2");
        }

        // Chop bytes off the last record to simulate a crash mid-append.
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        let len = file.metadata().unwrap().len();
        file.set_len(len - 3).unwrap();

        let map = FileByteMap::open(&path).unwrap();
        let snap = map.snapshot();
        assert_eq!(snap.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(snap.get(b"b"), None);

        // The torn tail is gone: appends after reopen land cleanly.
        put_one(&map, b"c", b"3");
        drop(map);
        let map = FileByteMap::open(&path).unwrap();
        let snap = map.snapshot();
        assert_eq!(snap.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(snap.get(b"c"), Some(b"3".to_vec()));
    }

    #[test]
    fn tail_checksum_mismatch_drops_only_the_tail() {
        let tmp = TempDir::new().unwrap();
        let path = log_path(&tmp);

        {
            let map = FileByteMap::open(&path).unwrap();
            put_one(&map, b"a", b"1");
            put_one(&map, b"b", b"2");
        }

        // Flip a byte inside the *last* record's payload.
        let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let len = file.metadata().unwrap().len();
        file.seek(SeekFrom::Start(len - 6)).unwrap();
        let mut byte = [0u8; 1];
        file.read_exact(&mut byte).unwrap();
        file.seek(SeekFrom::Start(len - 6)).unwrap();
        file.write_all(&[byte[0] ^ 0xFF]).unwrap();

        let map = FileByteMap::open(&path).unwrap();
        let snap = map.snapshot();
        assert_eq!(snap.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(snap.get(b"b"), None);
    }

    #[test]
    fn corrupted_header_fails_open() {
        let tmp = TempDir::new().unwrap();
        let path = log_path(&tmp);
        drop(FileByteMap::open(&path).unwrap());

        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(b"XXXX").unwrap();

        assert!(matches!(
            FileByteMap::open(&path),
            Err(ByteMapError::InvalidHeader(_))
        ));
    }

    #[test]
    fn snapshot_isolation_holds_for_file_backend() {
        let tmp = TempDir::new().unwrap();
        let map = FileByteMap::open(log_path(&tmp)).unwrap();
        put_one(&map, b"k", b"old");

        let snap = map.snapshot();
        put_one(&map, b"k", b"new");

        assert_eq!(snap.get(b"k"), Some(b"old".to_vec()));
        assert_eq!(map.snapshot().get(b"k"), Some(b"new".to_vec()));
    }
}

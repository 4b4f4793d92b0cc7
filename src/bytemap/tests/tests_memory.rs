//! Basic MemoryByteMap coverage — batch application and seek semantics.

#[cfg(test)]
mod tests {
    use crate::bytemap::{Batch, MapSnapshot, MemoryByteMap, SortedByteMap};

    fn seeded() -> MemoryByteMap {
        let map = MemoryByteMap::new();
        let mut batch = Batch::new();
        for key in [b"b".to_vec(), b"d".to_vec(), b"f".to_vec()] {
            let value = key.repeat(2);
            batch.put(key, value);
        }
        map.apply(batch).unwrap();
        map
    }

    #[test]
    fn put_then_get() {
        let map = seeded();
        let snap = map.snapshot();
        assert_eq!(snap.get(b"b"), Some(b"bb".to_vec()));
        assert_eq!(snap.get(b"c"), None);
        assert_eq!(snap.len(), 3);
    }

    #[test]
    fn overwrite_replaces_value() {
        let map = seeded();
        let mut batch = Batch::new();
        batch.put(b"b".to_vec(), b"new".to_vec());
        map.apply(batch).unwrap();
        assert_eq!(map.snapshot().get(b"b"), Some(b"new".to_vec()));
    }

    #[test]
    fn remove_is_idempotent() {
        let map = seeded();
        let mut batch = Batch::new();
        batch.remove(b"d".to_vec());
        batch.remove(b"missing".to_vec());
        map.apply(batch).unwrap();

        let snap = map.snapshot();
        assert_eq!(snap.get(b"d"), None);
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn remove_range_half_open() {
        let map = seeded();
        let mut batch = Batch::new();
        batch.remove_range(b"b".to_vec(), b"f".to_vec());
        map.apply(batch).unwrap();

        let snap = map.snapshot();
        assert_eq!(snap.get(b"b"), None);
        assert_eq!(snap.get(b"d"), None);
        // Exclusive upper bound: "f" survives.
        assert_eq!(snap.get(b"f"), Some(b"ff".to_vec()));
    }

    #[test]
    fn remove_range_empty_and_inverted_bounds() {
        let map = seeded();
        let mut batch = Batch::new();
        batch.remove_range(b"d".to_vec(), b"d".to_vec());
        batch.remove_range(b"z".to_vec(), b"a".to_vec());
        map.apply(batch).unwrap();
        assert_eq!(map.snapshot().len(), 3);
    }

    #[test]
    fn batch_ops_apply_in_order() {
        let map = MemoryByteMap::new();
        let mut batch = Batch::new();
        batch.put(b"k".to_vec(), b"v1".to_vec());
        batch.remove(b"k".to_vec());
        batch.put(b"k".to_vec(), b"v2".to_vec());
        map.apply(batch).unwrap();
        assert_eq!(map.snapshot().get(b"k"), Some(b"v2".to_vec()));
    }

    #[test]
    fn seek_floor_and_ceiling() {
        let map = seeded();
        let snap = map.snapshot();

        assert_eq!(snap.seek_floor(b"c").unwrap().0, b"b".to_vec());
        assert_eq!(snap.seek_floor(b"b").unwrap().0, b"b".to_vec());
        assert_eq!(snap.seek_floor(b"a"), None);

        assert_eq!(snap.seek_ceiling(b"c").unwrap().0, b"d".to_vec());
        assert_eq!(snap.seek_ceiling(b"d").unwrap().0, b"d".to_vec());
        assert_eq!(snap.seek_ceiling(b"g"), None);
    }

    #[test]
    fn seek_before_and_after_are_strict() {
        let map = seeded();
        let snap = map.snapshot();

        assert_eq!(snap.seek_before(b"d").unwrap().0, b"b".to_vec());
        assert_eq!(snap.seek_before(b"b"), None);

        assert_eq!(snap.seek_after(b"d").unwrap().0, b"f".to_vec());
        assert_eq!(snap.seek_after(b"f"), None);
    }

    #[test]
    fn seeks_on_empty_map() {
        let snap = MemoryByteMap::new().snapshot();
        assert!(snap.is_empty());
        assert_eq!(snap.seek_floor(b"x"), None);
        assert_eq!(snap.seek_ceiling(b""), None);
        assert_eq!(snap.seek_after(b""), None);
    }
}

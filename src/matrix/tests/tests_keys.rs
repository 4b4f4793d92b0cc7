//! Key enumeration — live keys at a timestamp, and all keys ever.

#[cfg(test)]
mod tests {
    use crate::matrix::tests::helpers::*;

    #[test]
    fn keys_reflect_the_read_timestamp() {
        let m = seeded_matrix();

        let at = |t: i64| -> Vec<String> { m.keys(t).unwrap().collect() };

        assert!(at(0).is_empty());
        assert_eq!(at(1), vec!["a"]);
        assert_eq!(at(3), vec!["a", "b"]);
        assert_eq!(at(4), vec!["a", "b"]);
        // b is deleted at 5; a stays live through its t=3 value.
        assert_eq!(at(5), vec!["a"]);
        assert_eq!(at(i64::MAX), vec!["a"]);
    }

    #[test]
    fn keys_are_lexicographic() {
        let m = matrix();
        m.put(
            1,
            batch(&[("zebra", Some(b"1")), ("ant", Some(b"2")), ("mole", Some(b"3"))]),
        )
        .unwrap();

        let keys: Vec<String> = m.keys(1).unwrap().collect();
        assert_eq!(keys, vec!["ant", "mole", "zebra"]);
    }

    #[test]
    fn keys_skip_tombstoned_but_all_keys_do_not() {
        let m = seeded_matrix();

        let live: Vec<String> = m.keys(i64::MAX).unwrap().collect();
        assert_eq!(live, vec!["a"]);

        let all: Vec<String> = m.all_keys().unwrap().collect();
        assert_eq!(all, vec!["a", "b"]);
    }

    #[test]
    fn all_keys_deduplicates_across_entries() {
        let m = matrix();
        for t in 1..=4 {
            m.put(t, batch(&[("k", Some(b"x"))])).unwrap();
        }
        let all: Vec<String> = m.all_keys().unwrap().collect();
        assert_eq!(all, vec!["k"]);
    }

    #[test]
    fn all_keys_includes_delete_only_keys() {
        let m = matrix();
        m.put(1, batch(&[("phantom", None)])).unwrap();

        assert_eq!(m.get(1, "phantom").unwrap(), None);
        let all: Vec<String> = m.all_keys().unwrap().collect();
        assert_eq!(all, vec!["phantom"]);
    }

    #[test]
    fn key_with_empty_value_counts_as_live() {
        let m = matrix();
        m.put(1, batch(&[("k", Some(b""))])).unwrap();
        let live: Vec<String> = m.keys(1).unwrap().collect();
        assert_eq!(live, vec!["k"]);
    }

    #[test]
    fn keys_iterator_is_restartable() {
        let m = seeded_matrix();
        let first: Vec<String> = m.keys(3).unwrap().collect();
        let second: Vec<String> = m.keys(3).unwrap().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn nul_heavy_keys_enumerate_cleanly() {
        let m = matrix();
        m.put(
            1,
            batch(&[("a", Some(b"1")), ("a\0", Some(b"2")), ("a\0\0", Some(b"3"))]),
        )
        .unwrap();

        let keys: Vec<String> = m.keys(1).unwrap().collect();
        assert_eq!(keys, vec!["a", "a\0", "a\0\0"]);
    }
}

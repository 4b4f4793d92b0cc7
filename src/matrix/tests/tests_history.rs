//! Per-key history walks — descending order, bounds, tombstones included.

#[cfg(test)]
mod tests {
    use crate::matrix::MatrixError;
    use crate::matrix::tests::helpers::*;

    #[test]
    fn history_is_descending_and_complete() {
        let m = seeded_matrix();
        let ts: Vec<i64> = m.history(i64::MAX, "b").unwrap().collect();
        assert_eq!(ts, vec![5, 3]);
    }

    #[test]
    fn history_respects_upper_bound() {
        let m = seeded_matrix();
        let ts: Vec<i64> = m.history(4, "b").unwrap().collect();
        assert_eq!(ts, vec![3]);

        let ts: Vec<i64> = m.history(2, "b").unwrap().collect();
        assert!(ts.is_empty());
    }

    #[test]
    fn history_bound_is_inclusive() {
        let m = seeded_matrix();
        let ts: Vec<i64> = m.history(5, "b").unwrap().collect();
        assert_eq!(ts, vec![5, 3]);
    }

    #[test]
    fn history_includes_tombstone_writes() {
        let m = seeded_matrix();
        // b's entry at 5 is a tombstone and still shows up.
        assert!(m.history(i64::MAX, "b").unwrap().any(|ts| ts == 5));
    }

    #[test]
    fn history_of_unknown_key_is_empty() {
        let m = seeded_matrix();
        assert_eq!(m.history(i64::MAX, "nope").unwrap().count(), 0);
    }

    #[test]
    fn history_ascending_is_strictly_monotonic() {
        let m = matrix();
        for t in [1, 2, 5, 9, 100] {
            m.put(t, batch(&[("k", Some(b"x"))])).unwrap();
        }

        let mut ts: Vec<i64> = m.history(i64::MAX, "k").unwrap().collect();
        ts.reverse();
        assert_eq!(ts, vec![1, 2, 5, 9, 100]);
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn history_is_restartable() {
        let m = seeded_matrix();
        let first: Vec<i64> = m.history(i64::MAX, "a").unwrap().collect();
        let second: Vec<i64> = m.history(i64::MAX, "a").unwrap().collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![3, 1]);
    }

    #[test]
    fn history_rejects_invalid_arguments() {
        let m = seeded_matrix();
        assert!(matches!(
            m.history(-1, "a"),
            Err(MatrixError::InvalidArgument(_))
        ));
        assert!(matches!(
            m.history(1, ""),
            Err(MatrixError::InvalidArgument(_))
        ));
    }
}

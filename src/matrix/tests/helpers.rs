use std::collections::BTreeMap;

use tracing_subscriber::EnvFilter;

use crate::bytemap::MemoryByteMap;
use crate::matrix::TemporalMatrix;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fresh in-memory matrix for keyspace `"default"` created at timestamp 0.
pub fn matrix() -> TemporalMatrix<MemoryByteMap> {
    init_tracing();
    TemporalMatrix::in_memory("default", 0).unwrap()
}

/// Builds a `put` batch from `(key, payload)` pairs; `None` is a tombstone.
pub fn batch(pairs: &[(&str, Option<&[u8]>)]) -> BTreeMap<String, Option<Vec<u8>>> {
    pairs
        .iter()
        .map(|(key, payload)| (key.to_string(), payload.map(|p| p.to_vec())))
        .collect()
}

/// The canonical three-commit fixture:
///
/// ```text
/// t=1: a ← "V1"
/// t=3: a ← "V3", b ← "V4"
/// t=5: b ← tombstone
/// ```
pub fn seeded_matrix() -> TemporalMatrix<MemoryByteMap> {
    let m = matrix();
    m.put(1, batch(&[("a", Some(b"V1"))])).unwrap();
    m.put(3, batch(&[("a", Some(b"V3")), ("b", Some(b"V4"))]))
        .unwrap();
    m.put(5, batch(&[("b", None)])).unwrap();
    m
}

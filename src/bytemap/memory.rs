//! In-memory MVCC byte-map.
//!
//! [`MemoryByteMap`] keeps the current map version behind an
//! `RwLock<Arc<BTreeMap>>`. A commit takes the write lock, obtains a
//! mutable image via [`Arc::make_mut`] — which clones the tree only while
//! snapshots are still pinning the old version — applies the batch, and
//! releases the lock. Installing the batch under the lock makes the whole
//! commit a single version bump: no reader ever observes a half-applied
//! batch.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::{Arc, RwLock};

use tracing::trace;

use super::{Batch, ByteMapError, MapSnapshot, SortedByteMap, apply_op};

/// The MVCC append-and-swap map described in the
/// [module documentation](super).
#[derive(Debug, Default)]
pub struct MemoryByteMap {
    /// Current map version. Snapshots clone the `Arc`; commits mutate
    /// (or clone-on-write) under the write lock.
    current: RwLock<Arc<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryByteMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from a pre-populated image. Used by the file adapter
    /// after replay.
    pub(crate) fn from_image(image: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        Self {
            current: RwLock::new(Arc::new(image)),
        }
    }
}

impl SortedByteMap for MemoryByteMap {
    type Snapshot = MemorySnapshot;

    fn snapshot(&self) -> MemorySnapshot {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        MemorySnapshot {
            tree: Arc::clone(&guard),
        }
    }

    fn apply(&self, batch: Batch) -> Result<(), ByteMapError> {
        let mut guard = self
            .current
            .write()
            .map_err(|_| ByteMapError::Internal("RwLock poisoned".into()))?;

        let tree = Arc::make_mut(&mut guard);
        for op in batch.ops() {
            apply_op(tree, op);
        }

        trace!(ops = batch.len(), rows = tree.len(), "batch committed");
        Ok(())
    }
}

/// A pinned version of a [`MemoryByteMap`]. Holding one keeps that version
/// alive; later commits copy-on-write instead of mutating it.
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    tree: Arc<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MapSnapshot for MemorySnapshot {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.tree.get(key).cloned()
    }

    fn seek_floor(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        self.tree
            .range::<[u8], _>((Unbounded, Included(key)))
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn seek_ceiling(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        self.tree
            .range::<[u8], _>((Included(key), Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn seek_before(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        self.tree
            .range::<[u8], _>((Unbounded, Excluded(key)))
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn seek_after(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        self.tree
            .range::<[u8], _>((Excluded(key), Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn len(&self) -> usize {
        self.tree.len()
    }
}

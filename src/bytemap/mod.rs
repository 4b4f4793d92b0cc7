//! # Sorted byte-map abstraction
//!
//! The temporal index stores every row of a keyspace in one sorted map from
//! byte keys to byte values. This module defines that downstream contract —
//! [`SortedByteMap`] for atomic writes and [`MapSnapshot`] for pinned-version
//! reads — plus the two bundled adapters:
//!
//! - [`MemoryByteMap`] — an MVCC append-and-swap map. Commits install a new
//!   map version atomically; snapshots pin the version current at
//!   construction and are never affected by later writes.
//! - [`FileByteMap`](file::FileByteMap) — a persistent adapter: an
//!   append-only, CRC-protected batch log replayed into a memory image on
//!   open.
//!
//! ## Contract
//!
//! - `apply` commits a whole [`Batch`] atomically: readers observe either
//!   none or all of its operations.
//! - Snapshots are immutable in-memory images; their reads are infallible
//!   by design. I/O failures can only surface from `apply` and open/replay.
//! - Writers are serialized by the caller; concurrent readers are always
//!   safe.

#[cfg(test)]
mod tests;

mod file;
mod memory;

pub use file::FileByteMap;
pub use memory::{MemoryByteMap, MemorySnapshot};

use std::collections::BTreeMap;
use std::io;
use std::ops::Bound::{Excluded, Included};

use thiserror::Error;

use crate::encoding::EncodingError;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by byte-map adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ByteMapError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding / decoding error while reading or writing the batch log.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Data integrity failure — checksum did not match.
    #[error("Checksum mismatch")]
    ChecksumMismatch,

    /// Log header failed integrity validation.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// A batch record exceeds the log's record size limit.
    #[error("Record size exceeds limit ({0} bytes)")]
    RecordTooLarge(usize),

    /// Internal invariant violation or poisoned lock.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Batch
// ------------------------------------------------------------------------------------------------

/// A single operation inside a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite one key.
    Put {
        /// Row key.
        key: Vec<u8>,
        /// Row value.
        value: Vec<u8>,
    },

    /// Remove one key (no-op if absent).
    Remove {
        /// Row key.
        key: Vec<u8>,
    },

    /// Remove every key in `[from, to)`.
    RemoveRange {
        /// Inclusive lower bound.
        from: Vec<u8>,
        /// Exclusive upper bound.
        to: Vec<u8>,
    },
}

/// An ordered set of operations committed atomically by
/// [`SortedByteMap::apply`].
#[derive(Debug, Default, Clone)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages an insert/overwrite.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { key, value });
    }

    /// Stages a single-key removal.
    pub fn remove(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Remove { key });
    }

    /// Stages a range removal over `[from, to)`.
    pub fn remove_range(&mut self, from: Vec<u8>, to: Vec<u8>) {
        self.ops.push(BatchOp::RemoveRange { from, to });
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// `true` if no operations are staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The staged operations in commit order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

/// Applies one operation to a plain tree image. Shared by the memory
/// adapter's commit path and the file adapter's replay path.
pub(crate) fn apply_op(tree: &mut BTreeMap<Vec<u8>, Vec<u8>>, op: &BatchOp) {
    match op {
        BatchOp::Put { key, value } => {
            tree.insert(key.clone(), value.clone());
        }
        BatchOp::Remove { key } => {
            tree.remove(key);
        }
        BatchOp::RemoveRange { from, to } => {
            if from >= to {
                return;
            }
            let doomed: Vec<Vec<u8>> = tree
                .range::<[u8], _>((Included(from.as_slice()), Excluded(to.as_slice())))
                .map(|(k, _)| k.clone())
                .collect();
            for key in doomed {
                tree.remove(&key);
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Traits
// ------------------------------------------------------------------------------------------------

/// A sorted map from byte keys to byte values with atomic batch commits and
/// pinned-version snapshots.
///
/// Implementations must guarantee that `apply` is atomic with respect to
/// snapshots: a snapshot taken before a commit never observes any of its
/// operations, one taken after observes all of them.
pub trait SortedByteMap: Send + Sync + 'static {
    /// The pinned-version read handle produced by [`Self::snapshot`].
    type Snapshot: MapSnapshot;

    /// Pins the current map version for reading. Cheap; the returned
    /// snapshot is unaffected by later commits.
    fn snapshot(&self) -> Self::Snapshot;

    /// Commits `batch` atomically.
    fn apply(&self, batch: Batch) -> Result<(), ByteMapError>;
}

/// Read operations over one pinned map version.
///
/// All seeks return owned `(key, value)` pairs; reads are infallible
/// because a snapshot is an immutable in-memory image.
pub trait MapSnapshot: Send + Sync + 'static {
    /// Exact lookup.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Greatest row with key `≤ key`.
    fn seek_floor(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Least row with key `≥ key`.
    fn seek_ceiling(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Greatest row with key `< key`.
    fn seek_before(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Least row with key `> key`.
    fn seek_after(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Number of rows in this version.
    fn len(&self) -> usize;

    /// `true` if this version holds no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

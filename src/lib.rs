//! # TempusDB
//!
//! An embeddable, **versioned** key-value store with full temporal history.
//! Every keyspace keeps every write it ever accepted, so any past state can
//! be reconstructed, any key's value trajectory recovered, and any window of
//! commits enumerated or rolled back.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  TemporalMatrix                      │
//! │  point-in-time gets · ranged gets · key walks ·      │
//! │  history · snapshot iteration · put / bulk load /    │
//! │  rollback · lifecycle + read leases                  │
//! ├──────────────────────────────────────────────────────┤
//! │                  Temporal Index                      │
//! │  (user_key, ts) entry rows · (ts, user_key)          │
//! │  timeline rows · bounded seeks                       │
//! ├──────────────────────────────────────────────────────┤
//! │                 Sorted byte-map                      │
//! │  MemoryByteMap (MVCC swap) · FileByteMap             │
//! │  (CRC-protected batch log)                           │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`matrix`] | Matrix operations, mutation pipeline, lifecycle |
//! | [`index`] | Temporal index — bounded seeks over encoded rows |
//! | [`bytemap`] | Sorted byte-map contract and bundled adapters |
//! | [`encoding`] | Byte-stable wire format for rows and metadata |
//!
//! ## Key Features
//!
//! - **Full history** — writes are immutable `(user_key, timestamp)`
//!   entries; deletes are explicit tombstone entries, never absence.
//! - **Point-in-time reads** — every query resolves against the entry with
//!   the greatest timestamp at or below the read timestamp.
//! - **Snapshot isolation** — readers and iterators pin a map version at
//!   construction; no half-applied batch is ever visible.
//! - **Rollback** — truncating the history to a timestamp is atomic and
//!   leaves the matrix observationally identical to one that never saw the
//!   removed writes.
//! - **Pluggable backends** — the matrix consumes a minimal sorted
//!   byte-map trait; volatile and persistent reference adapters are
//!   bundled.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use tempusdb::TemporalMatrix;
//!
//! let matrix = TemporalMatrix::in_memory("default", 0).unwrap();
//!
//! // Commit a batch at timestamp 1.
//! let mut batch = BTreeMap::new();
//! batch.insert("greeting".to_string(), Some(b"hello".to_vec()));
//! matrix.put(1, batch).unwrap();
//!
//! // Delete at timestamp 2 (an explicit tombstone entry).
//! let mut batch = BTreeMap::new();
//! batch.insert("greeting".to_string(), None);
//! matrix.put(2, batch).unwrap();
//!
//! // The past stays readable.
//! assert_eq!(matrix.get(1, "greeting").unwrap(), Some(b"hello".to_vec()));
//! assert_eq!(matrix.get(2, "greeting").unwrap(), None);
//!
//! // And the trajectory is recoverable, most recent first.
//! let history: Vec<i64> = matrix.history(i64::MAX, "greeting").unwrap().collect();
//! assert_eq!(history, vec![2, 1]);
//! ```

pub mod bytemap;
pub mod encoding;
pub mod index;
pub mod matrix;

pub use bytemap::{
    Batch, BatchOp, ByteMapError, FileByteMap, MapSnapshot, MemoryByteMap, SortedByteMap,
};
pub use index::{Entry, TemporalIndex};
pub use matrix::{
    MatrixConfig, MatrixError, MatrixPhase, NO_COMMIT, RangedValue, TemporalMatrix, ValidityPeriod,
};

//! # Temporal Matrix
//!
//! This module implements the full-history storage core of one keyspace: a
//! **versioned**, **embeddable** key-value matrix in which every write is an
//! immutable `(user_key, timestamp)` entry, any past state can be
//! reconstructed, any key's value trajectory recovered, and any window of
//! commits enumerated.
//!
//! ## Design Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      TemporalMatrix                       │
//! │  ┌─────────────────┐  ┌───────────────┐  ┌─────────────┐  │
//! │  │  Matrix ops     │  │  Mutation     │  │  Metadata + │  │
//! │  │  get / ranged / │  │  pipeline     │  │  last-commit│  │
//! │  │  keys / history │  │  put / insert │  │  cache      │  │
//! │  │  / snapshots    │  │  / rollback   │  │             │  │
//! │  └───────┬─────────┘  └──────┬────────┘  └──────┬──────┘  │
//! │          │  bounded seeks    │  atomic batches  │         │
//! │  ┌───────┴───────────────────┴──────────────────┴──────┐  │
//! │  │          Temporal Index  (sorted byte-map)          │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads resolve against a pinned index snapshot; writes commit one atomic
//! batch and bump the keyspace's monotonic timestamp.
//!
//! ## Concurrency Model
//!
//! Mutable matrix state (the last committed timestamp and the last-commit
//! cache) lives behind a single `RwLock`, which also serializes writers.
//! Readers never take that lock on the data path — they pin a byte-map
//! snapshot instead, so a read started at any moment observes exactly the
//! batches committed before it and no half-applied write, ever. Iterators
//! additionally hold a read lease used to drain the matrix on close.
//!
//! ## Guarantees
//!
//! - **Monotonicity:** accepted write timestamps strictly increase per
//!   keyspace; entries of one user key strictly increase by construction.
//! - **Explicit deletion:** removing a key writes a tombstone entry;
//!   absence of any entry up to `t` means the key never existed before `t`.
//! - **Atomic batches:** all entries of one [`TemporalMatrix::put`] become
//!   visible together.
//! - **Complete rollback:** after [`TemporalMatrix::rollback`] the matrix is
//!   observationally identical to one that never saw the removed writes.

#[cfg(test)]
mod tests;

pub mod iter;
mod lifecycle;

pub use iter::{
    AllKeysIter, CommitTimestampsIter, EntriesIter, HistoryIter, KeysIter, ModificationsIter,
};
pub use lifecycle::MatrixPhase;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, error, info, trace};

use crate::bytemap::{Batch, ByteMapError, MemoryByteMap, SortedByteMap};
use crate::encoding::KeyspaceMeta;
use crate::index::{Entry, TemporalIndex};

use lifecycle::{Lifecycle, ReadLease};

/// Sentinel returned by [`TemporalMatrix::last_commit_timestamp`] for a user
/// key with no entries.
pub const NO_COMMIT: i64 = -1;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by matrix operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MatrixError {
    /// Negative timestamp, empty key, inverted window, or mismatched
    /// metadata at open.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Write at a timestamp not strictly above the last committed one.
    #[error("monotonicity violation: timestamp {attempted} is not after {last_committed}")]
    MonotonicityViolation {
        /// The rejected write timestamp.
        attempted: i64,
        /// The keyspace's last committed timestamp.
        last_committed: i64,
    },

    /// Bulk load hit an existing `(key, ts)` entry with a different payload,
    /// or an entry below the creation timestamp.
    #[error("conflicting entry for key {key:?} at timestamp {timestamp}")]
    Conflict {
        /// The conflicting user key.
        key: String,
        /// The conflicting timestamp.
        timestamp: i64,
    },

    /// Underlying byte-map failure; non-recoverable at this layer.
    #[error("storage failure: {0}")]
    Storage(#[from] ByteMapError),

    /// Operation attempted while the matrix was `Closing` or `Closed`.
    #[error("matrix is not open (phase: {phase:?})")]
    Closed {
        /// Phase the matrix was in.
        phase: MatrixPhase,
    },
}

// ------------------------------------------------------------------------------------------------
// Config / result types
// ------------------------------------------------------------------------------------------------

/// Configuration for a [`TemporalMatrix`] instance.
#[derive(Debug, Clone)]
pub struct MatrixConfig {
    /// Keep an in-memory per-key last-commit pointer. The pointer is a
    /// derived datum — rebuilt lazily, invalidated by rollback — so this
    /// only trades memory for `last_commit_timestamp` speed.
    pub cache_last_commits: bool,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            cache_last_commits: true,
        }
    }
}

/// Half-open validity interval `[lo, hi)`; `hi == None` encodes `+∞`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityPeriod {
    /// Inclusive lower bound.
    pub lo: i64,
    /// Exclusive upper bound, unbounded when `None`.
    pub hi: Option<i64>,
}

impl ValidityPeriod {
    /// `true` if `t` falls inside the interval.
    pub fn contains(&self, t: i64) -> bool {
        t >= self.lo && self.hi.is_none_or(|hi| t < hi)
    }
}

/// Result of [`TemporalMatrix::get_ranged`]: the value resolved at the read
/// timestamp plus the interval over which that resolution stays valid.
/// `value == None` (absent or deleted) still carries the period, so callers
/// can cache negative lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangedValue {
    /// Resolved payload; `None` when the key is absent or deleted.
    pub value: Option<Vec<u8>>,
    /// Interval during which the resolution holds.
    pub period: ValidityPeriod,
}

// ------------------------------------------------------------------------------------------------
// TemporalMatrix
// ------------------------------------------------------------------------------------------------

/// Mutable matrix state; the write lock doubles as the writer serialization
/// point.
#[derive(Debug)]
struct MatrixInner {
    /// Greatest timestamp ever accepted by this matrix (or
    /// `creation_timestamp - 1` when empty).
    last_global_timestamp: i64,

    /// Lazily filled per-key last-commit pointers; `None` when disabled.
    commit_cache: Option<HashMap<String, i64>>,
}

/// The full-history storage core of one keyspace.
///
/// Generic over the sorted byte-map backend; see
/// [`TemporalMatrix::in_memory`] for the common volatile construction and
/// [`FileByteMap`](crate::bytemap::FileByteMap) for the persistent adapter.
#[derive(Debug)]
pub struct TemporalMatrix<M: SortedByteMap> {
    index: TemporalIndex<M>,
    meta: KeyspaceMeta,
    inner: RwLock<MatrixInner>,
    lifecycle: Arc<Lifecycle>,
}

impl TemporalMatrix<MemoryByteMap> {
    /// Opens a volatile matrix backed by a fresh in-memory byte-map.
    pub fn in_memory(name: &str, creation_timestamp: i64) -> Result<Self, MatrixError> {
        Self::open(
            MemoryByteMap::new(),
            name,
            creation_timestamp,
            MatrixConfig::default(),
        )
    }
}

impl<M: SortedByteMap> TemporalMatrix<M> {
    /// Opens (or creates) the matrix of keyspace `name` over `map`.
    ///
    /// On a fresh map the metadata record is installed. On an existing map
    /// the stored metadata must match `name` and `creation_timestamp`, and
    /// the keyspace's last committed timestamp is recovered from the
    /// greatest timeline row.
    pub fn open(
        map: M,
        name: &str,
        creation_timestamp: i64,
        config: MatrixConfig,
    ) -> Result<Self, MatrixError> {
        if name.is_empty() {
            return Err(MatrixError::InvalidArgument("empty keyspace name".into()));
        }
        if creation_timestamp < 0 {
            return Err(MatrixError::InvalidArgument(format!(
                "negative creation timestamp {creation_timestamp}"
            )));
        }

        let index = TemporalIndex::new(map);
        let meta = match index.load_meta()? {
            Some(stored) => {
                if stored.name != name {
                    return Err(MatrixError::InvalidArgument(format!(
                        "keyspace name mismatch: stored {:?}, requested {name:?}",
                        stored.name
                    )));
                }
                if stored.creation_timestamp != creation_timestamp {
                    return Err(MatrixError::InvalidArgument(format!(
                        "creation timestamp mismatch: stored {}, requested {creation_timestamp}",
                        stored.creation_timestamp
                    )));
                }
                stored
            }
            None => {
                let meta = KeyspaceMeta {
                    name: name.to_string(),
                    creation_timestamp,
                };
                index.install_meta(&meta)?;
                meta
            }
        };

        let last_global_timestamp = index
            .snapshot()
            .latest_timestamp()
            .unwrap_or(meta.creation_timestamp - 1);

        info!(
            keyspace = name,
            creation_timestamp, last_global_timestamp, "matrix opened"
        );

        Ok(Self {
            index,
            meta,
            inner: RwLock::new(MatrixInner {
                last_global_timestamp,
                commit_cache: config.cache_last_commits.then(HashMap::new),
            }),
            lifecycle: Lifecycle::new(),
        })
    }

    /// Keyspace name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Keyspace creation timestamp.
    pub fn creation_timestamp(&self) -> i64 {
        self.meta.creation_timestamp
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> MatrixPhase {
        self.lifecycle.phase()
    }

    /// Begins closing the matrix: new writes and new iterators are rejected
    /// immediately; the transition to [`MatrixPhase::Closed`] completes when
    /// the last outstanding iterator drops. Returns the resulting phase.
    pub fn close(&self) -> MatrixPhase {
        let phase = self.lifecycle.begin_close();
        info!(keyspace = %self.meta.name, ?phase, "matrix closing");
        phase
    }

    // --------------------------------------------------------------------------------------------
    // Matrix operations
    // --------------------------------------------------------------------------------------------

    /// Resolves the effective value of `key` at read timestamp `t`: the
    /// payload of the entry with the greatest timestamp `≤ t`, or `None`
    /// when that entry is a tombstone or no entry exists.
    pub fn get(&self, t: i64, key: &str) -> Result<Option<Vec<u8>>, MatrixError> {
        self.check_readable()?;
        check_timestamp(t)?;
        check_key(key)?;

        let snap = self.index.snapshot();
        Ok(snap.floor_entry(key, t).and_then(|entry| entry.payload))
    }

    /// Like [`Self::get`], but also returns the validity interval of the
    /// resolution: from the floor entry's timestamp (or the creation
    /// timestamp when no entry exists) up to the key's next entry (or `+∞`).
    pub fn get_ranged(&self, t: i64, key: &str) -> Result<RangedValue, MatrixError> {
        self.check_readable()?;
        check_timestamp(t)?;
        check_key(key)?;

        let snap = self.index.snapshot();
        let (value, lo, next_from) = match snap.floor_entry(key, t) {
            Some(entry) => {
                let next_from = entry.timestamp.checked_add(1);
                (entry.payload, entry.timestamp, next_from)
            }
            // Reads below the creation timestamp keep `lo ≤ t` intact.
            None => (None, self.meta.creation_timestamp.min(t), Some(0)),
        };
        let hi = next_from
            .and_then(|from| snap.ceiling_entry(key, from))
            .map(|entry| entry.timestamp);

        Ok(RangedValue {
            value,
            period: ValidityPeriod { lo, hi },
        })
    }

    /// Lazy, lexicographic iterator over every user key whose floor entry at
    /// `t` is a live value.
    pub fn keys(&self, t: i64) -> Result<KeysIter<M::Snapshot>, MatrixError> {
        check_timestamp(t)?;
        let lease = self.acquire_lease()?;
        Ok(KeysIter::new(self.index.snapshot(), lease, t))
    }

    /// Lazy, lexicographic iterator over every user key that ever appeared,
    /// including keys whose only entries are tombstones. Rolled-back keys
    /// are gone from the index and therefore not yielded.
    pub fn all_keys(&self) -> Result<AllKeysIter<M::Snapshot>, MatrixError> {
        let lease = self.acquire_lease()?;
        Ok(AllKeysIter::new(self.index.snapshot(), lease))
    }

    /// Descending iterator over all timestamps `≤ t_max` at which `key` was
    /// written — values and tombstones alike.
    pub fn history(&self, t_max: i64, key: &str) -> Result<HistoryIter<M::Snapshot>, MatrixError> {
        check_timestamp(t_max)?;
        check_key(key)?;
        let lease = self.acquire_lease()?;
        Ok(HistoryIter::new(
            self.index.snapshot(),
            lease,
            key.to_string(),
            t_max,
        ))
    }

    /// Streams the snapshot at `t`: for each user key with at least one
    /// entry `≤ t`, exactly one entry — the floor. Tombstone floors are
    /// yielded; callers decide to skip them.
    pub fn entries_at(&self, t: i64) -> Result<EntriesIter<M::Snapshot>, MatrixError> {
        check_timestamp(t)?;
        let lease = self.acquire_lease()?;
        Ok(EntriesIter::new(self.index.snapshot(), lease, t))
    }

    /// Greatest timestamp ever written for `key` (value or tombstone), or
    /// [`NO_COMMIT`] if the key has no entry.
    pub fn last_commit_timestamp(&self, key: &str) -> Result<i64, MatrixError> {
        self.check_readable()?;
        check_key(key)?;

        {
            let inner = self.read_inner()?;
            if let Some(cache) = &inner.commit_cache
                && let Some(&ts) = cache.get(key)
            {
                trace!(key, ts, "last-commit cache hit");
                return Ok(ts);
            }
        }

        let ts = self
            .index
            .snapshot()
            .last_entry(key)
            .map(|entry| entry.timestamp)
            .unwrap_or(NO_COMMIT);

        let mut inner = self.write_inner()?;
        if let Some(cache) = &mut inner.commit_cache {
            cache.insert(key.to_string(), ts);
        }
        Ok(ts)
    }

    /// Iterator over every stored entry with timestamp in `[t_lo, t_hi]`
    /// (inclusive on both ends), as `(user_key, ts)` pairs in ascending
    /// `(ts, user_key)` order.
    pub fn modifications_between(
        &self,
        t_lo: i64,
        t_hi: i64,
    ) -> Result<ModificationsIter<M::Snapshot>, MatrixError> {
        check_window(t_lo, t_hi)?;
        let lease = self.acquire_lease()?;
        Ok(ModificationsIter::new(
            self.index.snapshot(),
            lease,
            t_lo,
            t_hi,
        ))
    }

    /// Ascending iterator over the distinct commit timestamps in
    /// `[t_lo, t_hi]`.
    pub fn commit_timestamps_between(
        &self,
        t_lo: i64,
        t_hi: i64,
    ) -> Result<CommitTimestampsIter<M::Snapshot>, MatrixError> {
        Ok(CommitTimestampsIter::new(
            self.modifications_between(t_lo, t_hi)?,
        ))
    }

    // --------------------------------------------------------------------------------------------
    // Mutation pipeline
    // --------------------------------------------------------------------------------------------

    /// Commits one batch at timestamp `t`: each `Some` payload writes a
    /// value entry, each `None` a tombstone. All entries become visible
    /// atomically. An empty batch is a no-op with no version bump.
    ///
    /// `t` must strictly exceed every previously accepted timestamp (and
    /// therefore be at least the creation timestamp).
    pub fn put(
        &self,
        t: i64,
        contents: BTreeMap<String, Option<Vec<u8>>>,
    ) -> Result<(), MatrixError> {
        self.check_open()?;
        check_timestamp(t)?;
        for key in contents.keys() {
            check_key(key)?;
        }
        if contents.is_empty() {
            trace!(keyspace = %self.meta.name, t, "empty put ignored");
            return Ok(());
        }

        let mut inner = self.write_inner()?;
        if t <= inner.last_global_timestamp {
            return Err(MatrixError::MonotonicityViolation {
                attempted: t,
                last_committed: inner.last_global_timestamp,
            });
        }

        let mut batch = Batch::new();
        for (key, payload) in &contents {
            TemporalIndex::<M>::stage_entry(&mut batch, key, t, payload.as_deref());
        }
        self.index.apply(batch)?;

        inner.last_global_timestamp = t;
        if let Some(cache) = &mut inner.commit_cache {
            for key in contents.keys() {
                cache.insert(key.clone(), t);
            }
        }

        debug!(
            keyspace = %self.meta.name,
            t,
            entries = contents.len(),
            "batch committed"
        );
        Ok(())
    }

    /// Bulk-loads pre-timestamped entries (replication / import path).
    /// Entries may span multiple timestamps and arrive in any order.
    ///
    /// An entry identical to one already stored (same key, timestamp, and
    /// payload) is skipped; a divergent payload for an existing
    /// `(key, ts)`, or a timestamp below the creation timestamp, fails with
    /// [`MatrixError::Conflict`] before anything is written.
    pub fn insert_entries(&self, entries: Vec<Entry>) -> Result<(), MatrixError> {
        self.check_open()?;
        if entries.is_empty() {
            return Ok(());
        }

        for entry in &entries {
            check_key(&entry.user_key)?;
            check_timestamp(entry.timestamp)?;
            if entry.timestamp < self.meta.creation_timestamp {
                return Err(MatrixError::Conflict {
                    key: entry.user_key.clone(),
                    timestamp: entry.timestamp,
                });
            }
        }

        let mut inner = self.write_inner()?;
        let snap = self.index.snapshot();

        let mut staged: BTreeMap<(String, i64), Option<Vec<u8>>> = BTreeMap::new();
        for entry in entries {
            let slot = (entry.user_key.clone(), entry.timestamp);

            if let Some(stored) = snap.entry_payload(&entry.user_key, entry.timestamp) {
                if stored != entry.payload {
                    return Err(MatrixError::Conflict {
                        key: entry.user_key,
                        timestamp: entry.timestamp,
                    });
                }
                continue;
            }
            if let Some(previous) = staged.get(&slot) {
                if *previous != entry.payload {
                    return Err(MatrixError::Conflict {
                        key: entry.user_key,
                        timestamp: entry.timestamp,
                    });
                }
                continue;
            }

            staged.insert(slot, entry.payload);
        }

        if staged.is_empty() {
            return Ok(());
        }

        let mut batch = Batch::new();
        let mut max_ts = inner.last_global_timestamp;
        for ((key, ts), payload) in &staged {
            TemporalIndex::<M>::stage_entry(&mut batch, key, *ts, payload.as_deref());
            max_ts = max_ts.max(*ts);
        }
        self.index.apply(batch)?;

        inner.last_global_timestamp = max_ts;
        if let Some(cache) = &mut inner.commit_cache {
            // Only refresh keys the cache already tracks; an absent slot may
            // understate what is stored and must stay absent until rebuilt.
            for ((key, ts), _) in &staged {
                if let Some(cached) = cache.get_mut(key) {
                    *cached = (*cached).max(*ts);
                }
            }
        }

        debug!(
            keyspace = %self.meta.name,
            entries = staged.len(),
            last_global_timestamp = inner.last_global_timestamp,
            "entries loaded"
        );
        Ok(())
    }

    /// Removes every entry with timestamp `> max(t, creation_timestamp)`
    /// atomically, invalidates the last-commit cache, and resets the
    /// keyspace's last committed timestamp to that bound. Afterwards the
    /// matrix is observationally identical to one that never saw the
    /// removed writes.
    ///
    /// A storage failure mid-rollback degrades the matrix straight to
    /// [`MatrixPhase::Closed`]; it must be reopened.
    pub fn rollback(&self, t: i64) -> Result<(), MatrixError> {
        self.check_open()?;
        check_timestamp(t)?;

        let mut inner = self.write_inner()?;
        let target = t.max(self.meta.creation_timestamp);

        let mut batch = Batch::new();
        let mut removed = 0usize;
        if let Some(from) = target.checked_add(1) {
            let snap = self.index.snapshot();
            let mut cursor = snap.timeline_ceiling(from);
            while let Some((ts, key)) = cursor {
                TemporalIndex::<M>::stage_entry_removal(&mut batch, &key, ts);
                removed += 1;
                cursor = snap.timeline_after(ts, &key);
            }
            TemporalIndex::<M>::stage_timeline_truncation(&mut batch, from);
        }

        if let Err(err) = self.index.apply(batch) {
            error!(
                keyspace = %self.meta.name,
                target,
                %err,
                "rollback failed; matrix degraded to closed"
            );
            self.lifecycle.force_close();
            return Err(err.into());
        }

        if let Some(cache) = &mut inner.commit_cache {
            cache.clear();
        }
        inner.last_global_timestamp = target;

        info!(
            keyspace = %self.meta.name,
            target,
            removed,
            "rolled back"
        );
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Internal helpers
    // --------------------------------------------------------------------------------------------

    fn check_open(&self) -> Result<(), MatrixError> {
        match self.lifecycle.phase() {
            MatrixPhase::Open => Ok(()),
            phase => Err(MatrixError::Closed { phase }),
        }
    }

    /// Point reads stay available while the matrix drains; only `Closed`
    /// rejects them.
    fn check_readable(&self) -> Result<(), MatrixError> {
        match self.lifecycle.phase() {
            MatrixPhase::Closed => Err(MatrixError::Closed {
                phase: MatrixPhase::Closed,
            }),
            _ => Ok(()),
        }
    }

    fn acquire_lease(&self) -> Result<ReadLease, MatrixError> {
        ReadLease::acquire(&self.lifecycle).ok_or_else(|| MatrixError::Closed {
            phase: self.lifecycle.phase(),
        })
    }

    fn read_inner(&self) -> Result<std::sync::RwLockReadGuard<'_, MatrixInner>, MatrixError> {
        self.inner
            .read()
            .map_err(|_| MatrixError::Storage(ByteMapError::Internal("RwLock poisoned".into())))
    }

    fn write_inner(&self) -> Result<RwLockWriteGuard<'_, MatrixInner>, MatrixError> {
        self.inner
            .write()
            .map_err(|_| MatrixError::Storage(ByteMapError::Internal("RwLock poisoned".into())))
    }

    #[cfg(test)]
    pub(crate) fn lease_count(&self) -> usize {
        self.lifecycle.lease_count()
    }
}

// ------------------------------------------------------------------------------------------------
// Argument validation
// ------------------------------------------------------------------------------------------------

fn check_timestamp(t: i64) -> Result<(), MatrixError> {
    if t < 0 {
        return Err(MatrixError::InvalidArgument(format!(
            "negative timestamp {t}"
        )));
    }
    Ok(())
}

fn check_key(key: &str) -> Result<(), MatrixError> {
    if key.is_empty() {
        return Err(MatrixError::InvalidArgument("empty user key".into()));
    }
    Ok(())
}

fn check_window(t_lo: i64, t_hi: i64) -> Result<(), MatrixError> {
    check_timestamp(t_lo)?;
    check_timestamp(t_hi)?;
    if t_lo > t_hi {
        return Err(MatrixError::InvalidArgument(format!(
            "inverted window [{t_lo}, {t_hi}]"
        )));
    }
    Ok(())
}

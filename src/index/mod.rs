//! # Temporal Index
//!
//! The ordered mapping from composite `(user_key, timestamp)` keys to value
//! records that underpins every temporal query. [`TemporalIndex`] owns the
//! byte-map handle exclusively and translates index-level operations into
//! bounded seeks on the encoded rows described in [`crate::encoding`]:
//!
//! - floor / ceiling entry lookups per user key,
//! - strictly-earlier stepping for descending history walks,
//! - distinct-user-key walks via prefix-successor seeks,
//! - timeline scans over the timestamp-indexed secondary,
//! - batch staging for entry writes, removals, and timeline truncation.
//!
//! Reads go through [`IndexSnapshot`], a pinned map version: every walk is
//! restartable, costs one `O(log n)` seek per step, and is unaffected by
//! concurrent commits.
//!
//! ## Invariants
//!
//! - Every entry row has a matching timeline row and vice versa; both are
//!   staged together by [`TemporalIndex::stage_entry`].
//! - Rows decode with the row's own region tag; a seek that lands outside
//!   the expected region terminates the walk.


use tracing::error;

use crate::bytemap::{Batch, ByteMapError, MapSnapshot, SortedByteMap};
use crate::encoding::{
    self, ENTRY_PREFIX, KeyspaceMeta, META_KEY, TIMELINE_PREFIX,
};

// ------------------------------------------------------------------------------------------------
// Entry
// ------------------------------------------------------------------------------------------------

/// One stored `(user_key, timestamp, payload)` triple — the unit of the
/// temporal index.
///
/// `payload == None` is a tombstone: an explicit deletion marker,
/// distinguishable from the empty byte-string value `Some(vec![])`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entry {
    /// The user key this entry belongs to (non-empty).
    pub user_key: String,

    /// Commit timestamp of this entry (non-negative).
    pub timestamp: i64,

    /// Live payload, or `None` for a tombstone.
    pub payload: Option<Vec<u8>>,
}

impl Entry {
    /// Creates a live-value entry.
    pub fn value(user_key: impl Into<String>, timestamp: i64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            user_key: user_key.into(),
            timestamp,
            payload: Some(payload.into()),
        }
    }

    /// Creates a tombstone entry.
    pub fn tombstone(user_key: impl Into<String>, timestamp: i64) -> Self {
        Self {
            user_key: user_key.into(),
            timestamp,
            payload: None,
        }
    }

    /// `true` if this entry marks a deletion.
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }
}

// ------------------------------------------------------------------------------------------------
// TemporalIndex
// ------------------------------------------------------------------------------------------------

/// Exclusive owner of one keyspace's sorted byte-map.
#[derive(Debug)]
pub struct TemporalIndex<M: SortedByteMap> {
    map: M,
}

impl<M: SortedByteMap> TemporalIndex<M> {
    /// Wraps a byte-map handle. The index assumes exclusive ownership.
    pub fn new(map: M) -> Self {
        Self { map }
    }

    /// Pins the current index version for reading.
    pub fn snapshot(&self) -> IndexSnapshot<M::Snapshot> {
        IndexSnapshot {
            snap: self.map.snapshot(),
        }
    }

    /// Commits a staged batch atomically.
    pub fn apply(&self, batch: Batch) -> Result<(), ByteMapError> {
        self.map.apply(batch)
    }

    /// Reads the keyspace metadata record, if one has been installed.
    pub fn load_meta(&self) -> Result<Option<KeyspaceMeta>, ByteMapError> {
        match self.map.snapshot().get(META_KEY) {
            Some(raw) => Ok(Some(KeyspaceMeta::decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Installs the keyspace metadata record.
    pub fn install_meta(&self, meta: &KeyspaceMeta) -> Result<(), ByteMapError> {
        let mut batch = Batch::new();
        batch.put(META_KEY.to_vec(), meta.encode());
        self.map.apply(batch)
    }

    /// Stages one entry write: the entry row plus its timeline mirror.
    pub fn stage_entry(batch: &mut Batch, user_key: &str, ts: i64, payload: Option<&[u8]>) {
        batch.put(
            encoding::entry_key(user_key, ts),
            encoding::encode_payload(payload),
        );
        batch.put(
            encoding::timeline_key(ts, user_key),
            vec![encoding::payload_tag(payload)],
        );
    }

    /// Stages removal of one entry row. The caller pairs this with
    /// [`Self::stage_timeline_truncation`] (rollback removes contiguous
    /// timeline suffixes, so the mirror rows go in one range removal).
    pub fn stage_entry_removal(batch: &mut Batch, user_key: &str, ts: i64) {
        batch.remove(encoding::entry_key(user_key, ts));
    }

    /// Stages removal of every timeline row with timestamp `≥ from_ts`.
    pub fn stage_timeline_truncation(batch: &mut Batch, from_ts: i64) {
        batch.remove_range(encoding::timeline_start(from_ts), encoding::timeline_end());
    }
}

// ------------------------------------------------------------------------------------------------
// IndexSnapshot
// ------------------------------------------------------------------------------------------------

/// A pinned, read-only view of the temporal index.
#[derive(Debug)]
pub struct IndexSnapshot<S: MapSnapshot> {
    snap: S,
}

impl<S: MapSnapshot> IndexSnapshot<S> {
    /// Greatest entry of `user_key` with timestamp `≤ t`.
    pub fn floor_entry(&self, user_key: &str, t: i64) -> Option<Entry> {
        let row = self.snap.seek_floor(&encoding::entry_key(user_key, t))?;
        self.decode_entry_of(user_key, row)
    }

    /// Least entry of `user_key` with timestamp `≥ t`.
    pub fn ceiling_entry(&self, user_key: &str, t: i64) -> Option<Entry> {
        let row = self.snap.seek_ceiling(&encoding::entry_key(user_key, t))?;
        self.decode_entry_of(user_key, row)
    }

    /// Greatest entry of `user_key` with timestamp strictly below `ts`.
    pub fn entry_before(&self, user_key: &str, ts: i64) -> Option<Entry> {
        let row = self.snap.seek_before(&encoding::entry_key(user_key, ts))?;
        self.decode_entry_of(user_key, row)
    }

    /// Greatest entry of `user_key` at any timestamp.
    pub fn last_entry(&self, user_key: &str) -> Option<Entry> {
        self.floor_entry(user_key, i64::MAX)
    }

    /// Exact payload stored at `(user_key, ts)`, if any. The outer `Option`
    /// distinguishes "no entry" from the inner tombstone encoding.
    pub fn entry_payload(&self, user_key: &str, ts: i64) -> Option<Option<Vec<u8>>> {
        let raw = self.snap.get(&encoding::entry_key(user_key, ts))?;
        match encoding::decode_payload(&raw) {
            Ok(payload) => Some(payload),
            Err(err) => {
                error!(user_key, ts, %err, "undecodable payload row");
                None
            }
        }
    }

    /// First user key (lexicographically) with at least one entry.
    pub fn first_user_key(&self) -> Option<String> {
        let (row_key, _) = self.snap.seek_ceiling(&[ENTRY_PREFIX])?;
        self.decode_user_key(row_key)
    }

    /// Next distinct user key after `user_key`, skipping all of its entry
    /// rows with a single seek.
    pub fn next_user_key(&self, user_key: &str) -> Option<String> {
        let (row_key, _) = self
            .snap
            .seek_ceiling(&encoding::entry_prefix_successor(user_key))?;
        self.decode_user_key(row_key)
    }

    /// Least timeline row with timestamp `≥ ts`.
    pub fn timeline_ceiling(&self, ts: i64) -> Option<(i64, String)> {
        let (row_key, _) = self.snap.seek_ceiling(&encoding::timeline_start(ts))?;
        self.decode_timeline(row_key)
    }

    /// Timeline row immediately after `(ts, user_key)` in
    /// `(ts, user_key)` order.
    pub fn timeline_after(&self, ts: i64, user_key: &str) -> Option<(i64, String)> {
        let (row_key, _) = self
            .snap
            .seek_after(&encoding::timeline_key(ts, user_key))?;
        self.decode_timeline(row_key)
    }

    /// Greatest timestamp present anywhere in the keyspace, recovered from
    /// the last timeline row.
    pub fn latest_timestamp(&self) -> Option<i64> {
        let (row_key, _) = self.snap.seek_before(&encoding::timeline_end())?;
        self.decode_timeline(row_key).map(|(ts, _)| ts)
    }

    /// Decodes an entry row, returning `None` when the row belongs to a
    /// different user key or region. The ownership test decodes the row key
    /// and compares decoded user keys — a raw prefix test would mistake a
    /// neighbour such as `"a\0"` for `"a"`.
    fn decode_entry_of(&self, user_key: &str, row: (Vec<u8>, Vec<u8>)) -> Option<Entry> {
        let (row_key, row_value) = row;
        if row_key.first() != Some(&ENTRY_PREFIX) {
            return None;
        }

        let decoded_key = encoding::decode_entry_key(&row_key);
        let decoded_payload = encoding::decode_payload(&row_value);
        match (decoded_key, decoded_payload) {
            (Ok((key, _)), Ok(_)) if key != user_key => None,
            (Ok((key, ts)), Ok(payload)) => Some(Entry {
                user_key: key,
                timestamp: ts,
                payload,
            }),
            _ => {
                error!(user_key, "undecodable entry row");
                None
            }
        }
    }

    /// Decodes the user key of an entry row, returning `None` for rows
    /// outside the entry region.
    fn decode_user_key(&self, row_key: Vec<u8>) -> Option<String> {
        if row_key.first() != Some(&ENTRY_PREFIX) {
            return None;
        }
        match encoding::decode_entry_key(&row_key) {
            Ok((user_key, _)) => Some(user_key),
            Err(err) => {
                error!(%err, "undecodable entry row key");
                None
            }
        }
    }

    /// Decodes a timeline row, returning `None` for rows outside the
    /// timeline region.
    fn decode_timeline(&self, row_key: Vec<u8>) -> Option<(i64, String)> {
        if row_key.first() != Some(&TIMELINE_PREFIX) {
            return None;
        }
        match encoding::decode_timeline_key(&row_key) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                error!(%err, "undecodable timeline row key");
                None
            }
        }
    }
}

//! Matrix iterators.
//!
//! Every iterator owns a pinned [`IndexSnapshot`] plus a read lease, never a
//! borrow of the matrix: construction fixes the snapshot, later commits are
//! invisible, and dropping (or explicitly closing) the iterator releases the
//! lease. Each `next()` call costs one bounded seek on the snapshot, so
//! walks are lazy and restartable by construction.

use crate::bytemap::MapSnapshot;
use crate::index::{Entry, IndexSnapshot};

use super::lifecycle::ReadLease;

// ------------------------------------------------------------------------------------------------
// Distinct-key walks
// ------------------------------------------------------------------------------------------------

/// Walks the distinct user keys of a snapshot in lexicographic order.
/// Shared stepping logic of [`KeysIter`], [`AllKeysIter`], and
/// [`EntriesIter`].
#[derive(Debug)]
struct UserKeyWalk {
    cursor: Option<String>,
    done: bool,
}

impl UserKeyWalk {
    fn new() -> Self {
        Self {
            cursor: None,
            done: false,
        }
    }

    fn next<S: MapSnapshot>(&mut self, snap: &IndexSnapshot<S>) -> Option<String> {
        if self.done {
            return None;
        }
        let next = match &self.cursor {
            None => snap.first_user_key(),
            Some(prev) => snap.next_user_key(prev),
        };
        match next {
            Some(key) => {
                self.cursor = Some(key.clone());
                Some(key)
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

/// Lazy iterator over every user key whose floor entry at the fixed read
/// timestamp is a live value. Returned by
/// [`TemporalMatrix::keys`](super::TemporalMatrix::keys).
#[derive(Debug)]
pub struct KeysIter<S: MapSnapshot> {
    snap: IndexSnapshot<S>,
    at: i64,
    walk: UserKeyWalk,
    _lease: ReadLease,
}

impl<S: MapSnapshot> KeysIter<S> {
    pub(crate) fn new(snap: IndexSnapshot<S>, lease: ReadLease, at: i64) -> Self {
        Self {
            snap,
            at,
            walk: UserKeyWalk::new(),
            _lease: lease,
        }
    }

    /// Releases the read lease immediately instead of at drop time.
    pub fn close(self) {}
}

impl<S: MapSnapshot> Iterator for KeysIter<S> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let key = self.walk.next(&self.snap)?;
            match self.snap.floor_entry(&key, self.at) {
                Some(entry) if !entry.is_tombstone() => return Some(key),
                _ => continue,
            }
        }
    }
}

/// Lazy iterator over every user key that ever appeared — including keys
/// whose only entries are tombstones, excluding rolled-back keys (rollback
/// removes their rows). Returned by
/// [`TemporalMatrix::all_keys`](super::TemporalMatrix::all_keys).
#[derive(Debug)]
pub struct AllKeysIter<S: MapSnapshot> {
    snap: IndexSnapshot<S>,
    walk: UserKeyWalk,
    _lease: ReadLease,
}

impl<S: MapSnapshot> AllKeysIter<S> {
    pub(crate) fn new(snap: IndexSnapshot<S>, lease: ReadLease) -> Self {
        Self {
            snap,
            walk: UserKeyWalk::new(),
            _lease: lease,
        }
    }

    /// Releases the read lease immediately instead of at drop time.
    pub fn close(self) {}
}

impl<S: MapSnapshot> Iterator for AllKeysIter<S> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.walk.next(&self.snap)
    }
}

/// Streams the snapshot at a fixed timestamp: for each user key with at
/// least one entry at or before it, exactly one entry — the floor.
/// Tombstone floors are yielded; callers decide to skip them. Returned by
/// [`TemporalMatrix::entries_at`](super::TemporalMatrix::entries_at).
#[derive(Debug)]
pub struct EntriesIter<S: MapSnapshot> {
    snap: IndexSnapshot<S>,
    at: i64,
    walk: UserKeyWalk,
    _lease: ReadLease,
}

impl<S: MapSnapshot> EntriesIter<S> {
    pub(crate) fn new(snap: IndexSnapshot<S>, lease: ReadLease, at: i64) -> Self {
        Self {
            snap,
            at,
            walk: UserKeyWalk::new(),
            _lease: lease,
        }
    }

    /// Releases the read lease immediately instead of at drop time.
    pub fn close(self) {}
}

impl<S: MapSnapshot> Iterator for EntriesIter<S> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        loop {
            let key = self.walk.next(&self.snap)?;
            if let Some(entry) = self.snap.floor_entry(&key, self.at) {
                return Some(entry);
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// History
// ------------------------------------------------------------------------------------------------

#[derive(Debug)]
enum HistoryCursor {
    Start { t_max: i64 },
    After { ts: i64 },
    Done,
}

/// Descending iterator over the timestamps at which one user key was
/// written (values and tombstones alike). Returned by
/// [`TemporalMatrix::history`](super::TemporalMatrix::history).
#[derive(Debug)]
pub struct HistoryIter<S: MapSnapshot> {
    snap: IndexSnapshot<S>,
    user_key: String,
    cursor: HistoryCursor,
    _lease: ReadLease,
}

impl<S: MapSnapshot> HistoryIter<S> {
    pub(crate) fn new(
        snap: IndexSnapshot<S>,
        lease: ReadLease,
        user_key: String,
        t_max: i64,
    ) -> Self {
        Self {
            snap,
            user_key,
            cursor: HistoryCursor::Start { t_max },
            _lease: lease,
        }
    }

    /// Releases the read lease immediately instead of at drop time.
    pub fn close(self) {}
}

impl<S: MapSnapshot> Iterator for HistoryIter<S> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let entry = match self.cursor {
            HistoryCursor::Start { t_max } => self.snap.floor_entry(&self.user_key, t_max),
            HistoryCursor::After { ts } => self.snap.entry_before(&self.user_key, ts),
            HistoryCursor::Done => None,
        };
        match entry {
            Some(entry) => {
                self.cursor = HistoryCursor::After {
                    ts: entry.timestamp,
                };
                Some(entry.timestamp)
            }
            None => {
                self.cursor = HistoryCursor::Done;
                None
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Timeline windows
// ------------------------------------------------------------------------------------------------

#[derive(Debug)]
enum TimelineCursor {
    Start { lo: i64 },
    After { ts: i64, user_key: String },
    Done,
}

/// Iterator over every stored entry with timestamp inside an inclusive
/// window, as `(user_key, ts)` pairs in ascending `(ts, user_key)` order.
/// Returned by
/// [`TemporalMatrix::modifications_between`](super::TemporalMatrix::modifications_between).
#[derive(Debug)]
pub struct ModificationsIter<S: MapSnapshot> {
    snap: IndexSnapshot<S>,
    hi: i64,
    cursor: TimelineCursor,
    _lease: ReadLease,
}

impl<S: MapSnapshot> ModificationsIter<S> {
    pub(crate) fn new(snap: IndexSnapshot<S>, lease: ReadLease, lo: i64, hi: i64) -> Self {
        Self {
            snap,
            hi,
            cursor: TimelineCursor::Start { lo },
            _lease: lease,
        }
    }

    /// Releases the read lease immediately instead of at drop time.
    pub fn close(self) {}
}

impl<S: MapSnapshot> Iterator for ModificationsIter<S> {
    type Item = (String, i64);

    fn next(&mut self) -> Option<(String, i64)> {
        let row = match &self.cursor {
            TimelineCursor::Start { lo } => self.snap.timeline_ceiling(*lo),
            TimelineCursor::After { ts, user_key } => self.snap.timeline_after(*ts, user_key),
            TimelineCursor::Done => None,
        };
        match row {
            Some((ts, user_key)) if ts <= self.hi => {
                self.cursor = TimelineCursor::After {
                    ts,
                    user_key: user_key.clone(),
                };
                Some((user_key, ts))
            }
            _ => {
                self.cursor = TimelineCursor::Done;
                None
            }
        }
    }
}

/// Ascending iterator over the distinct commit timestamps inside an
/// inclusive window; derived from [`ModificationsIter`] by deduplicating
/// consecutive equal timestamps. Returned by
/// [`TemporalMatrix::commit_timestamps_between`](super::TemporalMatrix::commit_timestamps_between).
#[derive(Debug)]
pub struct CommitTimestampsIter<S: MapSnapshot> {
    inner: ModificationsIter<S>,
    last: Option<i64>,
}

impl<S: MapSnapshot> CommitTimestampsIter<S> {
    pub(crate) fn new(inner: ModificationsIter<S>) -> Self {
        Self { inner, last: None }
    }

    /// Releases the read lease immediately instead of at drop time.
    pub fn close(self) {}
}

impl<S: MapSnapshot> Iterator for CommitTimestampsIter<S> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        loop {
            let (_, ts) = self.inner.next()?;
            if self.last != Some(ts) {
                self.last = Some(ts);
                return Some(ts);
            }
        }
    }
}

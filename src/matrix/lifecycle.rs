//! Matrix lifecycle — phase tracking and read leases.
//!
//! A matrix moves `Open → Closing → Closed`. Iterators hold a [`ReadLease`];
//! while any lease is outstanding a closing matrix stays in `Closing` and
//! the transition to `Closed` fires when the last lease drops. Leases are
//! released on drop, never by finalization tricks — leaking an iterator
//! leaks its lease.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use tracing::debug;

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Externally visible lifecycle phase of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixPhase {
    /// Accepts all reads and writes.
    Open,
    /// Rejects new writes and new iterators; outstanding iterators drain.
    Closing,
    /// All handles released; reopening requires a fresh construction.
    Closed,
}

/// Shared lifecycle state. Lease drops may fire the `Closing → Closed`
/// transition without access to the matrix itself, so this lives behind an
/// `Arc` referenced by every lease.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    phase: AtomicU8,
    leases: AtomicUsize,
}

impl Lifecycle {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            phase: AtomicU8::new(OPEN),
            leases: AtomicUsize::new(0),
        })
    }

    pub(crate) fn phase(&self) -> MatrixPhase {
        match self.phase.load(Ordering::Acquire) {
            OPEN => MatrixPhase::Open,
            CLOSING => MatrixPhase::Closing,
            _ => MatrixPhase::Closed,
        }
    }

    /// Moves `Open` to `Closing` and completes the close immediately when no
    /// leases are outstanding. Returns the resulting phase.
    pub(crate) fn begin_close(&self) -> MatrixPhase {
        let _ = self
            .phase
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire);
        self.try_finish_close();
        self.phase()
    }

    /// Degrades straight to `Closed`, regardless of outstanding leases.
    pub(crate) fn force_close(&self) {
        self.phase.store(CLOSED, Ordering::Release);
    }

    fn release_lease(&self) {
        let previous = self.leases.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "lease count underflow");
        if previous == 1 {
            self.try_finish_close();
        }
    }

    fn try_finish_close(&self) {
        if self.leases.load(Ordering::Acquire) == 0
            && self
                .phase
                .compare_exchange(CLOSING, CLOSED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            debug!("matrix drained; now closed");
        }
    }

    #[cfg(test)]
    pub(crate) fn lease_count(&self) -> usize {
        self.leases.load(Ordering::Acquire)
    }
}

/// A read lease pinning the matrix in a readable phase. Held by every
/// iterator; released on drop.
#[derive(Debug)]
pub(crate) struct ReadLease {
    lifecycle: Arc<Lifecycle>,
}

impl ReadLease {
    /// Acquires a lease; fails unless the matrix is `Open`.
    pub(crate) fn acquire(lifecycle: &Arc<Lifecycle>) -> Option<Self> {
        lifecycle.leases.fetch_add(1, Ordering::AcqRel);
        if lifecycle.phase.load(Ordering::Acquire) != OPEN {
            // Lost the race against close(); roll the count back.
            lifecycle.release_lease();
            return None;
        }
        Some(Self {
            lifecycle: Arc::clone(lifecycle),
        })
    }
}

impl Drop for ReadLease {
    fn drop(&mut self) {
        self.lifecycle.release_lease();
    }
}

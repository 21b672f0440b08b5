//! Pool statistics

use core::fmt;

use crate::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of pool activity
///
/// Operation counters stay at zero unless the pool was built with
/// `track_stats`. Free-chunk counts are always available; under concurrency
/// they may overestimate briefly and are exact once the pool is quiescent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Successful allocations
    pub allocations: u64,
    /// Successful deallocations
    pub deallocations: u64,
    /// Larger chunks split to serve a smaller class
    pub splits: u64,
    /// Allocations that gave up with `PoolExhausted`
    pub exhausted: u64,
    /// Lost CAS races and locked-list observations
    pub contended_retries: u64,
    /// Free chunks per size class, smallest first
    pub free_chunks: Vec<usize>,
    /// Bytes held on all free lists
    pub free_bytes: usize,
    /// Usable arena bytes
    pub capacity: usize,
}

impl PoolStats {
    /// Bytes currently handed out to callers
    pub fn used_bytes(&self) -> usize {
        self.capacity.saturating_sub(self.free_bytes)
    }

    /// Allocations that have not been returned yet
    pub fn outstanding(&self) -> u64 {
        self.allocations.saturating_sub(self.deallocations)
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pool Statistics:")?;
        writeln!(f, "  Allocations: {}", self.allocations)?;
        writeln!(f, "  Deallocations: {}", self.deallocations)?;
        writeln!(f, "  Splits: {}", self.splits)?;
        writeln!(f, "  Exhausted: {}", self.exhausted)?;
        writeln!(f, "  Contended retries: {}", self.contended_retries)?;
        writeln!(f, "  Free chunks: {:?}", self.free_chunks)?;
        write!(f, "  Free: {} / {} bytes", self.free_bytes, self.capacity)
    }
}

/// Live counters behind [`PoolStats`]
#[derive(Debug)]
pub(crate) struct StatsCounters {
    allocations: AtomicU64,
    deallocations: AtomicU64,
    splits: AtomicU64,
    exhausted: AtomicU64,
    contended_retries: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn new() -> Self {
        Self {
            allocations: AtomicU64::new(0),
            deallocations: AtomicU64::new(0),
            splits: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
            contended_retries: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_allocation(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_deallocation(&self) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_split(&self) {
        self.splits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_contention(&self, count: usize) {
        if count > 0 {
            self.contended_retries.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Fill the counter fields of `stats`
    pub(crate) fn snapshot_into(&self, stats: &mut PoolStats) {
        stats.allocations = self.allocations.load(Ordering::Relaxed);
        stats.deallocations = self.deallocations.load(Ordering::Relaxed);
        stats.splits = self.splits.load(Ordering::Relaxed);
        stats.exhausted = self.exhausted.load(Ordering::Relaxed);
        stats.contended_retries = self.contended_retries.load(Ordering::Relaxed);
    }
}

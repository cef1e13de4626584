//! Page store I/O statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the [`DiskManager`](super::DiskManager).
///
/// All fields are atomic so a snapshot can be taken through a shared
/// reference. `Ordering::Relaxed` is enough: counters are independent and
/// only need to be individually exact.
///
/// # Example
/// ```
/// use bucketdb::storage::IoStats;
/// use std::sync::atomic::Ordering;
///
/// let stats = IoStats::new();
/// stats.pages_read.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(stats.snapshot().pages_read, 1);
/// ```
#[derive(Debug)]
pub struct IoStats {
    /// Node pages read from disk.
    pub pages_read: AtomicU64,

    /// Node pages written to disk.
    pub pages_written: AtomicU64,

    /// Meta directory writes.
    pub meta_writes: AtomicU64,

    /// fsync calls.
    pub syncs: AtomicU64,
}

impl IoStats {
    /// Create a new stats tracker with all counters at zero.
    pub fn new() -> Self {
        Self {
            pages_read: AtomicU64::new(0),
            pages_written: AtomicU64::new(0),
            meta_writes: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
        }
    }

    /// Get a non-atomic copy for display/logging.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pages_read: self.pages_read.load(Ordering::Relaxed),
            pages_written: self.pages_written.load(Ordering::Relaxed),
            meta_writes: self.meta_writes.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
        }
    }
}

impl Default for IoStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of [`IoStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub pages_read: u64,
    pub pages_written: u64,
    pub meta_writes: u64,
    pub syncs: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ read: {}, written: {}, meta_writes: {}, syncs: {} }}",
            self.pages_read, self.pages_written, self.meta_writes, self.syncs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = IoStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = IoStats::new();
        stats.pages_read.fetch_add(7, Ordering::Relaxed);
        stats.pages_written.fetch_add(3, Ordering::Relaxed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.pages_read, 7);
        assert_eq!(snapshot.pages_written, 3);
        assert_eq!(snapshot.syncs, 0);
    }

    #[test]
    fn test_stats_display() {
        let stats = IoStats::new();
        stats.pages_read.fetch_add(80, Ordering::Relaxed);
        stats.meta_writes.fetch_add(2, Ordering::Relaxed);

        let display = format!("{}", stats.snapshot());
        assert!(display.contains("read: 80"));
        assert!(display.contains("meta_writes: 2"));
    }
}

//! Collector statistics.
//!
//! Two views: cumulative counters since startup ([`GcStats`], cheap
//! atomics updated outside the lock) and a point-in-time heap snapshot
//! ([`HeapStats`], computed by walking the pools under the lock).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Cumulative statistics about allocator and collector activity.
#[derive(Debug)]
pub struct GcStats {
    /// Total bytes handed out since start (bin-rounded).
    pub bytes_allocated: AtomicU64,
    /// Total allocations since start.
    pub objects_allocated: AtomicU64,
    /// Number of completed collections.
    pub collections: AtomicU64,
    /// Total time spent collecting (nanoseconds).
    pub collect_time_ns: AtomicU64,
    /// Large-block pages returned to the free state by sweeps.
    pub pages_freed: AtomicU64,
    /// Small-bin pages recovered whole by sweeps.
    pub pages_recovered: AtomicU64,
    /// Pools mapped from the OS.
    pub pools_created: AtomicU64,
    /// Pools unmapped by `minimize`.
    pub pools_released: AtomicU64,
}

impl GcStats {
    /// Create new empty statistics.
    pub const fn new() -> Self {
        Self {
            bytes_allocated: AtomicU64::new(0),
            objects_allocated: AtomicU64::new(0),
            collections: AtomicU64::new(0),
            collect_time_ns: AtomicU64::new(0),
            pages_freed: AtomicU64::new(0),
            pages_recovered: AtomicU64::new(0),
            pools_created: AtomicU64::new(0),
            pools_released: AtomicU64::new(0),
        }
    }

    /// Record an allocation of `size` bytes.
    #[inline]
    pub fn record_allocation(&self, size: usize) {
        self.bytes_allocated
            .fetch_add(size as u64, Ordering::Relaxed);
        self.objects_allocated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed collection.
    pub fn record_collection(&self, duration: Duration, freed: usize, recovered: usize) {
        self.collections.fetch_add(1, Ordering::Relaxed);
        self.collect_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        self.pages_freed.fetch_add(freed as u64, Ordering::Relaxed);
        self.pages_recovered
            .fetch_add(recovered as u64, Ordering::Relaxed);
    }

    /// Record `n` pools mapped.
    #[inline]
    pub fn record_pools_created(&self, n: usize) {
        self.pools_created.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Record `n` pools unmapped.
    #[inline]
    pub fn record_pools_released(&self, n: usize) {
        self.pools_released.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Total time spent in collections.
    pub fn total_collect_time(&self) -> Duration {
        Duration::from_nanos(self.collect_time_ns.load(Ordering::Relaxed))
    }

    /// Average collection pause.
    pub fn avg_pause(&self) -> Duration {
        let count = self.collections.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.collect_time_ns.load(Ordering::Relaxed) / count)
    }

    /// Print a summary of collector statistics.
    pub fn print_summary(&self) {
        eprintln!("=== GC Statistics ===");
        eprintln!(
            "Allocations: {} objects, {} bytes",
            self.objects_allocated.load(Ordering::Relaxed),
            self.bytes_allocated.load(Ordering::Relaxed)
        );
        eprintln!(
            "Collections: {} ({:?} total, {:?} avg pause)",
            self.collections.load(Ordering::Relaxed),
            self.total_collect_time(),
            self.avg_pause()
        );
        eprintln!(
            "Pages: {} freed, {} recovered",
            self.pages_freed.load(Ordering::Relaxed),
            self.pages_recovered.load(Ordering::Relaxed)
        );
        eprintln!(
            "Pools: {} created, {} released",
            self.pools_created.load(Ordering::Relaxed),
            self.pools_released.load(Ordering::Relaxed)
        );
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of heap occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Total mapped bytes across all pools.
    pub pool_bytes: usize,
    /// Bytes in live small-bin pages, minus the free-listed bytes.
    pub used_bytes: usize,
    /// Bytes currently threaded on the small free lists.
    pub free_list_bytes: usize,
    /// Pages currently free across all pools.
    pub free_pages: usize,
    /// Pages held by large blocks (heads and continuations).
    pub large_pages: usize,
    /// Number of mapped pools.
    pub pool_count: usize,
}

/// Wall-clock timer for a collection cycle.
pub(crate) struct CollectTimer {
    start: Instant,
}

impl CollectTimer {
    pub(crate) fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub(crate) fn stop(self) -> Duration {
        self.start.elapsed()
    }
}

//! Registry statistics.
//!
//! Tracks write-side activity: registrations, rebuild cost and reclamation.
//! Lookups are not counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Statistics for a frame registry.
///
/// All counters are updated atomically with relaxed ordering.
#[derive(Debug)]
pub struct RegistryStats {
    /// Number of tables registered after initialization.
    registrations: AtomicU64,

    /// Number of index builds, the initial one included.
    rebuilds: AtomicU64,

    /// Total time spent building indexes (nanoseconds).
    rebuild_time_ns: AtomicU64,

    /// Longest single build (nanoseconds).
    max_rebuild_time_ns: AtomicU64,

    /// Descriptors in the most recently built index.
    indexed_descriptors: AtomicU64,

    /// Reclamation passes that detached a predecessor chain.
    reclaim_passes: AtomicU64,

    /// Superseded versions freed by a reclamation pass.
    versions_reclaimed: AtomicU64,
}

impl RegistryStats {
    /// Create new zeroed statistics.
    pub const fn new() -> Self {
        Self {
            registrations: AtomicU64::new(0),
            rebuilds: AtomicU64::new(0),
            rebuild_time_ns: AtomicU64::new(0),
            max_rebuild_time_ns: AtomicU64::new(0),
            indexed_descriptors: AtomicU64::new(0),
            reclaim_passes: AtomicU64::new(0),
            versions_reclaimed: AtomicU64::new(0),
        }
    }

    /// Record a table registration.
    #[inline]
    pub(crate) fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an index build.
    pub(crate) fn record_rebuild(&self, descriptors: usize, duration: Duration) {
        let nanos = duration.as_nanos() as u64;
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
        self.rebuild_time_ns.fetch_add(nanos, Ordering::Relaxed);
        self.max_rebuild_time_ns.fetch_max(nanos, Ordering::Relaxed);
        self.indexed_descriptors
            .store(descriptors as u64, Ordering::Relaxed);
    }

    /// Record a reclamation pass that freed `versions` versions.
    #[inline]
    pub(crate) fn record_reclaim(&self, versions: usize) {
        self.reclaim_passes.fetch_add(1, Ordering::Relaxed);
        self.versions_reclaimed
            .fetch_add(versions as u64, Ordering::Relaxed);
    }

    /// Tables registered after initialization.
    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    /// Index builds performed.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Descriptors in the most recent index.
    pub fn indexed_descriptors(&self) -> u64 {
        self.indexed_descriptors.load(Ordering::Relaxed)
    }

    /// Reclamation passes that detached a predecessor chain.
    pub fn reclaim_passes(&self) -> u64 {
        self.reclaim_passes.load(Ordering::Relaxed)
    }

    /// Superseded versions freed by reclamation passes.
    ///
    /// A version still held by a snapshot when its pass runs is freed later,
    /// when the handle drops, and is not counted.
    pub fn versions_reclaimed(&self) -> u64 {
        self.versions_reclaimed.load(Ordering::Relaxed)
    }

    /// Total time spent building indexes.
    pub fn total_rebuild_time(&self) -> Duration {
        Duration::from_nanos(self.rebuild_time_ns.load(Ordering::Relaxed))
    }

    /// Longest single build.
    pub fn max_rebuild_time(&self) -> Duration {
        Duration::from_nanos(self.max_rebuild_time_ns.load(Ordering::Relaxed))
    }

    /// Average build time.
    pub fn avg_rebuild_time(&self) -> Duration {
        let count = self.rebuilds();
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.rebuild_time_ns.load(Ordering::Relaxed) / count)
    }
}

impl Default for RegistryStats {
    fn default() -> Self {
        Self::new()
    }
}

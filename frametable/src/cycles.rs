//! Major collection cycle counter.
//!
//! The registry never advances the counter; it only reads it to decide when a
//! superseded index version can no longer be in use.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the "major GC cycles completed" count.
///
/// Implementations must be monotonically non-decreasing.
pub trait CycleCounter: Send + Sync {
    /// Number of major collection cycles completed so far.
    fn cycles_completed(&self) -> u64;
}

impl CycleCounter for AtomicU64 {
    #[inline]
    fn cycles_completed(&self) -> u64 {
        self.load(Ordering::Acquire)
    }
}

impl<T: CycleCounter + ?Sized> CycleCounter for Arc<T> {
    #[inline]
    fn cycles_completed(&self) -> u64 {
        (**self).cycles_completed()
    }
}

impl<T: CycleCounter + ?Sized> CycleCounter for &T {
    #[inline]
    fn cycles_completed(&self) -> u64 {
        (**self).cycles_completed()
    }
}

// =============================================================================
// MajorCycles
// =============================================================================

/// Shareable cycle counter driven by the collector.
///
/// Clones observe the same count.
#[derive(Debug, Clone, Default)]
pub struct MajorCycles {
    completed: Arc<AtomicU64>,
}

impl MajorCycles {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the end of a major cycle. Returns the new count.
    #[inline]
    pub fn advance(&self) -> u64 {
        self.completed.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Set the count, e.g. when mirroring an external collector.
    ///
    /// Moving the count backwards is a caller bug.
    #[inline]
    pub fn set(&self, completed: u64) {
        debug_assert!(completed >= self.completed.load(Ordering::Relaxed));
        self.completed.store(completed, Ordering::Release);
    }
}

impl CycleCounter for MajorCycles {
    #[inline]
    fn cycles_completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }
}

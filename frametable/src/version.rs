//! Versioned index snapshots with deferred reclamation.
//!
//! Every registration publishes a new [`Version`] that links to the one it
//! replaced. A reader may have loaded the replaced version just before the
//! swap, so it is kept alive until a full major GC cycle has completed after
//! the swap. The cycle number observed at publication is stored in the new
//! version as its reclamation marker.
//!
//! ```text
//!   current ──▶ Version(g=3, marker=c2) ──prev──▶ Version(g=2) ──prev──▶ Version(g=1)
//!                                │
//!           cycles_completed > c2│  (under the writer lock)
//!                                ▼
//!   current ──▶ Version(g=3, marker=NONE)        whole chain released
//! ```
//!
//! Releasing the whole chain at once is sound: each older version was
//! superseded no later than the immediate predecessor, so its safety point
//! is no later than the current marker. Versions are reference counted, so
//! a [`Snapshot`](crate::Snapshot) held across a reclamation keeps its
//! version alive until dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;

use crate::index::FrameDescriptorIndex;

/// Reclamation marker value meaning "no predecessor awaiting release".
pub const NO_PENDING_FREE: u64 = u64::MAX;

// =============================================================================
// Version
// =============================================================================

/// An immutable published index plus its reclamation state.
pub struct Version {
    index: FrameDescriptorIndex,
    /// Publication order, starting at 0 for the initial version.
    generation: u64,
    /// Once more cycles than this have completed, `prev` may be released.
    free_prev_after_cycle: AtomicU64,
    /// Mutated only under the registry writer lock.
    prev: ArcSwapOption<Version>,
}

impl Version {
    /// The first version: no predecessor, nothing pending.
    pub(crate) fn initial(index: FrameDescriptorIndex) -> Self {
        Self {
            index,
            generation: 0,
            free_prev_after_cycle: AtomicU64::new(NO_PENDING_FREE),
            prev: ArcSwapOption::empty(),
        }
    }

    /// A version replacing `prev`, reclaimable once `cycle` has passed.
    pub(crate) fn successor(index: FrameDescriptorIndex, prev: Arc<Version>, cycle: u64) -> Self {
        debug_assert_ne!(cycle, NO_PENDING_FREE);
        Self {
            index,
            generation: prev.generation + 1,
            free_prev_after_cycle: AtomicU64::new(cycle),
            prev: ArcSwapOption::new(Some(prev)),
        }
    }

    /// The index this version publishes.
    #[inline]
    pub fn index(&self) -> &FrameDescriptorIndex {
        &self.index
    }

    /// Publication order of this version.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The cycle after which the predecessor chain may be released, or
    /// `None` when nothing is pending.
    #[inline]
    pub fn reclaim_marker(&self) -> Option<u64> {
        match self.free_prev_after_cycle.load(Ordering::Acquire) {
            NO_PENDING_FREE => None,
            cycle => Some(cycle),
        }
    }

    /// Whether the predecessor chain may be released given the number of
    /// completed cycles. Strictly greater: the marker cycle itself may still
    /// be running.
    #[inline]
    pub(crate) fn is_reclaimable(&self, cycles_completed: u64) -> bool {
        self.free_prev_after_cycle.load(Ordering::Acquire) < cycles_completed
    }

    /// Number of superseded versions still linked behind this one.
    pub fn predecessor_chain_len(&self) -> usize {
        let mut len = 0;
        let mut link = self.prev.load_full();
        while let Some(version) = link {
            len += 1;
            link = version.prev.load_full();
        }
        len
    }

    /// Detach the predecessor chain and clear the marker.
    ///
    /// Returns `None` when the chain was already gone, otherwise the number
    /// of versions freed. A version still held by a
    /// [`Snapshot`](crate::Snapshot) is not freed here; it and everything
    /// behind it go when the last handle drops. The caller must hold the
    /// registry writer lock.
    pub(crate) fn reclaim_predecessors(&self) -> Option<usize> {
        let chain = self.prev.swap(None)?;
        self.free_prev_after_cycle
            .store(NO_PENDING_FREE, Ordering::Release);
        Some(release_chain(Some(chain)))
    }
}

/// Free versions along a chain until one is still shared.
///
/// Iterative so a long run of registrations without an intervening
/// collection cannot overflow the stack. Returns how many were freed.
fn release_chain(mut link: Option<Arc<Version>>) -> usize {
    let mut freed = 0;
    while let Some(version) = link {
        match Arc::try_unwrap(version) {
            Ok(version) => {
                link = version.prev.swap(None);
                freed += 1;
            }
            Err(_) => break,
        }
    }
    freed
}

impl Drop for Version {
    fn drop(&mut self) {
        release_chain(self.prev.swap(None));
    }
}

impl std::fmt::Debug for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Version")
            .field("generation", &self.generation)
            .field("index", &self.index)
            .field("reclaim_marker", &self.reclaim_marker())
            .field("predecessors", &self.predecessor_chain_len())
            .finish()
    }
}

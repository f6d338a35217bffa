//! The frame registry: registration and lock-free lookup.
//!
//! # Concurrency
//!
//! - Readers load the current [`Version`] without locking and probe its index.
//! - Writers serialize on one mutex, rebuild the whole index from the table
//!   list, and publish the new version with a single atomic swap. A reader
//!   that observes the new version observes its fully built index.
//! - Superseded versions are released by whichever reader first notices, in
//!   [`FrameRegistry::current_snapshot`], that a major cycle has completed
//!   since they were superseded.
//!
//! # Example
//!
//! ```
//! use frametable::{DescriptorSpec, FrameRegistry, FrameTableWriter, MajorCycles};
//!
//! let mut writer = FrameTableWriter::new();
//! writer.push(DescriptorSpec::new(0x1000, 16).with_live(&[8]));
//! let table = writer.finish().leak();
//!
//! let registry = FrameRegistry::initialize(&[table], MajorCycles::new());
//!
//! let snapshot = registry.current_snapshot();
//! let descriptor = registry.lookup(&snapshot, 0x1000).unwrap();
//! assert_eq!(descriptor.live_offsets().collect::<Vec<_>>(), vec![8]);
//! assert!(registry.lookup(&snapshot, 0x2000).is_none());
//! ```

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::config::RegistryConfig;
use crate::cycles::{CycleCounter, MajorCycles};
use crate::descriptor::FrameDescriptor;
use crate::error::ConfigError;
use crate::index::FrameDescriptorIndex;
use crate::stats::RegistryStats;
use crate::table::FrameTable;
use crate::version::Version;

// =============================================================================
// Snapshot
// =============================================================================

/// A handle on one published index version.
///
/// The version stays alive while the handle exists, even if the registry
/// reclaims it in the meantime. Re-fetch a snapshot to see tables registered
/// after this one was taken.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: Arc<Version>,
}

impl Snapshot {
    /// Find the descriptor for a return address.
    #[inline]
    pub fn lookup(&self, retaddr: usize) -> Option<FrameDescriptor<'static>> {
        self.version.index().lookup(retaddr)
    }

    /// The published index.
    #[inline]
    pub fn index(&self) -> &FrameDescriptorIndex {
        self.version.index()
    }

    /// Publication order of the underlying version.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.version.generation()
    }

    /// The underlying version.
    #[inline]
    pub fn version(&self) -> &Version {
        &self.version
    }
}

// =============================================================================
// FrameRegistry
// =============================================================================

/// Concurrent map from return address to frame descriptor.
pub struct FrameRegistry<C: CycleCounter = MajorCycles> {
    /// Current version; swapped only under `tables`.
    current: ArcSwap<Version>,
    /// Every registered table, append-only. Also the writer lock.
    tables: Mutex<Vec<FrameTable<'static>>>,
    cycles: C,
    config: RegistryConfig,
    stats: RegistryStats,
}

impl<C: CycleCounter> FrameRegistry<C> {
    /// Build the registry over the statically linked tables.
    pub fn initialize(static_tables: &[FrameTable<'static>], cycles: C) -> Self {
        Self::build(static_tables, cycles, RegistryConfig::default())
    }

    /// Build the registry with an explicit configuration.
    pub fn initialize_with_config(
        static_tables: &[FrameTable<'static>],
        cycles: C,
        config: RegistryConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(static_tables, cycles, config))
    }

    fn build(static_tables: &[FrameTable<'static>], cycles: C, config: RegistryConfig) -> Self {
        let stats = RegistryStats::new();
        let tables = static_tables.to_vec();

        let start = Instant::now();
        let index = FrameDescriptorIndex::build(&tables, &config);
        let elapsed = start.elapsed();
        stats.record_rebuild(index.len(), elapsed);

        tracing::debug!(
            tables = tables.len(),
            descriptors = index.len(),
            slots = index.capacity(),
            elapsed_us = elapsed.as_micros() as u64,
            "frame registry initialized"
        );

        Self {
            current: ArcSwap::from_pointee(Version::initial(index)),
            tables: Mutex::new(tables),
            cycles,
            config,
            stats,
        }
    }

    /// Register a newly loaded table.
    ///
    /// Rebuilds the whole index (O(total descriptors)) and publishes it.
    /// Concurrent calls are serialized; lookups proceed throughout.
    pub fn register(&self, table: FrameTable<'static>) {
        let mut tables = self.tables.lock();
        tables.push(table);

        let start = Instant::now();
        let index = FrameDescriptorIndex::build(&tables, &self.config);
        let elapsed = start.elapsed();
        self.stats.record_rebuild(index.len(), elapsed);
        self.stats.record_registration();

        let prev = self.current.load_full();
        let cycle = self.cycles.cycles_completed();
        let version = Version::successor(index, prev, cycle);

        tracing::debug!(
            table = format_args!("{:#x}", table.base_address()),
            added = table.len(),
            descriptors = version.index().len(),
            slots = version.index().capacity(),
            generation = version.generation(),
            free_after_cycle = cycle,
            elapsed_us = elapsed.as_micros() as u64,
            "frame table registered"
        );

        self.current.store(Arc::new(version));
    }

    /// Take a snapshot of the current index.
    ///
    /// Lock-free unless a superseded version has become reclaimable, in which
    /// case this call releases it under the writer lock.
    ///
    /// The handle owns a reference count on the version, an atomic
    /// read-modify-write on a counter shared by every reader. Stack walkers
    /// resolving many frames should take one snapshot per walk; one-off
    /// queries should use [`find`](Self::find), which does not touch the
    /// count.
    pub fn current_snapshot(&self) -> Snapshot {
        let version = self.current.load_full();
        self.reclaim_if_due(&version);
        Snapshot { version }
    }

    #[inline]
    fn reclaim_if_due(&self, current: &Version) {
        if current.is_reclaimable(self.cycles.cycles_completed()) {
            self.try_reclaim_predecessor(current);
        }
    }

    /// Release the predecessor chain of `current`. No-op if another thread
    /// already did.
    #[cold]
    fn try_reclaim_predecessor(&self, current: &Version) {
        let _writer = self.tables.lock();
        if let Some(freed) = current.reclaim_predecessors() {
            self.stats.record_reclaim(freed);
            tracing::trace!(
                generation = current.generation(),
                freed,
                cycles_completed = self.cycles.cycles_completed(),
                "reclaimed superseded frame index versions"
            );
        }
    }

    /// Find the descriptor for `retaddr` in `snapshot`.
    ///
    /// `None` is the expected answer for frames of code compiled without
    /// frame metadata.
    #[inline]
    pub fn lookup(&self, snapshot: &Snapshot, retaddr: usize) -> Option<FrameDescriptor<'static>> {
        snapshot.lookup(retaddr)
    }

    /// Look up in the current index without creating a [`Snapshot`].
    ///
    /// Reads through an `arc-swap` guard, so the version's reference count
    /// is left alone. Reclaims a superseded version when due, exactly like
    /// [`current_snapshot`](Self::current_snapshot).
    #[inline]
    pub fn find(&self, retaddr: usize) -> Option<FrameDescriptor<'static>> {
        let version = self.current.load();
        self.reclaim_if_due(&version);
        version.index().lookup(retaddr)
    }

    /// Number of registered tables, static ones included.
    pub fn table_count(&self) -> usize {
        self.tables.lock().len()
    }

    /// Number of descriptors in the current index.
    pub fn descriptor_count(&self) -> usize {
        self.current.load().index().len()
    }

    /// Superseded versions not yet released.
    pub fn pending_versions(&self) -> usize {
        self.current.load().predecessor_chain_len()
    }

    /// Registry statistics.
    #[inline]
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// Active configuration.
    #[inline]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The cycle counter consulted for reclamation.
    #[inline]
    pub fn cycles(&self) -> &C {
        &self.cycles
    }
}

impl<C: CycleCounter> std::fmt::Debug for FrameRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRegistry")
            .field("current", &self.current.load_full())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{DescriptorSpec, FrameTableWriter};

    fn table(addrs: &[usize]) -> FrameTable<'static> {
        let mut writer = FrameTableWriter::new();
        writer.extend(addrs.iter().map(|&a| DescriptorSpec::new(a, 16).with_live(&[8])));
        writer.finish().leak()
    }

    #[test]
    fn test_initialize_and_lookup() {
        let registry =
            FrameRegistry::initialize(&[table(&[0x1000, 0x1010, 0x1020])], MajorCycles::new());
        let snapshot = registry.current_snapshot();

        assert_eq!(
            registry.lookup(&snapshot, 0x1010).unwrap().return_address(),
            0x1010
        );
        assert!(registry.lookup(&snapshot, 0x1030).is_none());
        assert_eq!(registry.table_count(), 1);
        assert_eq!(registry.descriptor_count(), 3);
        assert_eq!(snapshot.generation(), 0);
    }

    #[test]
    fn test_register_extends_lookup() {
        let registry =
            FrameRegistry::initialize(&[table(&[0x1000, 0x1010, 0x1020])], MajorCycles::new());
        registry.register(table(&[0x2000]));

        let snapshot = registry.current_snapshot();
        assert!(snapshot.lookup(0x2000).is_some());
        for addr in [0x1000, 0x1010, 0x1020] {
            assert!(snapshot.lookup(addr).is_some());
        }
        assert!(snapshot.lookup(0x3000).is_none());
        assert_eq!(snapshot.generation(), 1);
        assert_eq!(registry.stats().registrations(), 1);
        assert_eq!(registry.stats().rebuilds(), 2);
    }

    #[test]
    fn test_old_snapshot_keeps_old_view() {
        let cycles = MajorCycles::new();
        let registry = FrameRegistry::initialize(&[table(&[0x1000])], cycles.clone());
        let before = registry.current_snapshot();

        registry.register(table(&[0x2000]));
        cycles.advance();
        let after = registry.current_snapshot();

        assert_eq!(registry.pending_versions(), 0);
        assert!(before.lookup(0x2000).is_none());
        assert!(before.lookup(0x1000).is_some());
        assert!(after.lookup(0x2000).is_some());
    }

    #[test]
    fn test_reclaim_waits_for_cycle() {
        let cycles = MajorCycles::new();
        cycles.set(3);
        let registry = FrameRegistry::initialize(&[table(&[0x1000])], cycles.clone());
        registry.register(table(&[0x2000]));

        assert_eq!(registry.current_snapshot().version().reclaim_marker(), Some(3));
        assert_eq!(registry.pending_versions(), 1);

        // Counter equal to the marker: not yet safe.
        registry.current_snapshot();
        assert_eq!(registry.pending_versions(), 1);
        assert_eq!(registry.stats().versions_reclaimed(), 0);

        cycles.advance();
        let snapshot = registry.current_snapshot();
        assert_eq!(registry.pending_versions(), 0);
        assert_eq!(snapshot.version().reclaim_marker(), None);
        assert_eq!(registry.stats().versions_reclaimed(), 1);

        // Idempotent.
        cycles.advance();
        registry.current_snapshot();
        assert_eq!(registry.stats().versions_reclaimed(), 1);
        assert_eq!(registry.stats().reclaim_passes(), 1);
    }

    #[test]
    fn test_reregistered_descriptor_shadows_static() {
        let mut writer = FrameTableWriter::new();
        writer.push(DescriptorSpec::new(0x9000, 16).with_live(&[8]));
        let registry = FrameRegistry::initialize(&[writer.finish().leak()], MajorCycles::new());

        let mut writer = FrameTableWriter::new();
        writer.push(DescriptorSpec::new(0x9000, 32).with_live(&[8, 24]));
        registry.register(writer.finish().leak());

        let d = registry.find(0x9000).unwrap();
        assert_eq!(d.frame_size(), Some(32));
        assert_eq!(d.live_offsets().collect::<Vec<_>>(), vec![8, 24]);
        assert_eq!(registry.descriptor_count(), 2);
    }

    #[test]
    fn test_find_reclaims_and_leaves_refcount() {
        let cycles = MajorCycles::new();
        let registry = FrameRegistry::initialize(&[table(&[0x1000])], cycles.clone());
        registry.register(table(&[0x2000]));
        cycles.advance();

        assert!(registry.find(0x2000).is_some());
        assert_eq!(registry.pending_versions(), 0);
        assert_eq!(registry.stats().versions_reclaimed(), 1);

        // Only the slot itself owns the current version.
        assert_eq!(Arc::strong_count(&registry.current.load_full()), 2);
        registry.find(0x1000);
        assert_eq!(Arc::strong_count(&registry.current.load_full()), 2);
    }

    #[test]
    fn test_held_snapshot_not_counted_as_freed() {
        let cycles = MajorCycles::new();
        let registry = FrameRegistry::initialize(&[table(&[0x1000])], cycles.clone());
        let held = registry.current_snapshot();
        registry.register(table(&[0x2000]));
        cycles.advance();
        registry.current_snapshot();

        assert_eq!(registry.pending_versions(), 0);
        assert_eq!(registry.stats().reclaim_passes(), 1);
        assert_eq!(registry.stats().versions_reclaimed(), 0);
        assert!(held.lookup(0x1000).is_some());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RegistryConfig {
            min_slots: 3,
            ..Default::default()
        };
        let result = FrameRegistry::initialize_with_config(&[], MajorCycles::new(), config);
        assert_eq!(result.unwrap_err(), ConfigError::InvalidMinSlots(3));
    }

    #[test]
    fn test_min_slots_respected() {
        let config = RegistryConfig {
            min_slots: 1024,
            ..Default::default()
        };
        let registry =
            FrameRegistry::initialize_with_config(&[table(&[0x1000])], MajorCycles::new(), config)
                .unwrap();
        assert_eq!(registry.current_snapshot().index().capacity(), 1024);
    }

    #[test]
    fn test_empty_registry() {
        let registry = FrameRegistry::initialize(&[], MajorCycles::new());
        assert_eq!(registry.descriptor_count(), 0);
        assert!(registry.find(0x1000).is_none());
        assert_eq!(registry.current_snapshot().index().capacity(), 4);
    }
}

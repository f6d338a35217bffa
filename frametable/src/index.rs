//! Open-addressing hash index from return address to frame descriptor.
//!
//! # Design
//!
//! - Power-of-two slot count, `mask = slots - 1`
//! - At least two slots per descriptor (load factor ≤ 50%), minimum 4
//! - Hash: `(retaddr >> 3) & mask`; return addresses are rarely closer
//!   than 8 bytes apart, so the low bits carry no information
//! - Linear probing with wraparound; an empty slot ends every probe
//! - Tables are inserted newest first, so a later registration shadows an
//!   earlier descriptor for the same return address
//!
//! ```text
//!   slots:        [ 0 | 3 | 0 | 1 | 2 | 0 | 0 | 0 ]   u32, 0 = empty
//!                       │       │   │
//!   descriptors:  [ d1, d2, d3 ] ◀──┘   dense, insertion order
//! ```
//!
//! Slots hold a 4-byte handle into the dense descriptor array, so a probe
//! sequence stays within a few cache lines.
//!
//! The index is always built from scratch over the full table list. Its
//! size and probe placement depend on the final descriptor count, so it is
//! never grown incrementally.

use std::num::NonZeroU32;

use rustc_hash::FxHashSet;

use crate::config::RegistryConfig;
use crate::descriptor::{FrameDescriptor, MIN_RETURN_ADDRESS};
use crate::table::FrameTable;

/// Home slot of a return address.
#[inline]
pub const fn hash_retaddr(retaddr: usize, mask: usize) -> usize {
    (retaddr >> 3) & mask
}

/// Slot count for `descriptors` entries: the smallest power of two that is
/// at least `2 * descriptors` and at least `min_slots`.
#[inline]
pub fn slot_count_for(descriptors: usize, min_slots: usize) -> usize {
    descriptors
        .saturating_mul(2)
        .next_power_of_two()
        .max(min_slots)
        .max(crate::config::MIN_INDEX_SLOTS)
}

/// Occupied slot: one-based position in the dense descriptor array.
type Slot = Option<NonZeroU32>;

// =============================================================================
// FrameDescriptorIndex
// =============================================================================

/// Immutable hash index over every registered descriptor.
pub struct FrameDescriptorIndex {
    slots: Box<[Slot]>,
    descriptors: Box<[FrameDescriptor<'static>]>,
    mask: usize,
}

impl FrameDescriptorIndex {
    /// Build an index over all descriptors of `tables`.
    ///
    /// `tables` is in registration order. Insertion walks it from the last
    /// table to the first, and each table front to back; when two
    /// descriptors share a return address the one inserted first is found
    /// by lookups.
    ///
    /// # Panics
    ///
    /// Panics if there are more than `u32::MAX` descriptors.
    pub fn build(tables: &[FrameTable<'static>], config: &RegistryConfig) -> Self {
        if config.verify_tables {
            verify_tables(tables);
        }

        let len: usize = tables.iter().map(FrameTable::len).sum();
        assert!(
            u32::try_from(len).is_ok(),
            "frame descriptor count exceeds the index range"
        );
        let capacity = slot_count_for(len, config.min_slots);
        let mask = capacity - 1;
        let mut slots: Box<[Slot]> = vec![None; capacity].into_boxed_slice();
        let mut descriptors = Vec::with_capacity(len);

        for table in tables.iter().rev() {
            for descriptor in table.descriptors() {
                let mut h = hash_retaddr(descriptor.return_address(), mask);
                while slots[h].is_some() {
                    h = (h + 1) & mask;
                }
                descriptors.push(descriptor);
                slots[h] = NonZeroU32::new(descriptors.len() as u32);
            }
        }

        Self {
            slots,
            descriptors: descriptors.into_boxed_slice(),
            mask,
        }
    }

    #[inline]
    fn resolve(&self, slot: NonZeroU32) -> FrameDescriptor<'static> {
        self.descriptors[slot.get() as usize - 1]
    }

    /// Find the descriptor for `retaddr`.
    ///
    /// `None` means the code at that address carries no frame metadata.
    #[inline]
    pub fn lookup(&self, retaddr: usize) -> Option<FrameDescriptor<'static>> {
        let mut h = hash_retaddr(retaddr, self.mask);
        loop {
            let descriptor = self.resolve(self.slots[h]?);
            if descriptor.return_address() == retaddr {
                return Some(descriptor);
            }
            h = (h + 1) & self.mask;
        }
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of indexed descriptors.
    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if no descriptors are indexed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Slot mask (`capacity - 1`).
    #[inline]
    pub fn mask(&self) -> usize {
        self.mask
    }

    /// Fraction of occupied slots.
    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    /// Heap bytes held by the slot and descriptor arrays.
    pub fn memory_bytes(&self) -> usize {
        std::mem::size_of_val(&*self.slots) + std::mem::size_of_val(&*self.descriptors)
    }

    /// Longest probe sequence a successful lookup takes, in slots visited.
    pub fn max_probe_len(&self) -> usize {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                let home = hash_retaddr(self.resolve((*slot)?).return_address(), self.mask);
                Some(i.wrapping_sub(home) & self.mask)
            })
            .map(|distance| distance + 1)
            .max()
            .unwrap_or(0)
    }

    /// Iterate over indexed descriptors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = FrameDescriptor<'static>> + '_ {
        self.descriptors.iter().copied()
    }
}

impl std::fmt::Debug for FrameDescriptorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDescriptorIndex")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

// =============================================================================
// Verification
// =============================================================================

/// Check tables against the producer contract.
///
/// Walks the tables in the same order as [`FrameDescriptorIndex::build`],
/// so a reported duplicate is the one lookups will not find. Returns the
/// number of findings; each one is logged.
pub fn verify_tables(tables: &[FrameTable<'static>]) -> usize {
    let mut seen = FxHashSet::default();
    let mut findings = 0;

    for table in tables.iter().rev() {
        for descriptor in table.descriptors() {
            let retaddr = descriptor.return_address();
            if retaddr < MIN_RETURN_ADDRESS {
                tracing::warn!(
                    retaddr = format_args!("{retaddr:#x}"),
                    table = format_args!("{:#x}", table.base_address()),
                    "frame descriptor return address below {MIN_RETURN_ADDRESS:#x}"
                );
                findings += 1;
            }
            if !seen.insert(retaddr) {
                tracing::warn!(
                    retaddr = format_args!("{retaddr:#x}"),
                    table = format_args!("{:#x}", table.base_address()),
                    "duplicate frame descriptor, shadowed by a newer table"
                );
                findings += 1;
            }
        }
    }

    findings
}

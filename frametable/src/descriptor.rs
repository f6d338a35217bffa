//! Frame descriptor layout and decoding.
//!
//! A frame descriptor is a variable-length record emitted by the compiler for
//! every call site that can reach a GC safepoint. Its size depends on the
//! number of live slots and on two optional trailing sections.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────┐  word aligned
//! │ retaddr        (word)    │
//! │ frame_size     (u16)     │  bit 0: debug info, bit 1: alloc lengths
//! │ num_live       (u16)     │
//! │ live_ofs[num_live] (u16) │
//! ├──────────────────────────┤
//! │ k (u8) + k alloc lengths │  iff bit 1
//! ├──────────────────────────┤  4-byte aligned
//! │ debug info (u32 × k | 1) │  iff bit 0 and frame_size != 0xFFFF
//! ├──────────────────────────┤
//! │ padding to word          │
//! └──────────────────────────┘
//! ```

use smallvec::SmallVec;

use crate::cursor::{Cursor, WORD_SIZE};
use crate::error::DecodeError;

/// `frame_size` bit: debug info section present.
pub const FLAG_DEBUG_INFO: u16 = 1 << 0;

/// `frame_size` bit: allocation length section present.
pub const FLAG_ALLOC_LENGTHS: u16 = 1 << 1;

/// Reserved `frame_size` value: no debug info even though bit 0 is set.
pub const FRAME_SIZE_SENTINEL: u16 = u16::MAX;

/// Size of the fixed header (retaddr, frame_size, num_live).
pub const HEADER_SIZE: usize = WORD_SIZE + 4;

/// Lowest return address a well-formed producer can emit.
pub const MIN_RETURN_ADDRESS: usize = 4096;

// =============================================================================
// Trailing sections
// =============================================================================

/// Byte positions of the optional sections, relative to the slice the
/// cursor was created over.
#[derive(Debug, Clone, Copy)]
struct Sections {
    alloc_lengths: Option<(usize, usize)>,
    debug_info: Option<(usize, usize)>,
}

/// Consume the optional sections that follow the live offsets.
fn read_sections(cursor: &mut Cursor<'_>, frame_size: u16) -> Result<Sections, DecodeError> {
    let mut num_allocs = 0;
    let mut alloc_lengths = None;
    if frame_size & FLAG_ALLOC_LENGTHS != 0 {
        let start = cursor.position() + 1;
        num_allocs = cursor.read_length_prefixed()?.len();
        alloc_lengths = Some((start, num_allocs));
    }

    let mut debug_info = None;
    if frame_size & FLAG_DEBUG_INFO != 0 && frame_size != FRAME_SIZE_SENTINEL {
        cursor.align_to(4)?;
        let count = if frame_size & FLAG_ALLOC_LENGTHS != 0 {
            num_allocs
        } else {
            1
        };
        let start = cursor.position();
        cursor.skip(count * 4)?;
        debug_info = Some((start, count));
    }

    Ok(Sections {
        alloc_lengths,
        debug_info,
    })
}

/// Compute the offset of the descriptor following the one at `offset`.
///
/// The result is the start of the next descriptor, or the end of the table
/// when `offset` names the last one. `table` must be the whole table slice so
/// that alignment is computed against the producer's addresses.
pub fn next_descriptor_offset(table: &[u8], offset: usize) -> Result<usize, DecodeError> {
    FrameDescriptor::decode(table, offset).map(|(_, next)| next)
}

// =============================================================================
// FrameDescriptor
// =============================================================================

/// Read-only view of one frame descriptor inside a frame table.
#[derive(Clone, Copy)]
pub struct FrameDescriptor<'a> {
    retaddr: usize,
    frame_size: u16,
    num_live: u16,
    /// The whole record, padding included.
    bytes: &'a [u8],
}

impl<'a> FrameDescriptor<'a> {
    /// Decode the descriptor at `offset` in `table`.
    ///
    /// Returns the descriptor and the offset of the one after it.
    pub fn decode(table: &'a [u8], offset: usize) -> Result<(Self, usize), DecodeError> {
        let mut cursor = Cursor::at(table, offset);
        let retaddr = cursor.read_word()?;
        let frame_size = cursor.read_u16()?;
        let num_live = cursor.read_u16()?;
        cursor.skip(num_live as usize * 2)?;
        read_sections(&mut cursor, frame_size)?;
        cursor.align_to(WORD_SIZE)?;

        let end = cursor.position();
        let descriptor = Self {
            retaddr,
            frame_size,
            num_live,
            bytes: &table[offset..end],
        };
        Ok((descriptor, end))
    }

    /// Return address this descriptor is keyed by.
    #[inline]
    pub fn return_address(&self) -> usize {
        self.retaddr
    }

    /// Raw `frame_size` field, flag bits included.
    #[inline]
    pub fn frame_size_raw(&self) -> u16 {
        self.frame_size
    }

    /// Frame size in bytes with the flag bits masked off.
    ///
    /// `None` for the reserved sentinel value.
    #[inline]
    pub fn frame_size(&self) -> Option<u16> {
        if self.frame_size == FRAME_SIZE_SENTINEL {
            None
        } else {
            Some(self.frame_size & !(FLAG_DEBUG_INFO | FLAG_ALLOC_LENGTHS))
        }
    }

    /// Whether the allocation length section is present.
    ///
    /// The sentinel frame size has this bit set, so a sentinel record
    /// carries an (empty) length byte.
    #[inline]
    pub fn has_alloc_lengths(&self) -> bool {
        self.frame_size & FLAG_ALLOC_LENGTHS != 0
    }

    /// Whether the debug info section is present.
    #[inline]
    pub fn has_debug_info(&self) -> bool {
        self.frame_size & FLAG_DEBUG_INFO != 0 && self.frame_size != FRAME_SIZE_SENTINEL
    }

    /// Number of live stack slots.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.num_live as usize
    }

    /// Iterate over live slot offsets.
    #[inline]
    pub fn live_offsets(&self) -> LiveOffsets<'a> {
        let end = HEADER_SIZE + self.live_count() * 2;
        LiveOffsets {
            raw: self.bytes[HEADER_SIZE..end].chunks_exact(2),
        }
    }

    /// Collect live slot offsets; most frames fit inline.
    pub fn collect_live_offsets(&self) -> SmallVec<[u16; 8]> {
        self.live_offsets().collect()
    }

    /// Per-allocation-site length table, if present.
    pub fn alloc_lengths(&self) -> Option<&'a [u8]> {
        let (start, len) = self.sections().alloc_lengths?;
        Some(&self.bytes[start..start + len])
    }

    /// Debug info words, if present.
    ///
    /// One word per allocation site when the allocation length section is
    /// present, otherwise exactly one.
    pub fn debug_info(&self) -> Option<DebugInfo<'a>> {
        let (start, count) = self.sections().debug_info?;
        Some(DebugInfo {
            raw: self.bytes[start..start + count * 4].chunks_exact(4),
        })
    }

    /// Encoded size in bytes, trailing padding included.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        self.bytes.len()
    }

    /// Re-read the trailing sections of an already validated record.
    fn sections(&self) -> Sections {
        let mut cursor = Cursor::at(self.bytes, HEADER_SIZE + self.live_count() * 2);
        read_sections(&mut cursor, self.frame_size).unwrap_or(Sections {
            alloc_lengths: None,
            debug_info: None,
        })
    }
}

impl std::fmt::Debug for FrameDescriptor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDescriptor")
            .field("retaddr", &format_args!("{:#x}", self.retaddr))
            .field("frame_size", &self.frame_size())
            .field("live", &self.collect_live_offsets())
            .field("alloc_lengths", &self.alloc_lengths())
            .field("debug_info", &self.has_debug_info())
            .finish()
    }
}

impl PartialEq for FrameDescriptor<'_> {
    /// Two views are equal when they name the same record.
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.bytes.as_ptr(), other.bytes.as_ptr())
            && self.bytes.len() == other.bytes.len()
    }
}

impl Eq for FrameDescriptor<'_> {}

// =============================================================================
// Section iterators
// =============================================================================

/// Iterator over live slot offsets.
#[derive(Debug, Clone)]
pub struct LiveOffsets<'a> {
    raw: std::slice::ChunksExact<'a, u8>,
}

impl Iterator for LiveOffsets<'_> {
    type Item = u16;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.raw.next().map(|c| u16::from_ne_bytes([c[0], c[1]]))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl ExactSizeIterator for LiveOffsets<'_> {}

/// Iterator over debug info words.
#[derive(Debug, Clone)]
pub struct DebugInfo<'a> {
    raw: std::slice::ChunksExact<'a, u8>,
}

impl Iterator for DebugInfo<'_> {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.raw
            .next()
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl ExactSizeIterator for DebugInfo<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{DescriptorSpec, FrameTableWriter};

    fn single(spec: DescriptorSpec) -> crate::OwnedFrameTable {
        let mut writer = FrameTableWriter::new();
        writer.push(spec);
        writer.finish()
    }

    #[test]
    fn test_plain_descriptor() {
        let owned = single(DescriptorSpec::new(0x1000, 32).with_live(&[8, 16, 24]));
        let table = owned.as_table();
        let d = table.descriptors().next().unwrap();

        assert_eq!(d.return_address(), 0x1000);
        assert_eq!(d.frame_size(), Some(32));
        assert_eq!(d.live_count(), 3);
        assert_eq!(d.live_offsets().collect::<Vec<_>>(), vec![8, 16, 24]);
        assert!(!d.has_alloc_lengths());
        assert!(!d.has_debug_info());
        assert!(d.alloc_lengths().is_none());
        assert!(d.debug_info().is_none());
        // header + 3 offsets, rounded to a word
        assert_eq!(
            d.encoded_len(),
            crate::cursor::align_up(HEADER_SIZE + 6, WORD_SIZE)
        );
    }

    #[test]
    fn test_alloc_lengths_without_debug_info() {
        let owned = single(
            DescriptorSpec::new(0x2000, 16)
                .with_live(&[0])
                .with_alloc_lengths(&[2, 3, 5]),
        );
        let d = owned.as_table().descriptors().next().unwrap();

        assert!(d.has_alloc_lengths());
        assert_eq!(d.alloc_lengths(), Some(&[2u8, 3, 5][..]));
        assert!(d.debug_info().is_none());
        assert_eq!(d.frame_size(), Some(16));
    }

    #[test]
    fn test_debug_info_per_allocation_site() {
        let owned = single(
            DescriptorSpec::new(0x3000, 48)
                .with_alloc_lengths(&[1, 4])
                .with_debug_info(&[0xAAAA, 0xBBBB]),
        );
        let d = owned.as_table().descriptors().next().unwrap();

        assert!(d.has_debug_info());
        assert_eq!(
            d.debug_info().unwrap().collect::<Vec<_>>(),
            vec![0xAAAA, 0xBBBB]
        );
        assert_eq!(d.alloc_lengths(), Some(&[1u8, 4][..]));
    }

    #[test]
    fn test_single_debug_word() {
        let owned = single(
            DescriptorSpec::new(0x4000, 8)
                .with_live(&[4])
                .with_debug_info(&[7]),
        );
        let d = owned.as_table().descriptors().next().unwrap();

        assert!(d.has_debug_info());
        assert_eq!(d.debug_info().unwrap().len(), 1);
        assert_eq!(d.frame_size(), Some(8));
    }

    #[test]
    fn test_sentinel_frame_size_has_no_debug_info() {
        let owned = single(DescriptorSpec::with_raw_frame_size(0x5000, FRAME_SIZE_SENTINEL));
        let d = owned.as_table().descriptors().next().unwrap();

        assert_eq!(d.frame_size(), None);
        assert!(d.has_alloc_lengths());
        assert_eq!(d.alloc_lengths(), Some(&[][..]));
        assert!(!d.has_debug_info());
        assert!(d.debug_info().is_none());
    }

    #[test]
    fn test_next_descriptor_offset_chains() {
        let mut writer = FrameTableWriter::new();
        writer.push(DescriptorSpec::new(0x1000, 16).with_live(&[1, 2, 3, 4, 5]));
        writer.push(DescriptorSpec::new(0x1010, 16).with_alloc_lengths(&[9]));
        writer.push(DescriptorSpec::new(0x1020, 16));
        let owned = writer.finish();
        let bytes = owned.as_table().as_bytes();

        let first = WORD_SIZE;
        let second = next_descriptor_offset(bytes, first).unwrap();
        let third = next_descriptor_offset(bytes, second).unwrap();
        let end = next_descriptor_offset(bytes, third).unwrap();

        assert_eq!(second % WORD_SIZE, 0);
        assert_eq!(third % WORD_SIZE, 0);
        assert_eq!(end, bytes.len());

        let (d, _) = FrameDescriptor::decode(bytes, third).unwrap();
        assert_eq!(d.return_address(), 0x1020);
    }

    #[test]
    fn test_collect_live_offsets_inline() {
        let owned = single(DescriptorSpec::new(0x6000, 64).with_live(&[1, 2, 3]));
        let d = owned.as_table().descriptors().next().unwrap();
        let live = d.collect_live_offsets();
        assert!(!live.spilled());
        assert_eq!(live.as_slice(), &[1, 2, 3]);
    }
}

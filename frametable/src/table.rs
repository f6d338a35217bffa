//! Frame tables: one compiled unit's descriptors.
//!
//! A table is a machine word holding the descriptor count followed by that
//! many descriptors. Tables are validated once when constructed; after that
//! walking them cannot fail.

use crate::cursor::{Cursor, WORD_SIZE};
use crate::descriptor::{FrameDescriptor, next_descriptor_offset};
use crate::error::DecodeError;

// =============================================================================
// FrameTable
// =============================================================================

/// A validated frame table.
///
/// Registered tables are `FrameTable<'static>`: the registry hands out
/// descriptor views that borrow from them for as long as it lives, and
/// tables are never unregistered.
#[derive(Clone, Copy)]
pub struct FrameTable<'a> {
    bytes: &'a [u8],
    count: usize,
}

impl<'a> FrameTable<'a> {
    /// Validate `bytes` as a frame table.
    ///
    /// The slice must start on a word boundary and contain exactly the
    /// declared number of descriptors.
    pub fn new(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        let addr = bytes.as_ptr() as usize;
        if addr % WORD_SIZE != 0 {
            return Err(DecodeError::Misaligned {
                addr,
                align: WORD_SIZE,
            });
        }

        let count = Cursor::at(bytes, 0).read_word()?;
        let mut offset = WORD_SIZE;
        for _ in 0..count {
            offset = next_descriptor_offset(bytes, offset)?;
        }
        if offset != bytes.len() {
            return Err(DecodeError::TrailingBytes {
                count,
                extra: bytes.len() - offset,
            });
        }

        Ok(Self { bytes, count })
    }

    /// Construct from bytes known to be well formed.
    #[inline]
    pub(crate) fn from_encoded(bytes: &'a [u8], count: usize) -> Self {
        debug_assert!(Self::new(bytes).is_ok());
        Self { bytes, count }
    }

    /// Number of descriptors in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if the table has no descriptors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Raw table bytes, count word included.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Address of the table in memory.
    #[inline]
    pub fn base_address(&self) -> usize {
        self.bytes.as_ptr() as usize
    }

    /// Iterate over the descriptors in table order.
    #[inline]
    pub fn descriptors(&self) -> Descriptors<'a> {
        Descriptors {
            bytes: self.bytes,
            offset: WORD_SIZE,
            remaining: self.count,
        }
    }
}

impl FrameTable<'static> {
    /// Adopt producer memory as a table.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes for the rest of the
    /// process, and the memory must never be written again.
    pub unsafe fn from_raw_parts(ptr: *const u8, len: usize) -> Result<Self, DecodeError> {
        // SAFETY: guaranteed by the caller.
        let bytes = unsafe { std::slice::from_raw_parts(ptr, len) };
        Self::new(bytes)
    }
}

impl std::fmt::Debug for FrameTable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTable")
            .field("base", &format_args!("{:#x}", self.base_address()))
            .field("bytes", &self.bytes.len())
            .field("descriptors", &self.count)
            .finish()
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// Iterator over the descriptors of a table.
#[derive(Debug, Clone)]
pub struct Descriptors<'a> {
    bytes: &'a [u8],
    offset: usize,
    remaining: usize,
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = FrameDescriptor<'a>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        // Validated at construction.
        let (descriptor, next) = FrameDescriptor::decode(self.bytes, self.offset).ok()?;
        self.offset = next;
        self.remaining -= 1;
        Some(descriptor)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Descriptors<'_> {}

//! Bounds-checked reader over frame table bytes.
//!
//! Alignment is computed on the absolute address of the underlying bytes,
//! not on the cursor offset, because the producer pads descriptors relative
//! to where the table lives in memory.

use crate::error::DecodeError;

/// Width of a machine word (and of the `retaddr` and count fields).
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

/// Round `value` up to a multiple of `align` (a power of two).
#[inline]
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

// =============================================================================
// Cursor
// =============================================================================

/// Forward-only reader over a byte slice.
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor positioned at `pos`.
    #[inline]
    pub(crate) fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    /// Current byte offset from the start of the slice.
    #[inline]
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the current position.
    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    /// Absolute address of the current position.
    #[inline]
    fn address(&self) -> usize {
        self.bytes.as_ptr() as usize + self.pos
    }

    #[inline]
    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.remaining();
        if len > available {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: len,
                available,
            });
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.bytes[start..self.pos])
    }

    /// Read a fixed-size field.
    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    /// Read a native-endian machine word.
    #[inline]
    pub(crate) fn read_word(&mut self) -> Result<usize, DecodeError> {
        self.read_array().map(usize::from_ne_bytes)
    }

    /// Read a native-endian `u16`.
    #[inline]
    pub(crate) fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.read_array().map(u16::from_ne_bytes)
    }

    /// Skip `len` bytes.
    #[inline]
    pub(crate) fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take(len).map(|_| ())
    }

    /// Read a section made of one length byte `k` followed by `k` bytes.
    ///
    /// Returns the `k` payload bytes.
    #[inline]
    pub(crate) fn read_length_prefixed(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_array::<1>()?[0] as usize;
        self.take(len)
    }

    /// Advance to the next address that is a multiple of `align`.
    #[inline]
    pub(crate) fn align_to(&mut self, align: usize) -> Result<(), DecodeError> {
        debug_assert!(align.is_power_of_two());
        let addr = self.address();
        self.skip(align_up(addr, align) - addr)
    }
}

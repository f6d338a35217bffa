//! Producer-side frame table encoder.
//!
//! Emits tables in exactly the layout the decoder reads: a word count
//! followed by word-aligned descriptors. Used by JIT backends that generate
//! frame metadata at runtime, and by tests and benchmarks.
//!
//! # Example
//!
//! ```
//! use frametable::{DescriptorSpec, FrameTableWriter};
//!
//! let mut writer = FrameTableWriter::new();
//! writer.push(DescriptorSpec::new(0x1000, 32).with_live(&[8, 16]));
//! writer.push(DescriptorSpec::new(0x1010, 16).with_alloc_lengths(&[2]));
//!
//! let table = writer.finish();
//! assert_eq!(table.as_table().len(), 2);
//! ```

use smallvec::SmallVec;

use crate::cursor::{WORD_SIZE, align_up};
use crate::descriptor::{FLAG_ALLOC_LENGTHS, FLAG_DEBUG_INFO, FRAME_SIZE_SENTINEL};
use crate::table::FrameTable;

// =============================================================================
// DescriptorSpec
// =============================================================================

/// Contents of one descriptor to encode.
#[derive(Debug, Clone)]
pub struct DescriptorSpec {
    retaddr: usize,
    frame_size: u16,
    raw_frame_size: bool,
    live: SmallVec<[u16; 8]>,
    alloc_lengths: Option<Vec<u8>>,
    debug_info: Option<Vec<u32>>,
}

impl DescriptorSpec {
    /// Describe a frame of `frame_size` bytes returning to `retaddr`.
    ///
    /// The flag bits of `frame_size` are derived from the sections attached
    /// later and must be clear here.
    pub fn new(retaddr: usize, frame_size: u16) -> Self {
        debug_assert_eq!(frame_size & (FLAG_DEBUG_INFO | FLAG_ALLOC_LENGTHS), 0);
        Self {
            retaddr,
            frame_size,
            raw_frame_size: false,
            live: SmallVec::new(),
            alloc_lengths: None,
            debug_info: None,
        }
    }

    /// Describe a frame whose `frame_size` field is written verbatim.
    ///
    /// Sections are still emitted according to the bits in `raw`; missing
    /// section contents are written as zeros.
    pub fn with_raw_frame_size(retaddr: usize, raw: u16) -> Self {
        Self {
            retaddr,
            frame_size: raw,
            raw_frame_size: true,
            live: SmallVec::new(),
            alloc_lengths: None,
            debug_info: None,
        }
    }

    /// Set the live slot offsets.
    pub fn with_live(mut self, offsets: &[u16]) -> Self {
        self.live = SmallVec::from_slice(offsets);
        self
    }

    /// Attach a per-allocation-site length table.
    pub fn with_alloc_lengths(mut self, lengths: &[u8]) -> Self {
        self.alloc_lengths = Some(lengths.to_vec());
        self
    }

    /// Attach debug info words.
    pub fn with_debug_info(mut self, words: &[u32]) -> Self {
        self.debug_info = Some(words.to_vec());
        self
    }

    /// Return address of this descriptor.
    #[inline]
    pub fn return_address(&self) -> usize {
        self.retaddr
    }

    /// The `frame_size` field as it will be encoded.
    pub fn encoded_frame_size(&self) -> u16 {
        if self.raw_frame_size {
            return self.frame_size;
        }
        let mut raw = self.frame_size;
        if self.alloc_lengths.is_some() {
            raw |= FLAG_ALLOC_LENGTHS;
        }
        if self.debug_info.is_some() {
            raw |= FLAG_DEBUG_INFO;
        }
        raw
    }
}

// =============================================================================
// FrameTableWriter
// =============================================================================

/// Builder for frame tables.
#[derive(Debug, Default)]
pub struct FrameTableWriter {
    /// Encoded descriptors; the count word is prepended by `finish`.
    buf: Vec<u8>,
    count: usize,
}

impl FrameTableWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
            count: 0,
        }
    }

    /// Append one descriptor.
    ///
    /// # Panics
    ///
    /// Panics if there are more than 255 allocation sites, more than
    /// `u16::MAX` live slots, or if the debug info word count does not match
    /// the allocation site count (or one, without allocation lengths).
    pub fn push(&mut self, spec: DescriptorSpec) {
        let raw = spec.encoded_frame_size();
        assert!(spec.live.len() <= u16::MAX as usize, "too many live slots");

        // Offsets are relative to a word-aligned start, so position-based
        // alignment matches the address-based alignment of the decoder.
        self.buf.extend_from_slice(&spec.retaddr.to_ne_bytes());
        self.buf.extend_from_slice(&raw.to_ne_bytes());
        self.buf
            .extend_from_slice(&(spec.live.len() as u16).to_ne_bytes());
        for ofs in &spec.live {
            self.buf.extend_from_slice(&ofs.to_ne_bytes());
        }

        let mut num_allocs = 0;
        if raw & FLAG_ALLOC_LENGTHS != 0 {
            let lengths = spec.alloc_lengths.as_deref().unwrap_or(&[]);
            assert!(lengths.len() <= u8::MAX as usize, "too many allocation sites");
            num_allocs = lengths.len();
            self.buf.push(num_allocs as u8);
            self.buf.extend_from_slice(lengths);
        }

        if raw & FLAG_DEBUG_INFO != 0 && raw != FRAME_SIZE_SENTINEL {
            self.pad_to(4);
            let expected = if raw & FLAG_ALLOC_LENGTHS != 0 {
                num_allocs
            } else {
                1
            };
            let mut words = spec.debug_info.unwrap_or_default();
            if spec.raw_frame_size {
                words.resize(expected, 0);
            }
            assert_eq!(words.len(), expected, "debug info word count mismatch");
            for word in words {
                self.buf.extend_from_slice(&word.to_ne_bytes());
            }
        }

        self.pad_to(WORD_SIZE);
        self.count += 1;
    }

    /// Append several descriptors.
    pub fn extend(&mut self, specs: impl IntoIterator<Item = DescriptorSpec>) {
        for spec in specs {
            self.push(spec);
        }
    }

    fn pad_to(&mut self, align: usize) {
        let len = align_up(self.buf.len(), align);
        self.buf.resize(len, 0);
    }

    /// Number of descriptors written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Finish the table.
    pub fn finish(self) -> OwnedFrameTable {
        let mut words = Vec::with_capacity(1 + self.buf.len() / WORD_SIZE);
        words.push(self.count);
        words.extend(self.buf.chunks_exact(WORD_SIZE).map(|chunk| {
            let mut word = [0u8; WORD_SIZE];
            word.copy_from_slice(chunk);
            usize::from_ne_bytes(word)
        }));
        OwnedFrameTable {
            words: words.into_boxed_slice(),
            count: self.count,
        }
    }
}

// =============================================================================
// OwnedFrameTable
// =============================================================================

/// A heap-allocated, word-aligned frame table.
#[derive(Debug, Clone)]
pub struct OwnedFrameTable {
    words: Box<[usize]>,
    count: usize,
}

impl OwnedFrameTable {
    /// Raw table bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: any initialized `usize` slice is a valid byte slice of
        // `size_of_val` bytes, and `u8` has no alignment requirement.
        unsafe {
            std::slice::from_raw_parts(
                self.words.as_ptr() as *const u8,
                std::mem::size_of_val(&*self.words),
            )
        }
    }

    /// Borrow as a frame table.
    #[inline]
    pub fn as_table(&self) -> FrameTable<'_> {
        FrameTable::from_encoded(self.as_bytes(), self.count)
    }

    /// Leak the storage and return a table that lives for the rest of the
    /// process, as registered tables must.
    pub fn leak(self) -> FrameTable<'static> {
        let count = self.count;
        let words: &'static [usize] = Box::leak(self.words);
        // SAFETY: as in `as_bytes`; the storage is never freed.
        let bytes = unsafe {
            std::slice::from_raw_parts(words.as_ptr() as *const u8, std::mem::size_of_val(words))
        };
        FrameTable::from_encoded(bytes, count)
    }
}

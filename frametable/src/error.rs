//! Error types for frame table decoding and registry configuration.
//!
//! Decoding errors only surface when a [`FrameTable`](crate::FrameTable) is
//! constructed. Once a table has been accepted, every later decode of it is
//! infallible, so the registry's read and write paths carry no error values.

use thiserror::Error;

/// A frame table failed structural validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The table base address is not aligned to the machine word.
    #[error("frame table at {addr:#x} is not aligned to {align} bytes")]
    Misaligned {
        /// Base address of the table.
        addr: usize,
        /// Required alignment.
        align: usize,
    },

    /// A field or section extends past the end of the table.
    #[error("frame table truncated: need {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        /// Byte offset of the read that failed.
        offset: usize,
        /// Number of bytes the read needed.
        needed: usize,
        /// Number of bytes left in the table.
        available: usize,
    },

    /// Bytes remain after the last declared descriptor.
    #[error("frame table has {extra} trailing bytes after {count} descriptors")]
    TrailingBytes {
        /// Declared descriptor count.
        count: usize,
        /// Number of unconsumed bytes.
        extra: usize,
    },
}

/// Registry configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Minimum slot count must be a power of two, at least 4.
    #[error("minimum slot count must be a power of two, at least 4 (got {0})")]
    InvalidMinSlots(usize),
}

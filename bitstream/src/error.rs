//! Error types for bitstream operations.

use thiserror::Error;

/// Result type for bitstream operations.
pub type BitResult<T> = Result<T, BitError>;

/// Errors raised by [`BitWriter`](crate::BitWriter) and [`BitReader`](crate::BitReader).
///
/// Reads past the end are the common case: every received payload is
/// untrusted and may be truncated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitError {
    /// A read needed more bits than the buffer has left.
    #[error("attempted to read {requested} bits but only {available} bits available")]
    EndOfBuffer { requested: usize, available: usize },

    /// A fixed-width field wider than 64 bits was requested.
    #[error("invalid bit count {bits}, maximum allowed is {max_bits}")]
    InvalidBitCount { bits: u8, max_bits: u8 },

    /// A value has set bits above the requested width.
    #[error("value {value} cannot be represented in {bits} bits")]
    ValueOutOfRange { value: u64, bits: u8 },

    /// A varint ran past its maximum encoded length.
    #[error("varint exceeds maximum encoded length")]
    InvalidVarint,

    /// A rewind, patch or seek targeted a position outside the written or readable range.
    #[error("bit position {position} is outside the valid range 0..={limit}")]
    InvalidPosition { position: usize, limit: usize },
}

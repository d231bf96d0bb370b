//! Error types for message framing.

use thiserror::Error;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while framing or parsing replication messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum WireError {
    /// Bitstream error.
    #[error("bitstream error: {0}")]
    Bitstream(#[from] bitstream::BitError),

    /// Unknown message kind byte.
    #[error("unknown message kind: {kind}")]
    UnknownMessageKind { kind: u8 },

    /// A section payload is longer than its length prefix can express.
    #[error("section payload of {bits} bits exceeds the {max} bit maximum")]
    SectionTooLong { bits: usize, max: usize },

    /// A section declares more payload bits than remain in the frame.
    #[error("section declares {declared} bits but only {available} remain")]
    SectionOverrun { declared: usize, available: usize },

    /// Too many sections in one frame.
    #[error("frame section count exceeds {limit}")]
    TooManySections { limit: usize },

    /// A create payload is longer than allowed.
    #[error("create payload of {len} bytes exceeds {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Bytes remain after a complete message.
    #[error("{bits} trailing bits after message")]
    TrailingData { bits: usize },
}

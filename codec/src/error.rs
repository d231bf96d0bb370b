//! Error types for codec operations.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding poses and velocities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Bitstream error.
    #[error("bitstream error: {0}")]
    Bitstream(#[from] bitstream::BitError),

    /// A value to be encoded was NaN or infinite.
    #[error("non-finite {field} cannot be encoded")]
    NonFinite {
        /// Which field carried the bad value.
        field: &'static str,
    },

    /// A finite value was outside the range its encoding can represent.
    #[error("{field} is outside the encodable range")]
    OutOfRange {
        /// Which field carried the bad value.
        field: &'static str,
    },
}

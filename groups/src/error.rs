//! Error types for state groups.

use thiserror::Error;
use wire::Endpoint;

/// Result type for state group operations.
pub type GroupResult<T> = Result<T, GroupError>;

/// Errors raised by a state group while encoding or decoding its payload.
///
/// None of these escape a replication tick: the registry rewinds the
/// group's section and treats the attempt as lost.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum GroupError {
    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] codec::CodecError),

    /// Bitstream error.
    #[error("bitstream error: {0}")]
    Bitstream(#[from] bitstream::BitError),

    /// No client group state exists for the endpoint.
    #[error("no client state for {endpoint}")]
    UnknownClient { endpoint: Endpoint },

    /// A decoded value violates the payload layout.
    #[error("malformed {what} in group payload")]
    Malformed { what: &'static str },
}

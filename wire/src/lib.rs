//! Identifiers and message framing for netsync replication.
//!
//! This crate defines what travels between a replication server and its
//! clients: the id newtypes, the message kinds handed to the transport, the
//! create/destroy message layouts, and the state-sync frame that carries one
//! length-prefixed section per serialized state group.
//!
//! # Design Principles
//!
//! - **Skippable sections** - Every group payload is length-prefixed so a
//!   receiver can step over what it cannot decode.
//! - **Bounded decoding** - Section counts and payload sizes are validated
//!   against [`Limits`] before iteration.
//! - **No domain knowledge** - Group payloads are opaque bits here.

mod error;
mod frame;
mod ids;
mod limits;
mod message;

pub use error::{WireError, WireResult};
pub use frame::{
    abandon_section, begin_frame, begin_section, end_frame, finish_section, FrameReader,
    SectionHeader, SectionInfo, SectionMark, FRAME_OVERHEAD_BITS, MAX_SECTION_PAYLOAD_BITS,
    SECTION_LENGTH_BITS,
};
pub use ids::{Endpoint, MessageId, PacketId, ReplicableId};
pub use limits::Limits;
pub use message::{CreateMessage, DestroyMessage, MessageKind};

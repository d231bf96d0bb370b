//! Low-level bit packing primitives for netsync replication.
//!
//! Replication payloads are packed below byte granularity and bounded by a
//! per-tick bit budget. [`BitWriter`] therefore supports rewinding to a
//! saved position (to drop a section that did not fit) and patching a field
//! written earlier (to fill in a length prefix once the payload is known).
//! [`BitReader`] is the bounds-checked mirror, with `seek`/`skip_bits` for
//! stepping over sections a receiver cannot decode.
//!
//! # Design Principles
//!
//! - **Bounded operations** - Every read checks the remaining bits first.
//! - **No domain knowledge** - Nothing here knows about entities or groups.
//! - **Structured errors** - Failures are [`BitError`] values, never panics.
//!
//! # Example
//!
//! ```
//! use bitstream::{BitReader, BitWriter};
//!
//! let mut writer = BitWriter::new();
//! let length_at = writer.bit_position();
//! writer.write_u8(0);
//! writer.write_varu32(300);
//! writer.write_bool(true);
//! let payload = (writer.bit_position() - length_at - 8) as u64;
//! writer.patch_bits(length_at, payload, 8).unwrap();
//!
//! let bytes = writer.finish();
//! let mut reader = BitReader::new(&bytes);
//! assert_eq!(reader.read_u8().unwrap(), 17);
//! assert_eq!(reader.read_varu32().unwrap(), 300);
//! assert!(reader.read_bool().unwrap());
//! ```

mod error;
mod reader;
mod writer;

pub use error::{BitError, BitResult};
pub use reader::BitReader;
pub use writer::BitWriter;

/// Payload bits per varint group.
pub(crate) const VARINT_GROUP_BITS: u8 = 7;
pub(crate) const VARINT_MAX_GROUPS_U32: usize = 5;
pub(crate) const VARINT_MAX_GROUPS_U64: usize = 10;

/// Number of bits a varint-encoded `value` occupies.
#[must_use]
pub const fn varint_bits(mut value: u64) -> usize {
    let mut groups = 1;
    value >>= VARINT_GROUP_BITS;
    while value != 0 {
        groups += 1;
        value >>= VARINT_GROUP_BITS;
    }
    groups * (VARINT_GROUP_BITS as usize + 1)
}

/// Zigzag mapping of a signed value onto an unsigned one, small magnitudes first.
#[must_use]
pub const fn zigzag64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Number of bits a zigzag varint `value` occupies.
#[must_use]
pub const fn vars64_bits(value: i64) -> usize {
    varint_bits(zigzag64(value))
}

//! State-sync frame layout.
//!
//! ```text
//! packet_id: u8
//! repeated:
//!   more: bool (true)
//!   replicable: varu64
//!   group_index: u8
//!   payload_bits: u16
//!   payload: payload_bits bits, owned by the group
//! more: bool (false)
//! ```
//!
//! The length prefix lets a receiver skip a section it cannot decode (an
//! unknown replicable, a group that failed) without losing the rest of the
//! frame.

use bitstream::{varint_bits, BitReader, BitWriter};

use crate::error::{WireError, WireResult};
use crate::ids::{PacketId, ReplicableId};
use crate::limits::Limits;

/// Bits of the section length prefix.
pub const SECTION_LENGTH_BITS: u8 = 16;
/// Largest payload a single section can carry.
pub const MAX_SECTION_PAYLOAD_BITS: usize = u16::MAX as usize;
/// Fixed bits of every frame: the packet id and the closing `more` bit.
pub const FRAME_OVERHEAD_BITS: usize = 8 + 1;

/// Addresses one state group of one replicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionHeader {
    pub replicable: ReplicableId,
    pub group_index: u8,
}

impl SectionHeader {
    #[must_use]
    pub const fn new(replicable: ReplicableId, group_index: u8) -> Self {
        Self {
            replicable,
            group_index,
        }
    }

    /// Bits the header occupies on the wire, including the `more` bit.
    #[must_use]
    pub const fn encoded_bits(&self) -> usize {
        1 + varint_bits(self.replicable.raw()) + 8 + SECTION_LENGTH_BITS as usize
    }
}

/// Positions recorded by [`begin_section`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionMark {
    start: usize,
    length_at: usize,
    payload_start: usize,
}

impl SectionMark {
    /// Bit position where the section (its `more` bit) starts.
    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// Bit position where the group payload starts.
    #[must_use]
    pub const fn payload_start(&self) -> usize {
        self.payload_start
    }
}

pub fn begin_frame(writer: &mut BitWriter, packet_id: PacketId) {
    writer.write_u8(packet_id.raw());
}

pub fn end_frame(writer: &mut BitWriter) {
    writer.write_bool(false);
}

/// Writes a section header with a placeholder length.
pub fn begin_section(writer: &mut BitWriter, header: SectionHeader) -> SectionMark {
    let start = writer.bit_position();
    writer.write_bool(true);
    writer.write_varu64(header.replicable.raw());
    writer.write_u8(header.group_index);
    let length_at = writer.bit_position();
    writer.write_u16(0);
    SectionMark {
        start,
        length_at,
        payload_start: writer.bit_position(),
    }
}

/// Patches the length prefix of the section opened at `mark`.
pub fn finish_section(writer: &mut BitWriter, mark: SectionMark) -> WireResult<usize> {
    let bits = writer.bit_position().saturating_sub(mark.payload_start);
    if bits > MAX_SECTION_PAYLOAD_BITS {
        return Err(WireError::SectionTooLong {
            bits,
            max: MAX_SECTION_PAYLOAD_BITS,
        });
    }
    writer.patch_bits(mark.length_at, bits as u64, SECTION_LENGTH_BITS)?;
    Ok(bits)
}

/// Removes the section opened at `mark` and everything written after it.
pub fn abandon_section(writer: &mut BitWriter, mark: SectionMark) -> WireResult<()> {
    writer.rewind(mark.start)?;
    Ok(())
}

/// A section located by [`FrameReader::next_section`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionInfo {
    pub header: SectionHeader,
    pub payload_start: usize,
    pub payload_bits: usize,
}

impl SectionInfo {
    #[must_use]
    pub const fn payload_end(&self) -> usize {
        self.payload_start + self.payload_bits
    }
}

/// Iterates the sections of a state-sync frame.
#[derive(Debug)]
pub struct FrameReader<'a> {
    reader: BitReader<'a>,
    packet_id: PacketId,
    sections: usize,
    max_sections: usize,
    done: bool,
}

impl<'a> FrameReader<'a> {
    pub fn new(bytes: &'a [u8], limits: &Limits) -> WireResult<Self> {
        let mut reader = BitReader::new(bytes);
        let packet_id = PacketId::new(reader.read_u8()?);
        Ok(Self {
            reader,
            packet_id,
            sections: 0,
            max_sections: limits.max_sections,
            done: false,
        })
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    /// Reads the next section header and leaves the cursor at its payload.
    ///
    /// Returns `Ok(None)` at the end marker. Errors here are fatal for the
    /// rest of the frame.
    pub fn next_section(&mut self) -> WireResult<Option<SectionInfo>> {
        if self.done || !self.reader.read_bool()? {
            self.done = true;
            return Ok(None);
        }
        if self.sections >= self.max_sections {
            return Err(WireError::TooManySections {
                limit: self.max_sections,
            });
        }
        let replicable = ReplicableId::new(self.reader.read_varu64()?);
        let group_index = self.reader.read_u8()?;
        let payload_bits = usize::from(self.reader.read_u16()?);
        let available = self.reader.bits_remaining();
        if payload_bits > available {
            return Err(WireError::SectionOverrun {
                declared: payload_bits,
                available,
            });
        }
        self.sections += 1;
        Ok(Some(SectionInfo {
            header: SectionHeader::new(replicable, group_index),
            payload_start: self.reader.bit_position(),
            payload_bits,
        }))
    }

    /// Reader confined to the payload of `section`.
    ///
    /// A decoder reading past the declared length gets an end-of-buffer
    /// error instead of consuming the next section.
    pub fn payload(&self, section: &SectionInfo) -> WireResult<BitReader<'a>> {
        Ok(self
            .reader
            .window(section.payload_start, section.payload_bits)?)
    }

    /// Moves to the end of `section` regardless of how much was decoded.
    pub fn end_section(&mut self, section: &SectionInfo) -> WireResult<()> {
        self.reader.seek(section.payload_end())?;
        Ok(())
    }
}

//! Bit-level reader with bounded operations.

use crate::error::{BitError, BitResult};
use crate::{VARINT_GROUP_BITS, VARINT_MAX_GROUPS_U32, VARINT_MAX_GROUPS_U64};

/// A bit-level reader for decoding packed binary data.
///
/// All read operations are bounds-checked and return errors on failure.
/// The reader never panics on malformed input.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
    /// One past the last readable bit.
    end: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a new `BitReader` from a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_pos: 0,
            end: data.len().saturating_mul(8),
        }
    }

    /// Returns a reader over `bits` bits starting at absolute position
    /// `start`. Reads past that window fail as if the buffer ended there.
    pub fn window(&self, start: usize, bits: usize) -> BitResult<Self> {
        let end = start.saturating_add(bits);
        if end > self.end {
            return Err(BitError::InvalidPosition {
                position: end,
                limit: self.end,
            });
        }
        Ok(Self {
            data: self.data,
            bit_pos: start,
            end,
        })
    }

    /// Returns the number of bits remaining to read.
    #[must_use]
    pub const fn bits_remaining(&self) -> usize {
        self.end.saturating_sub(self.bit_pos)
    }

    /// Returns `true` if there are no more bits to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }

    /// Returns the current bit position.
    #[must_use]
    pub const fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Reads a single bit as a boolean.
    pub fn read_bool(&mut self) -> BitResult<bool> {
        self.ensure_bits(1)?;
        let byte_idx = self.bit_pos / 8;
        let bit_idx = self.bit_pos % 8;
        let bit = (self.data[byte_idx] >> (7 - bit_idx)) & 1;
        self.bit_pos += 1;
        Ok(bit == 1)
    }

    /// Reads up to 64 bits as an unsigned integer.
    pub fn read_bits(&mut self, bits: u8) -> BitResult<u64> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(0);
        }
        self.ensure_bits(usize::from(bits))?;

        let mut value = 0u64;
        for _ in 0..bits {
            value = (value << 1) | u64::from(self.read_bool()?);
        }
        Ok(value)
    }

    /// Reads 8 bits as a `u8`.
    pub fn read_u8(&mut self) -> BitResult<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Reads 16 bits as a `u16`.
    pub fn read_u16(&mut self) -> BitResult<u16> {
        Ok(self.read_bits(16)? as u16)
    }

    /// Reads 32 bits as a `u32`.
    pub fn read_u32(&mut self) -> BitResult<u32> {
        Ok(self.read_bits(32)? as u32)
    }

    /// Reads 64 bits as a `u64`.
    pub fn read_u64(&mut self) -> BitResult<u64> {
        self.read_bits(64)
    }

    /// Reads a two's complement `i32`.
    pub fn read_i32(&mut self) -> BitResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Reads a two's complement `i64`.
    pub fn read_i64(&mut self) -> BitResult<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Reads an IEEE-754 `f32`.
    pub fn read_f32(&mut self) -> BitResult<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Reads an IEEE-754 `f64`.
    pub fn read_f64(&mut self) -> BitResult<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Reads a bit-packed varint `u32`.
    pub fn read_varu32(&mut self) -> BitResult<u32> {
        let value = self.read_varint(VARINT_MAX_GROUPS_U32)?;
        u32::try_from(value).map_err(|_| BitError::InvalidVarint)
    }

    /// Reads a bit-packed varint `u64`.
    pub fn read_varu64(&mut self) -> BitResult<u64> {
        self.read_varint(VARINT_MAX_GROUPS_U64)
    }

    /// Reads a zigzag varint `i32`.
    pub fn read_vars32(&mut self) -> BitResult<i32> {
        let value = self.read_varu32()?;
        Ok(((value >> 1) as i32) ^ (-((value & 1) as i32)))
    }

    /// Reads a zigzag varint `i64`.
    pub fn read_vars64(&mut self) -> BitResult<i64> {
        let value = self.read_varu64()?;
        Ok(((value >> 1) as i64) ^ (-((value & 1) as i64)))
    }

    /// Skips `bits` bits.
    pub fn skip_bits(&mut self, bits: usize) -> BitResult<()> {
        self.ensure_bits(bits)?;
        self.bit_pos += bits;
        Ok(())
    }

    /// Moves the cursor to an absolute bit position.
    pub fn seek(&mut self, position: usize) -> BitResult<()> {
        if position > self.end {
            return Err(BitError::InvalidPosition {
                position,
                limit: self.end,
            });
        }
        self.bit_pos = position;
        Ok(())
    }

    fn read_varint(&mut self, max_groups: usize) -> BitResult<u64> {
        let mut result = 0u64;
        for group in 0..max_groups {
            let more = self.read_bool()?;
            let bits = self.read_bits(VARINT_GROUP_BITS)?;
            let shift = group * usize::from(VARINT_GROUP_BITS);
            let shifted = bits.checked_shl(shift as u32).ok_or(BitError::InvalidVarint)?;
            if shifted >> shift != bits {
                return Err(BitError::InvalidVarint);
            }
            result |= shifted;
            if !more {
                return Ok(result);
            }
        }
        Err(BitError::InvalidVarint)
    }

    fn ensure_bits(&self, bits: usize) -> BitResult<()> {
        let available = self.bits_remaining();
        if bits > available {
            return Err(BitError::EndOfBuffer {
                requested: bits,
                available,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reader() {
        let reader = BitReader::new(&[]);
        assert!(reader.is_empty());
        assert_eq!(reader.bits_remaining(), 0);
        assert_eq!(reader.bit_position(), 0);
    }

    #[test]
    fn read_from_empty_fails() {
        let mut reader = BitReader::new(&[]);
        let result = reader.read_bool();
        assert!(matches!(result, Err(BitError::EndOfBuffer { .. })));
    }

    #[test]
    fn read_bits_across_bytes() {
        let mut reader = BitReader::new(&[0b1111_0000, 0b0000_1111]);
        assert_eq!(reader.read_bits(12).unwrap(), 0b1111_0000_0000);
        assert_eq!(reader.bits_remaining(), 4);
    }

    #[test]
    fn read_u32_big_endian_bit_order() {
        let mut reader = BitReader::new(&[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(reader.read_u32().unwrap(), 0x1234_5678);
    }

    #[test]
    fn read_bits_too_many_fails_without_consuming() {
        let mut reader = BitReader::new(&[0xFF]);
        assert!(reader.read_bits(9).is_err());
        assert_eq!(reader.bit_position(), 0);
    }

    #[test]
    fn read_varint_unterminated_fails() {
        let mut reader = BitReader::new(&[0xFF; 8]);
        assert!(matches!(
            reader.read_varu32(),
            Err(BitError::InvalidVarint)
        ));
    }

    #[test]
    fn skip_and_seek() {
        let mut reader = BitReader::new(&[0b0000_0001, 0xFF]);
        reader.skip_bits(7).unwrap();
        assert!(reader.read_bool().unwrap());
        reader.seek(0).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert!(reader.seek(17).is_err());
        assert!(reader.skip_bits(9).is_err());
    }

    #[test]
    fn window_stops_at_its_end() {
        let reader = BitReader::new(&[0b1010_1010, 0xFF]);
        let mut window = reader.window(4, 6).unwrap();
        assert_eq!(window.bits_remaining(), 6);
        assert_eq!(window.read_bits(4).unwrap(), 0b1010);
        assert!(matches!(
            window.read_u8(),
            Err(BitError::EndOfBuffer { requested: 8, available: 2 })
        ));
        assert!(window.seek(11).is_err());
        assert!(reader.window(10, 7).is_err());
    }
}

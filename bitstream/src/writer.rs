//! Bit-level writer for encoding packed binary data.

use crate::error::{BitError, BitResult};
use crate::VARINT_GROUP_BITS;

/// A bit-level writer for encoding packed binary data.
///
/// Bits are packed most-significant first. Unlike a pure append-only
/// stream, the writer can [`rewind`](Self::rewind) to an earlier position
/// (discarding everything after it) and [`patch_bits`](Self::patch_bits)
/// a field that was already written, e.g. a length prefix.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_pos: usize,
}

impl BitWriter {
    /// Creates a new empty `BitWriter`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `BitWriter` with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            bit_pos: 0,
        }
    }

    /// Returns the number of bits written so far.
    #[must_use]
    pub const fn bits_written(&self) -> usize {
        self.bit_pos
    }

    /// Returns the current bit position. Alias of [`bits_written`](Self::bits_written).
    #[must_use]
    pub const fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Writes a single bit.
    pub fn write_bool(&mut self, value: bool) {
        let byte_idx = self.bit_pos / 8;
        if byte_idx == self.bytes.len() {
            self.bytes.push(0);
        }
        let mask = 1u8 << (7 - (self.bit_pos % 8));
        if value {
            self.bytes[byte_idx] |= mask;
        } else {
            self.bytes[byte_idx] &= !mask;
        }
        self.bit_pos += 1;
    }

    /// Writes up to 64 bits from an unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits > 64`.
    /// Returns [`BitError::ValueOutOfRange`] if `value` doesn't fit in `bits`.
    pub fn write_bits(&mut self, value: u64, bits: u8) -> BitResult<()> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(());
        }
        if bits < 64 && value >= (1u64 << bits) {
            return Err(BitError::ValueOutOfRange { value, bits });
        }
        for i in (0..bits).rev() {
            self.write_bool((value >> i) & 1 == 1);
        }
        Ok(())
    }

    /// Writes a `u8` as 8 bits (no alignment requirement).
    pub fn write_u8(&mut self, value: u8) {
        self.write_masked(u64::from(value), 8);
    }

    /// Writes a `u16` as 16 bits.
    pub fn write_u16(&mut self, value: u16) {
        self.write_masked(u64::from(value), 16);
    }

    /// Writes a `u32` as 32 bits.
    pub fn write_u32(&mut self, value: u32) {
        self.write_masked(u64::from(value), 32);
    }

    /// Writes a `u64` as 64 bits.
    pub fn write_u64(&mut self, value: u64) {
        self.write_masked(value, 64);
    }

    /// Writes an `i32` as 32 bits (two's complement).
    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    /// Writes an `i64` as 64 bits (two's complement).
    pub fn write_i64(&mut self, value: i64) {
        self.write_u64(value as u64);
    }

    /// Writes an `f32` as its IEEE-754 bit pattern.
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Writes an `f64` as its IEEE-754 bit pattern.
    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    /// Writes a bit-packed varint `u32` (7-bit groups, continuation bit first).
    pub fn write_varu32(&mut self, value: u32) {
        self.write_varu64(u64::from(value));
    }

    /// Writes a bit-packed varint `u64`.
    pub fn write_varu64(&mut self, mut value: u64) {
        loop {
            let group = value & 0x7F;
            value >>= VARINT_GROUP_BITS;
            self.write_bool(value != 0);
            self.write_masked(group, VARINT_GROUP_BITS);
            if value == 0 {
                return;
            }
        }
    }

    /// Writes a zigzag varint `i32`.
    pub fn write_vars32(&mut self, value: i32) {
        let zigzag = ((value << 1) ^ (value >> 31)) as u32;
        self.write_varu32(zigzag);
    }

    /// Writes a zigzag varint `i64`.
    pub fn write_vars64(&mut self, value: i64) {
        self.write_varu64(crate::zigzag64(value));
    }

    /// Discards everything written after `position`.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidPosition`] if `position` is ahead of the
    /// current write position.
    pub fn rewind(&mut self, position: usize) -> BitResult<()> {
        if position > self.bit_pos {
            return Err(BitError::InvalidPosition {
                position,
                limit: self.bit_pos,
            });
        }
        self.bytes.truncate(position.div_ceil(8));
        let partial = position % 8;
        if partial != 0 {
            if let Some(last) = self.bytes.last_mut() {
                *last &= 0xFFu8 << (8 - partial);
            }
        }
        self.bit_pos = position;
        Ok(())
    }

    /// Overwrites `bits` bits starting at `position` without moving the
    /// write cursor. The patched range must already have been written.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidPosition`] if the range extends past the
    /// written data, or the errors of [`write_bits`](Self::write_bits).
    pub fn patch_bits(&mut self, position: usize, value: u64, bits: u8) -> BitResult<()> {
        let end = position.saturating_add(usize::from(bits));
        if end > self.bit_pos {
            return Err(BitError::InvalidPosition {
                position: end,
                limit: self.bit_pos,
            });
        }
        let saved = self.bit_pos;
        self.bit_pos = position;
        let result = self.write_bits(value, bits);
        self.bit_pos = saved;
        result
    }

    /// Returns the bytes written so far. Trailing bits of the last byte are zero.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Finishes writing and returns the byte buffer.
    ///
    /// If the last byte is incomplete, it is padded with zeros on the right.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    /// Finishes writing and appends to the provided buffer.
    pub fn finish_into(mut self, buf: &mut Vec<u8>) {
        buf.append(&mut self.bytes);
    }

    fn write_masked(&mut self, value: u64, bits: u8) {
        for i in (0..bits).rev() {
            self.write_bool((value >> i) & 1 == 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_writer() {
        let writer = BitWriter::new();
        assert_eq!(writer.bits_written(), 0);
        assert!(writer.finish().is_empty());
    }

    #[test]
    fn write_single_bit_true() {
        let mut writer = BitWriter::new();
        writer.write_bool(true);
        assert_eq!(writer.bits_written(), 1);
        // Single bit 1, padded with 7 zeros
        assert_eq!(writer.finish(), vec![0b1000_0000]);
    }

    #[test]
    fn write_full_byte() {
        let mut writer = BitWriter::new();
        for bit in [true, false, true, false, true, false, true, false] {
            writer.write_bool(bit);
        }
        assert_eq!(writer.finish(), vec![0b1010_1010]);
    }

    #[test]
    fn write_bits_across_byte_boundary() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b1111, 4).unwrap();
        writer.write_bits(0b1010_1010, 8).unwrap();
        assert_eq!(writer.finish(), vec![0b1111_1010, 0b1010_0000]);
    }

    #[test]
    fn write_bits_invalid_count() {
        let mut writer = BitWriter::new();
        let result = writer.write_bits(0, 65);
        assert!(matches!(
            result,
            Err(BitError::InvalidBitCount {
                bits: 65,
                max_bits: 64
            })
        ));
    }

    #[test]
    fn write_bits_value_out_of_range() {
        let mut writer = BitWriter::new();
        let result = writer.write_bits(256, 8);
        assert!(matches!(
            result,
            Err(BitError::ValueOutOfRange {
                value: 256,
                bits: 8
            })
        ));
    }

    #[test]
    fn write_u16_is_big_endian_bit_order() {
        let mut writer = BitWriter::new();
        writer.write_u16(0xABCD);
        assert_eq!(writer.finish(), vec![0xAB, 0xCD]);
    }

    #[test]
    fn varint_small_value_is_one_group() {
        let mut writer = BitWriter::new();
        writer.write_varu32(5);
        assert_eq!(writer.bits_written(), 8);
    }

    #[test]
    fn varint_large_value_uses_multiple_groups() {
        let mut writer = BitWriter::new();
        writer.write_varu32(300);
        assert_eq!(writer.bits_written(), 16);
    }

    #[test]
    fn rewind_discards_and_clears_bits() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3).unwrap();
        let mark = writer.bit_position();
        writer.write_u16(0xFFFF);
        writer.rewind(mark).unwrap();
        assert_eq!(writer.bits_written(), 3);
        assert_eq!(writer.as_bytes(), &[0b1010_0000]);
        writer.write_bool(false);
        assert_eq!(writer.finish(), vec![0b1010_0000]);
    }

    #[test]
    fn rewind_past_end_fails() {
        let mut writer = BitWriter::new();
        writer.write_bool(true);
        assert!(matches!(
            writer.rewind(9),
            Err(BitError::InvalidPosition { position: 9, limit: 1 })
        ));
    }

    #[test]
    fn patch_overwrites_without_moving_cursor() {
        let mut writer = BitWriter::new();
        writer.write_bool(true);
        let at = writer.bit_position();
        writer.write_u8(0);
        writer.write_bool(true);
        writer.patch_bits(at, 0xFF, 8).unwrap();
        assert_eq!(writer.bits_written(), 10);
        assert_eq!(writer.finish(), vec![0xFF, 0b1100_0000]);
    }

    #[test]
    fn patch_outside_written_range_fails() {
        let mut writer = BitWriter::new();
        writer.write_u8(1);
        assert!(writer.patch_bits(4, 0, 8).is_err());
    }

    #[test]
    fn finish_into_appends() {
        let mut writer = BitWriter::new();
        writer.write_u8(0xAB);
        let mut buf = vec![0x00, 0x11];
        writer.finish_into(&mut buf);
        assert_eq!(buf, vec![0x00, 0x11, 0xAB]);
    }
}

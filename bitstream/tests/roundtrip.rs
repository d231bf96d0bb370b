use bitstream::{BitReader, BitWriter};

#[test]
fn length_prefixed_section_roundtrip() {
    let mut writer = BitWriter::new();
    writer.write_bool(true);
    let len_at = writer.bit_position();
    writer.write_u16(0);
    let body_start = writer.bit_position();
    writer.write_bits(0b1010, 4).unwrap();
    writer.write_varu32(300);
    let body_len = writer.bit_position() - body_start;
    writer.patch_bits(len_at, body_len as u64, 16).unwrap();
    writer.write_bool(false);
    let bytes = writer.finish();

    let mut reader = BitReader::new(&bytes);
    assert!(reader.read_bool().unwrap());
    let len = reader.read_u16().unwrap() as usize;
    assert_eq!(len, body_len);
    reader.skip_bits(len).unwrap();
    assert!(!reader.read_bool().unwrap());
}

#[test]
fn trial_write_then_rewind_leaves_stream_unchanged() {
    let mut writer = BitWriter::new();
    writer.write_u8(0xA5);
    writer.write_bool(true);
    let before = writer.as_bytes().to_vec();
    let mark = writer.bit_position();

    writer.write_u64(u64::MAX);
    writer.write_vars32(-7);
    writer.rewind(mark).unwrap();

    assert_eq!(writer.bit_position(), 9);
    assert_eq!(writer.as_bytes(), before.as_slice());

    writer.write_i32(-1);
    let bytes = writer.finish();
    let mut reader = BitReader::new(&bytes);
    assert_eq!(reader.read_u8().unwrap(), 0xA5);
    assert!(reader.read_bool().unwrap());
    assert_eq!(reader.read_i32().unwrap(), -1);
}

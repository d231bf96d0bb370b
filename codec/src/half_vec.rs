//! Half-precision vector encoding.

use bitstream::{BitReader, BitWriter};
use half::f16;

use crate::error::{CodecError, CodecResult};
use crate::math::Vec3;

/// Bits occupied by one encoded [`Vec3`].
pub const HALF_VEC3_BITS: usize = 48;

/// Writes `value` as three IEEE-754 binary16 components.
///
/// Values beyond the f16 range saturate to infinity on conversion, so the
/// input is rejected up front instead.
pub fn write_half_vec3(writer: &mut BitWriter, value: Vec3, field: &'static str) -> CodecResult<()> {
    if !value.is_finite() {
        return Err(CodecError::NonFinite { field });
    }
    let max = f16::MAX.to_f32();
    if [value.x, value.y, value.z].iter().any(|c| c.abs() > max) {
        return Err(CodecError::OutOfRange { field });
    }
    for component in [value.x, value.y, value.z] {
        writer.write_u16(f16::from_f32(component).to_bits());
    }
    Ok(())
}

/// Reads three binary16 components written by [`write_half_vec3`].
pub fn read_half_vec3(reader: &mut BitReader<'_>) -> CodecResult<Vec3> {
    let x = f16::from_bits(reader.read_u16()?).to_f32();
    let y = f16::from_bits(reader.read_u16()?).to_f32();
    let z = f16::from_bits(reader.read_u16()?).to_f32();
    Ok(Vec3::new(x, y, z))
}

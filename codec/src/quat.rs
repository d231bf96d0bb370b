//! Quaternion encodings.
//!
//! Two layouts are supported:
//!
//! - **Norm** (52 bits): sign + 16-bit magnitude for each of x, y, z and the
//!   sign of w. The magnitude of w is reconstructed from the unit constraint.
//! - **Compressed** (29 bits): smallest-three. A 2-bit index of the largest
//!   component followed by the other three quantized to 9 bits each in
//!   `[-1/sqrt(2), 1/sqrt(2)]`.

use std::f32::consts::FRAC_1_SQRT_2;

use bitstream::{BitReader, BitWriter};

use crate::error::{CodecError, CodecResult};
use crate::math::Quat;

pub const NORM_QUAT_BITS: usize = 52;
pub const COMPRESSED_QUAT_BITS: usize = 29;

const NORM_COMPONENT_BITS: u8 = 16;
const NORM_COMPONENT_MAX: f32 = ((1u32 << NORM_COMPONENT_BITS) - 1) as f32;

const SMALL_COMPONENT_BITS: u8 = 9;
const SMALL_COMPONENT_MAX: f32 = ((1u32 << SMALL_COMPONENT_BITS) - 1) as f32;

/// Writes a quaternion in the 52-bit norm layout.
pub fn write_quat_norm(writer: &mut BitWriter, q: Quat) -> CodecResult<()> {
    let q = unit(q)?;
    for c in [q.x, q.y, q.z] {
        writer.write_bool(c < 0.0);
        let magnitude = (c.abs().min(1.0) * NORM_COMPONENT_MAX).round() as u64;
        writer.write_bits(magnitude, NORM_COMPONENT_BITS)?;
    }
    writer.write_bool(q.w < 0.0);
    Ok(())
}

/// Reads a quaternion written by [`write_quat_norm`]. The result is normalized.
pub fn read_quat_norm(reader: &mut BitReader<'_>) -> CodecResult<Quat> {
    let mut xyz = [0.0f32; 3];
    for c in &mut xyz {
        let negative = reader.read_bool()?;
        let magnitude = reader.read_bits(NORM_COMPONENT_BITS)? as f32 / NORM_COMPONENT_MAX;
        *c = if negative { -magnitude } else { magnitude };
    }
    let w_negative = reader.read_bool()?;
    let w = (1.0 - xyz.iter().map(|c| c * c).sum::<f32>()).max(0.0).sqrt();
    let w = if w_negative { -w } else { w };
    Ok(Quat::new(xyz[0], xyz[1], xyz[2], w).normalized())
}

/// Writes a quaternion in the 29-bit smallest-three layout.
pub fn write_quat_compressed(writer: &mut BitWriter, q: Quat) -> CodecResult<()> {
    let mut v = unit(q)?.to_array();
    let largest = largest_index(&v);
    if v[largest] < 0.0 {
        for c in &mut v {
            *c = -*c;
        }
    }
    writer.write_bits(largest as u64, 2)?;
    for (i, c) in v.iter().enumerate() {
        if i == largest {
            continue;
        }
        let normalized = (c.clamp(-FRAC_1_SQRT_2, FRAC_1_SQRT_2) + FRAC_1_SQRT_2) / (2.0 * FRAC_1_SQRT_2);
        writer.write_bits((normalized * SMALL_COMPONENT_MAX).round() as u64, SMALL_COMPONENT_BITS)?;
    }
    Ok(())
}

/// Reads a quaternion written by [`write_quat_compressed`]. The result is normalized.
pub fn read_quat_compressed(reader: &mut BitReader<'_>) -> CodecResult<Quat> {
    let largest = reader.read_bits(2)? as usize;
    let mut v = [0.0f32; 4];
    let mut sum_sq = 0.0;
    for (i, c) in v.iter_mut().enumerate() {
        if i == largest {
            continue;
        }
        let raw = reader.read_bits(SMALL_COMPONENT_BITS)? as f32 / SMALL_COMPONENT_MAX;
        *c = raw * 2.0 * FRAC_1_SQRT_2 - FRAC_1_SQRT_2;
        sum_sq += *c * *c;
    }
    v[largest] = (1.0 - sum_sq).max(0.0).sqrt();
    Ok(Quat::from_array(v).normalized())
}

fn unit(q: Quat) -> CodecResult<Quat> {
    if !q.is_finite() {
        return Err(CodecError::NonFinite { field: "orientation" });
    }
    Ok(q.normalized())
}

fn largest_index(v: &[f32; 4]) -> usize {
    let mut best = 0;
    for i in 1..4 {
        if v[i].abs() > v[best].abs() {
            best = i;
        }
    }
    best
}

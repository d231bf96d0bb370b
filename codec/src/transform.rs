//! Pose encoding and client-side acceptance.
//!
//! Layout:
//!
//! ```text
//! absolute: bool
//!   true  -> position: 3 x f64           (192 bits)
//!   false -> offset from base: half vec3 (48 bits)
//! low_precision: bool
//!   true  -> compressed quaternion       (29 bits)
//!   false -> norm quaternion             (52 bits)
//! ```

use bitstream::{BitReader, BitWriter};

use crate::config::CodecConfig;
use crate::error::{CodecError, CodecResult};
use crate::half_vec::{read_half_vec3, write_half_vec3, HALF_VEC3_BITS};
use crate::math::{Mat3, Quat, Vec3d};
use crate::quat::{
    read_quat_compressed, read_quat_norm, write_quat_compressed, write_quat_norm,
    COMPRESSED_QUAT_BITS, NORM_QUAT_BITS,
};

/// Largest per-axis offset sent in the relative form. Past this the f16
/// spacing exceeds the position precision, so the absolute form is used.
pub const MAX_RELATIVE_OFFSET: f64 = 128.0;

/// Encoded size of a transform in bits.
#[must_use]
pub const fn transform_bits(relative: bool, low_precision: bool) -> usize {
    let position = if relative { HALF_VEC3_BITS } else { 3 * 64 };
    let orientation = if low_precision {
        COMPRESSED_QUAT_BITS
    } else {
        NORM_QUAT_BITS
    };
    1 + position + 1 + orientation
}

/// World position and orientation of a body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pose {
    pub position: Vec3d,
    pub orientation: Quat,
}

impl Pose {
    #[must_use]
    pub const fn new(position: Vec3d, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }
}

/// Writes `pose`, relative to `base` when one is given and the offset is small enough.
pub fn write_transform(
    writer: &mut BitWriter,
    pose: &Pose,
    base: Option<Vec3d>,
    low_precision: bool,
) -> CodecResult<()> {
    if !pose.position.is_finite() {
        return Err(CodecError::NonFinite { field: "position" });
    }
    let offset = base
        .map(|base| pose.position - base)
        .filter(|offset| {
            offset.x.abs() <= MAX_RELATIVE_OFFSET
                && offset.y.abs() <= MAX_RELATIVE_OFFSET
                && offset.z.abs() <= MAX_RELATIVE_OFFSET
        });

    match offset {
        Some(offset) => {
            writer.write_bool(false);
            write_half_vec3(writer, offset.as_vec3(), "position offset")?;
        }
        None => {
            writer.write_bool(true);
            writer.write_f64(pose.position.x);
            writer.write_f64(pose.position.y);
            writer.write_f64(pose.position.z);
        }
    }

    writer.write_bool(low_precision);
    if low_precision {
        write_quat_compressed(writer, pose.orientation)
    } else {
        write_quat_norm(writer, pose.orientation)
    }
}

/// Reads a pose written by [`write_transform`].
///
/// A relative position without a `base` is read as an offset from the origin.
pub fn read_transform(reader: &mut BitReader<'_>, base: Option<Vec3d>) -> CodecResult<Pose> {
    let position = if reader.read_bool()? {
        Vec3d::new(reader.read_f64()?, reader.read_f64()?, reader.read_f64()?)
    } else {
        let offset = Vec3d::from(read_half_vec3(reader)?);
        base.unwrap_or(Vec3d::ZERO) + offset
    };
    let orientation = if reader.read_bool()? {
        read_quat_compressed(reader)?
    } else {
        read_quat_norm(reader)?
    };
    Ok(Pose::new(position, orientation))
}

/// Why a decoded pose was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformRejection {
    /// The receiver is authoritative for this body.
    ControlledLocally,
    /// The sender reported no movement and the pose is within epsilon of the current one.
    NotMoving,
    /// The orientation does not form a valid rotation matrix.
    InvalidOrientation,
}

/// Decides whether a received pose replaces `current`.
///
/// On acceptance the position is rounded to one decimal more than the
/// configured precision.
pub fn accept_transform(
    received: &Pose,
    current: &Pose,
    moving_on_server: bool,
    controlled_locally: bool,
    config: &CodecConfig,
) -> Result<Pose, TransformRejection> {
    if controlled_locally {
        return Err(TransformRejection::ControlledLocally);
    }
    let moved = current.position.distance_sq(received.position) > config.position_epsilon_sq;
    if !moving_on_server && !moved {
        return Err(TransformRejection::NotMoving);
    }
    if !received.position.is_finite() || !Mat3::from_quat(received.orientation).is_valid() {
        return Err(TransformRejection::InvalidOrientation);
    }
    Ok(Pose::new(
        received.position.round(config.num_decimal_precision + 1),
        received.orientation,
    ))
}

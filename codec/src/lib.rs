//! Pose and velocity encoding for netsync replication.
//!
//! Everything here is a pure function over a [`bitstream::BitWriter`] or
//! [`bitstream::BitReader`]. There is no per-connection state: the caller
//! decides whether a pose is sent relative to a base position, which
//! orientation precision to use, and whether the body is moving.
//!
//! | Field | Bits |
//! |---|---|
//! | absolute position | 1 + 192 |
//! | relative position | 1 + 48 |
//! | norm orientation | 1 + 52 |
//! | compressed orientation | 1 + 29 |
//! | velocities (moving only) | 96 |

mod config;
mod error;
mod half_vec;
mod math;
mod quat;
mod transform;
mod velocity;

pub use config::CodecConfig;
pub use error::{CodecError, CodecResult};
pub use half_vec::{read_half_vec3, write_half_vec3, HALF_VEC3_BITS};
pub use math::{Mat3, Quat, Vec3, Vec3d};
pub use quat::{
    read_quat_compressed, read_quat_norm, write_quat_compressed, write_quat_norm,
    COMPRESSED_QUAT_BITS, NORM_QUAT_BITS,
};
pub use transform::{
    accept_transform, read_transform, transform_bits, write_transform, Pose, TransformRejection,
    MAX_RELATIVE_OFFSET,
};
pub use velocity::{is_accelerating, is_moving, read_velocities, write_velocities, Velocities};

/// Default number of decimal digits kept for velocities.
pub const NUM_DECIMAL_PRECISION: u8 = 1;

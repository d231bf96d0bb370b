//! Velocity encoding and movement predicates.

use bitstream::{BitReader, BitWriter};

use crate::config::CodecConfig;
use crate::error::CodecResult;
use crate::half_vec::{read_half_vec3, write_half_vec3};
use crate::math::Vec3;

/// Linear and angular velocity of a body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Velocities {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Velocities {
    pub const ZERO: Self = Self {
        linear: Vec3::ZERO,
        angular: Vec3::ZERO,
    };

    #[must_use]
    pub const fn new(linear: Vec3, angular: Vec3) -> Self {
        Self { linear, angular }
    }
}

/// A body is moving unless every velocity component is below the precision.
#[must_use]
pub fn is_moving(velocities: &Velocities, config: &CodecConfig) -> bool {
    let precision = config.precision();
    !(velocities.linear.is_zero(precision) && velocities.angular.is_zero(precision))
}

#[must_use]
pub fn is_accelerating(linear: Vec3, angular: Vec3, config: &CodecConfig) -> bool {
    linear.length_squared() > config.acceleration_epsilon_sq
        || angular.length_squared() > config.acceleration_epsilon_sq
}

/// Writes scaled velocities if `moving`; writes nothing otherwise.
///
/// Components are multiplied by the effective simulation ratio and rounded
/// to the configured precision before the f16 conversion.
pub fn write_velocities(
    writer: &mut BitWriter,
    velocities: &Velocities,
    moving: bool,
    simulation_ratio: f32,
    config: &CodecConfig,
) -> CodecResult<()> {
    if !moving {
        return Ok(());
    }
    let ratio = config.effective_simulation_ratio(simulation_ratio);
    let digits = config.num_decimal_precision;
    write_half_vec3(writer, (velocities.linear * ratio).round(digits), "linear velocity")?;
    write_half_vec3(writer, (velocities.angular * ratio).round(digits), "angular velocity")
}

/// Reads velocities written by [`write_velocities`]. Returns zero when not `moving`.
pub fn read_velocities(
    reader: &mut BitReader<'_>,
    moving: bool,
    simulation_ratio: f32,
    config: &CodecConfig,
) -> CodecResult<Velocities> {
    if !moving {
        return Ok(Velocities::ZERO);
    }
    let ratio = config.effective_simulation_ratio(simulation_ratio);
    let linear = read_half_vec3(reader)? / ratio;
    let angular = read_half_vec3(reader)? / ratio;
    Ok(Velocities::new(linear, angular))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stationary_body_is_not_moving() {
        let config = CodecConfig::default();
        let v = Velocities::new(Vec3::new(0.05, 0.0, -0.09), Vec3::new(0.0, 0.01, 0.0));
        assert!(!is_moving(&v, &config));
        let v = Velocities::new(Vec3::ZERO, Vec3::new(0.0, 0.1, 0.0));
        assert!(is_moving(&v, &config));
    }

    #[test]
    fn acceleration_threshold() {
        let config = CodecConfig::default();
        assert!(!is_accelerating(Vec3::new(0.04, 0.0, 0.0), Vec3::ZERO, &config));
        assert!(is_accelerating(Vec3::ZERO, Vec3::new(0.0, 0.0, 0.06), &config));
    }

    #[test]
    fn not_moving_writes_nothing() {
        let mut writer = BitWriter::new();
        let v = Velocities::new(Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO);
        write_velocities(&mut writer, &v, false, 1.0, &CodecConfig::default()).unwrap();
        assert_eq!(writer.bits_written(), 0);
        let out = read_velocities(&mut BitReader::new(&[]), false, 1.0, &CodecConfig::default()).unwrap();
        assert_eq!(out, Velocities::ZERO);
    }

    #[test]
    fn ratio_is_applied_symmetrically() {
        let config = CodecConfig::default();
        let v = Velocities::new(Vec3::new(4.0, -2.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
        let mut writer = BitWriter::new();
        write_velocities(&mut writer, &v, true, 0.5, &config).unwrap();
        assert_eq!(writer.bits_written(), 96);
        let bytes = writer.finish();

        let mut raw = BitReader::new(&bytes);
        let scaled = read_velocities(&mut raw, true, 1.0, &config).unwrap();
        assert!((scaled.linear.x - 2.0).abs() < 1e-3);

        let out = read_velocities(&mut BitReader::new(&bytes), true, 0.5, &config).unwrap();
        assert!((out.linear.x - 4.0).abs() < 1e-2);
        assert!((out.linear.y + 2.0).abs() < 1e-2);
        assert!((out.angular.y - 1.0).abs() < 1e-2);
    }

    #[test]
    fn velocities_are_rounded_to_precision() {
        let config = CodecConfig::default();
        let v = Velocities::new(Vec3::new(1.04, 0.0, 0.0), Vec3::ZERO);
        let mut writer = BitWriter::new();
        write_velocities(&mut writer, &v, true, 1.0, &config).unwrap();
        let bytes = writer.finish();
        let out = read_velocities(&mut BitReader::new(&bytes), true, 1.0, &config).unwrap();
        assert!((out.linear.x - 1.0).abs() < 1e-3);
    }
}

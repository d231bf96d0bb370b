use bitstream::{BitReader, BitWriter};
use codec::{
    read_transform, read_velocities, write_transform, write_velocities, CodecConfig, Mat3, Pose,
    Quat, Vec3, Vec3d, Velocities,
};
use proptest::prelude::*;

fn quat_strategy() -> impl Strategy<Value = Quat> {
    (-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0)
        .prop_filter("degenerate quaternion", |(x, y, z, w)| {
            x * x + y * y + z * z + w * w > 0.01
        })
        .prop_map(|(x, y, z, w)| Quat::new(x, y, z, w).normalized())
}

fn vec3d_strategy(range: f64) -> impl Strategy<Value = Vec3d> {
    (-range..range, -range..range, -range..range).prop_map(|(x, y, z)| Vec3d::new(x, y, z))
}

fn vec3_strategy(range: f32) -> impl Strategy<Value = Vec3> {
    (-range..range, -range..range, -range..range).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

fn roundtrip(pose: &Pose, base: Option<Vec3d>, low_precision: bool) -> Pose {
    let mut writer = BitWriter::new();
    write_transform(&mut writer, pose, base, low_precision).unwrap();
    let bytes = writer.finish();
    read_transform(&mut BitReader::new(&bytes), base).unwrap()
}

fn max_axis_error(a: Vec3d, b: Vec3d) -> f64 {
    (a.x - b.x).abs().max((a.y - b.y).abs()).max((a.z - b.z).abs())
}

proptest! {
    #[test]
    fn absolute_pose_is_exact_and_orientation_close(
        position in vec3d_strategy(1.0e7),
        orientation in quat_strategy(),
    ) {
        let pose = Pose::new(position, orientation);
        let out = roundtrip(&pose, None, false);
        prop_assert_eq!(out.position, position);
        prop_assert!(out.orientation.similarity(orientation) > 0.9999);
        prop_assert!(Mat3::from_quat(out.orientation).is_valid());
    }

    #[test]
    fn relative_pose_is_within_precision_for_any_base(
        base in vec3d_strategy(1.0e6),
        offset in vec3d_strategy(400.0),
        orientation in quat_strategy(),
    ) {
        let precision = f64::from(CodecConfig::default().precision());
        let pose = Pose::new(base + offset, orientation);
        let out = roundtrip(&pose, Some(base), false);
        prop_assert!(max_axis_error(out.position, pose.position) <= precision);
    }

    #[test]
    fn compressed_orientation_stays_close(orientation in quat_strategy()) {
        let pose = Pose::new(Vec3d::ZERO, orientation);
        let out = roundtrip(&pose, None, true);
        prop_assert!(out.orientation.similarity(orientation) > 0.999);
        prop_assert!(Mat3::from_quat(out.orientation).is_valid());
    }

    #[test]
    fn velocities_survive_ratio_scaling(
        linear in vec3_strategy(50.0),
        angular in vec3_strategy(10.0),
        ratio in 0.1f32..2.0,
    ) {
        let config = CodecConfig::default();
        let v = Velocities::new(linear, angular);
        let mut writer = BitWriter::new();
        write_velocities(&mut writer, &v, true, ratio, &config).unwrap();
        let bytes = writer.finish();
        let out = read_velocities(&mut BitReader::new(&bytes), true, ratio, &config).unwrap();

        let check = |sent: f32, got: f32| {
            let scaled = (sent * ratio).abs();
            let bound = (0.05 + scaled / 1024.0 + 1e-3) / ratio;
            (sent - got).abs() <= bound
        };
        for (sent, got) in [
            (linear.x, out.linear.x),
            (linear.y, out.linear.y),
            (linear.z, out.linear.z),
            (angular.x, out.angular.x),
            (angular.y, out.angular.y),
            (angular.z, out.angular.z),
        ] {
            prop_assert!(check(sent, got), "sent {} got {} at ratio {}", sent, got, ratio);
        }
    }
}

#[test]
fn truncated_pose_is_an_error() {
    let pose = Pose::new(Vec3d::new(1.0, 2.0, 3.0), Quat::IDENTITY);
    let mut writer = BitWriter::new();
    write_transform(&mut writer, &pose, None, false).unwrap();
    let bytes = writer.finish();
    let cut = &bytes[..bytes.len() / 2];
    assert!(read_transform(&mut BitReader::new(cut), None).is_err());
}

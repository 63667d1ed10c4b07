use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A rigid transform: position plus unit rotation. The rotation is
/// renormalized on construction so downstream matrix math can assume it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation: rotation.normalize(),
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn local_to_world(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    pub fn world_to_local(&self) -> Mat4 {
        self.local_to_world().inverse()
    }

    /// Forward axis of this frame (-Z in local space, right-handed).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.position
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }
}

/// Re-expresses `p`'s relationship to frame `a` in frame `b`:
/// `b.local_to_world * a.world_to_local * p.local_to_world`, decomposed back
/// into a pose. This is the single primitive behind both portal-camera
/// placement and traveler teleportation.
pub fn carry_between(a: &Pose, b: &Pose, p: &Pose) -> Pose {
    let m = b.local_to_world() * a.world_to_local() * p.local_to_world();
    let (_, rotation, position) = m.to_scale_rotation_translation();
    Pose::new(position, rotation)
}

/// Rotation applied to world-space directions by [`carry_between`]. Physics
/// collaborators use this to re-express velocity and angular velocity when an
/// object teleports from frame `a` to frame `b`.
pub fn rotation_delta(a: &Pose, b: &Pose) -> Quat {
    (b.rotation * a.rotation.inverse()).normalize()
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use glam::{Quat, Vec3};

    use super::{carry_between, rotation_delta, Pose};

    fn assert_vec3_near(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{a:?} != {b:?}");
    }

    fn assert_pose_near(a: &Pose, b: &Pose) {
        assert_vec3_near(a.position, b.position);
        // q and -q encode the same rotation.
        let dot = a.rotation.dot(b.rotation).abs();
        assert!(dot > 1.0 - 1e-4, "{:?} != {:?}", a.rotation, b.rotation);
    }

    #[test]
    fn new_normalizes_rotation() {
        let raw = Quat::from_xyzw(0.0, 2.0, 0.0, 2.0);
        let pose = Pose::new(Vec3::ZERO, raw);
        assert!((pose.rotation.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn identity_frames_leave_pose_unchanged() {
        let p = Pose::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_y(0.75),
        );
        let carried = carry_between(&Pose::IDENTITY, &Pose::IDENTITY, &p);
        assert_pose_near(&carried, &p);
    }

    #[test]
    fn carry_preserves_relative_offset() {
        let a = Pose::new(Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY);
        let b = Pose::new(
            Vec3::new(0.0, 0.0, -20.0),
            Quat::from_rotation_y(FRAC_PI_2),
        );
        // One unit in front of a (a faces -Z).
        let p = Pose::new(Vec3::new(10.0, 0.0, -1.0), Quat::IDENTITY);

        let carried = carry_between(&a, &b, &p);
        // The same offset expressed in b's frame: b's forward is world -X.
        assert_vec3_near(carried.position, Vec3::new(-1.0, 0.0, -20.0));
        assert_vec3_near(carried.forward(), Vec3::NEG_X);
    }

    #[test]
    fn carry_round_trip_returns_original() {
        let a = Pose::new(
            Vec3::new(3.0, -2.0, 8.0),
            Quat::from_euler(glam::EulerRot::YXZ, 0.9, -0.4, 0.2),
        );
        let b = Pose::new(
            Vec3::new(-14.0, 5.0, 1.0),
            Quat::from_euler(glam::EulerRot::YXZ, -2.1, 0.3, 1.1),
        );
        let p = Pose::new(
            Vec3::new(2.5, -1.5, 7.0),
            Quat::from_rotation_z(0.6),
        );

        let there = carry_between(&a, &b, &p);
        let back = carry_between(&b, &a, &there);
        assert_pose_near(&back, &p);
    }

    #[test]
    fn rotation_delta_matches_carried_direction() {
        let a = Pose::new(Vec3::ZERO, Quat::from_rotation_y(0.3));
        let b = Pose::new(Vec3::new(5.0, 0.0, 0.0), Quat::from_rotation_y(0.3 + PI));

        let delta = rotation_delta(&a, &b);
        // The delta maps a's world axes onto b's.
        assert_vec3_near(delta * a.forward(), b.forward());
        assert_vec3_near(delta * a.up(), b.up());

        // Velocity straight into a comes straight out of b.
        let incoming = -a.forward() * 7.0;
        assert_vec3_near(delta * incoming, -b.forward() * 7.0);
    }

    #[test]
    fn forward_of_identity_is_negative_z() {
        assert_vec3_near(Pose::IDENTITY.forward(), Vec3::NEG_Z);
        assert_vec3_near(Pose::IDENTITY.up(), Vec3::Y);
        assert_vec3_near(Pose::IDENTITY.right(), Vec3::X);
    }
}

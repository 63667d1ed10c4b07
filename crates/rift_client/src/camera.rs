use glam::{EulerRot, Mat4, Quat, Vec3};
use rift_shared::pose::Pose;

/// First-person camera. Position and look angles are written by the player
/// each frame; this struct owns the projection parameters and matrix math.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            fov: 70.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 500.0,
        }
    }
}

impl Camera {
    pub fn rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    pub fn forward_direction(&self) -> Vec3 {
        self.rotation() * Vec3::NEG_Z
    }

    /// The camera as a rigid frame, fed to the portal projector as the
    /// primary viewpoint.
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation())
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward_direction(), Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov,
            self.aspect.max(0.0001),
            self.near.max(0.0001),
            self.far.max(self.near + 0.0001),
        )
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// View-projection for an arbitrary frame with this camera's projection,
    /// used for the secondary (through-portal) viewpoints.
    pub fn view_projection_for_pose(&self, pose: &Pose) -> Mat4 {
        let view = Mat4::look_to_rh(pose.position, pose.forward(), pose.up());
        self.projection_matrix() * view
    }
}

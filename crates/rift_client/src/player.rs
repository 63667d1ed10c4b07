use glam::{EulerRot, Quat, Vec2, Vec3};
use rift_portal::registry::PortalId;
use rift_portal::traveler::Teleportable;
use rift_shared::physics::Aabb;
use rift_shared::pose::Pose;

pub const WALK_SPEED: f32 = 5.0;
pub const RUN_MULTIPLIER: f32 = 1.6;
pub const CROUCH_MULTIPLIER: f32 = 0.5;
pub const GRAVITY: f32 = 18.0;
pub const STICK_TO_GROUND_FORCE: f32 = 2.0;
pub const JUMP_FORCE: f32 = 7.0;
pub const AIR_ACCELERATION: f32 = 12.0;
pub const DASH_IMPULSE: f32 = 9.0;
pub const EYE_HEIGHT: f32 = 1.6;
pub const CROUCH_EYE_OFFSET: f32 = 0.5;
const CROUCH_LERP_SPEED: f32 = 10.0;
const PITCH_LIMIT: f32 = 89.0 * std::f32::consts::PI / 180.0;

/// Movement intent for one fixed tick, sampled from [`crate::input::InputState`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveInput {
    /// Right / forward on the ground plane, each in [-1, 1].
    pub movement: Vec2,
    pub jump: bool,
    pub dash: bool,
    pub run: bool,
    pub crouch: bool,
}

/// First-person walker. `position` is the feet; the camera hangs off
/// [`Player::eye_pose`]. Look angles are stored as yaw/pitch rather than a
/// quaternion so teleports can re-derive them and mouse-look stays gimbal-free.
#[derive(Debug, Clone)]
pub struct Player {
    pub position: Vec3,
    pub velocity: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub grounded: bool,
    crouch_amount: f32,
    in_threshold: bool,
}

impl Player {
    pub fn spawn_at(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            grounded: true,
            crouch_amount: 0.0,
            in_threshold: false,
        }
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    pub fn eye_height(&self) -> f32 {
        EYE_HEIGHT - self.crouch_amount * CROUCH_EYE_OFFSET
    }

    pub fn eye_pose(&self) -> Pose {
        Pose::new(self.position + Vec3::Y * self.eye_height(), self.rotation())
    }

    pub fn in_threshold(&self) -> bool {
        self.in_threshold
    }

    pub fn aabb(&self) -> Aabb {
        let height = self.eye_height() + 0.2;
        Aabb::from_center_half_extents(
            self.position + Vec3::Y * (height * 0.5),
            Vec3::new(0.35, height * 0.5, 0.35),
        )
    }

    pub fn update_look(&mut self, mouse_delta: Vec2, sensitivity: f32) {
        let scale = sensitivity * 0.002;
        self.yaw -= mouse_delta.x * scale;
        self.pitch = (self.pitch - mouse_delta.y * scale).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    fn wish_direction(&self, movement: Vec2) -> Vec3 {
        let forward = Vec3::new(-self.yaw.sin(), 0.0, -self.yaw.cos());
        let right = Vec3::new(self.yaw.cos(), 0.0, -self.yaw.sin());
        (right * movement.x + forward * movement.y).normalize_or_zero()
    }

    pub fn fixed_update(&mut self, input: &MoveInput, dt: f32) {
        let wish = self.wish_direction(input.movement);
        let mut speed = WALK_SPEED;
        if input.run {
            speed *= RUN_MULTIPLIER;
        }
        if input.crouch {
            speed *= CROUCH_MULTIPLIER;
        }

        if self.grounded {
            self.velocity.x = wish.x * speed;
            self.velocity.z = wish.z * speed;
            // Keeps the walker pinned when stepping over small seams.
            self.velocity.y = -STICK_TO_GROUND_FORCE;

            if input.jump {
                self.velocity.y = JUMP_FORCE;
                self.grounded = false;
            }
        } else {
            self.velocity.y -= GRAVITY * dt;
            let mut planar = Vec3::new(self.velocity.x, 0.0, self.velocity.z);
            planar += wish * AIR_ACCELERATION * dt;
            if planar.length() > speed {
                planar = planar.normalize() * speed;
            }
            self.velocity.x = planar.x;
            self.velocity.z = planar.z;
        }

        if input.dash {
            let dir = if wish.length_squared() > 0.0 {
                wish
            } else {
                self.wish_direction(Vec2::new(0.0, 1.0))
            };
            self.velocity += dir * DASH_IMPULSE;
        }

        self.position += self.velocity * dt;

        if self.position.y <= 0.0 {
            self.position.y = 0.0;
            if self.velocity.y < 0.0 {
                self.velocity.y = 0.0;
            }
            self.grounded = true;
        } else {
            self.grounded = false;
        }

        let crouch_target = if input.crouch { 1.0 } else { 0.0 };
        let t = (CROUCH_LERP_SPEED * dt).min(1.0);
        self.crouch_amount += (crouch_target - self.crouch_amount) * t;
    }
}

impl Teleportable for Player {
    fn pose(&self) -> Pose {
        self.eye_pose()
    }

    fn teleport(&mut self, _from: PortalId, _to: PortalId, new_pose: Pose, rotation_delta: Quat) {
        // Roll would accumulate if the carried rotation were stored directly,
        // so project the carried forward axis back onto yaw and pitch.
        let forward = new_pose.forward();
        self.pitch = forward.y.clamp(-1.0, 1.0).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.yaw = (-forward.x).atan2(-forward.z);

        self.position = new_pose.position - Vec3::Y * self.eye_height();
        self.velocity = rotation_delta * self.velocity;
        self.grounded = false;
    }

    fn enter_portal_threshold(&mut self) {
        self.in_threshold = true;
    }

    fn exit_portal_threshold(&mut self) {
        self.in_threshold = false;
    }
}

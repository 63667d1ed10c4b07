use glam::{Quat, Vec2, Vec3};
use rift_portal::registry::{PortalConfigError, PortalId, PortalRegistry, PortalSurface};
use rift_portal::traveler::Teleportable;
use rift_shared::physics::Aabb;
use rift_shared::pose::Pose;

const PROP_GRAVITY: f32 = 18.0;
const PROP_GROUND_FRICTION: f32 = 0.995;

/// How far the threshold region extends out of the surface plane, on both
/// sides. Wide enough that a fast traveler cannot tunnel past it between two
/// fixed ticks.
const TRIGGER_DEPTH: f32 = 0.8;
const TRIGGER_MARGIN: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct LevelBox {
    pub aabb: Aabb,
    pub color: [f32; 3],
}

/// Static geometry plus authored portal placements. The two demo rooms are
/// only connected through the portal pair.
#[derive(Debug, Clone)]
pub struct Level {
    pub boxes: Vec<LevelBox>,
    pub portal_pairs: Vec<(PortalSurface, PortalSurface)>,
    pub spawn: Vec3,
}

impl Level {
    pub fn build_registry(&self) -> Result<PortalRegistry, PortalConfigError> {
        PortalRegistry::from_pairs(self.portal_pairs.clone())
    }
}

/// World-space box a traveler must overlap to be considered "at" the portal.
pub fn portal_trigger_bounds(surface: &PortalSurface) -> Aabb {
    let right = surface.pose.right() * (surface.half_extents.x + TRIGGER_MARGIN);
    let up = surface.pose.up() * (surface.half_extents.y + TRIGGER_MARGIN);
    let normal = surface.pose.forward() * TRIGGER_DEPTH;

    let center = surface.pose.position;
    let mut min = center;
    let mut max = center;
    for sr in [-1.0f32, 1.0] {
        for su in [-1.0f32, 1.0] {
            for sn in [-1.0f32, 1.0] {
                let corner = center + right * sr + up * su + normal * sn;
                min = min.min(corner);
                max = max.max(corner);
            }
        }
    }
    Aabb { min, max }
}

fn room(center: Vec3, half: Vec3, wall_color: [f32; 3], floor_color: [f32; 3]) -> Vec<LevelBox> {
    const WALL: f32 = 0.3;
    let min = center - half;
    let max = center + half;

    vec![
        // Floor and ceiling.
        LevelBox {
            aabb: Aabb {
                min: Vec3::new(min.x, -WALL, min.z),
                max: Vec3::new(max.x, 0.0, max.z),
            },
            color: floor_color,
        },
        LevelBox {
            aabb: Aabb {
                min: Vec3::new(min.x, max.y, min.z),
                max: Vec3::new(max.x, max.y + WALL, max.z),
            },
            color: wall_color,
        },
        // North / south walls.
        LevelBox {
            aabb: Aabb {
                min: Vec3::new(min.x, 0.0, min.z - WALL),
                max: Vec3::new(max.x, max.y, min.z),
            },
            color: wall_color,
        },
        LevelBox {
            aabb: Aabb {
                min: Vec3::new(min.x, 0.0, max.z),
                max: Vec3::new(max.x, max.y, max.z + WALL),
            },
            color: wall_color,
        },
        // West / east walls.
        LevelBox {
            aabb: Aabb {
                min: Vec3::new(min.x - WALL, 0.0, min.z),
                max: Vec3::new(min.x, max.y, max.z),
            },
            color: wall_color,
        },
        LevelBox {
            aabb: Aabb {
                min: Vec3::new(max.x, 0.0, min.z),
                max: Vec3::new(max.x + WALL, max.y, max.z),
            },
            color: wall_color,
        },
    ]
}

/// Two rooms, one portal on each room's north wall. Portal 0 faces into room
/// one; portal 1 faces into its wall, so the carried "behind" half-space of
/// portal 0 opens into room two and travelers emerge walking away from it.
pub fn demo_level() -> Level {
    let room_half = Vec3::new(6.0, 3.5, 6.0);
    let mut boxes = room(
        Vec3::new(0.0, 0.0, 0.0) + Vec3::Y * room_half.y,
        room_half,
        [0.55, 0.57, 0.62],
        [0.35, 0.37, 0.40],
    );
    boxes.extend(room(
        Vec3::new(30.0, 0.0, 0.0) + Vec3::Y * room_half.y,
        room_half,
        [0.62, 0.45, 0.35],
        [0.42, 0.30, 0.24],
    ));
    // A pillar per room for parallax reference.
    boxes.push(LevelBox {
        aabb: Aabb {
            min: Vec3::new(3.0, 0.0, 2.0),
            max: Vec3::new(3.8, 2.6, 2.8),
        },
        color: [0.8, 0.8, 0.85],
    });
    boxes.push(LevelBox {
        aabb: Aabb {
            min: Vec3::new(26.5, 0.0, 1.5),
            max: Vec3::new(27.3, 2.6, 2.3),
        },
        color: [0.85, 0.7, 0.5],
    });

    let portal_a = PortalSurface {
        // Inner face of room one's north wall, facing into the room.
        pose: Pose::new(
            Vec3::new(0.0, 1.6, -5.9),
            Quat::from_rotation_y(std::f32::consts::PI),
        ),
        half_extents: Vec2::new(1.0, 1.5),
    };
    let portal_b = PortalSurface {
        // Room two's north wall, facing into the wall.
        pose: Pose::new(Vec3::new(30.0, 1.6, -5.9), Quat::IDENTITY),
        half_extents: Vec2::new(1.0, 1.5),
    };

    Level {
        boxes,
        portal_pairs: vec![(portal_a, portal_b)],
        spawn: Vec3::new(0.0, 0.0, 3.0),
    }
}

/// A loose physics cube that can ride through portals alongside the player.
#[derive(Debug, Clone)]
pub struct Prop {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub half_extent: f32,
    pub color: [f32; 3],
}

impl Prop {
    pub fn aabb(&self) -> Aabb {
        Aabb::from_center_half_extents(self.position, Vec3::splat(self.half_extent))
    }

    pub fn fixed_update(&mut self, dt: f32) {
        self.velocity.y -= PROP_GRAVITY * dt;
        self.position += self.velocity * dt;

        if self.position.y - self.half_extent < 0.0 {
            self.position.y = self.half_extent;
            self.velocity.y = 0.0;
            self.velocity.x *= PROP_GROUND_FRICTION;
            self.velocity.z *= PROP_GROUND_FRICTION;
        }
    }
}

impl Teleportable for Prop {
    fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    fn teleport(&mut self, _from: PortalId, _to: PortalId, new_pose: Pose, rotation_delta: Quat) {
        self.position = new_pose.position;
        self.rotation = new_pose.rotation;
        self.velocity = rotation_delta * self.velocity;
    }
}

/// One cube sliding toward portal 0 so the pair demonstrates itself.
pub fn demo_props() -> Vec<Prop> {
    vec![
        Prop {
            position: Vec3::new(0.4, 0.25, -2.0),
            rotation: Quat::IDENTITY,
            velocity: Vec3::new(0.0, 0.0, -2.0),
            half_extent: 0.25,
            color: [0.9, 0.55, 0.2],
        },
        Prop {
            position: Vec3::new(-2.0, 0.25, 1.0),
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            half_extent: 0.25,
            color: [0.3, 0.7, 0.9],
        },
    ]
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use rift_portal::registry::PortalId;
    use rift_portal::traveler::Teleportable;
    use rift_shared::physics::signed_plane_offset;

    use super::{demo_level, demo_props, portal_trigger_bounds};

    #[test]
    fn demo_level_registry_validates() {
        let registry = demo_level().build_registry().unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn spawn_is_in_front_of_portal_zero() {
        let level = demo_level();
        let portal = level.portal_pairs[0].0;
        assert!(signed_plane_offset(&portal.pose, level.spawn) > 0.0);
    }

    #[test]
    fn trigger_bounds_straddle_the_surface_plane() {
        let level = demo_level();
        let surface = level.portal_pairs[0].0;
        let bounds = portal_trigger_bounds(&surface);
        let front = surface.pose.position + surface.pose.forward() * 0.5;
        let back = surface.pose.position - surface.pose.forward() * 0.5;
        assert!(bounds.contains_point(front));
        assert!(bounds.contains_point(back));
    }

    #[test]
    fn prop_settles_on_the_floor() {
        let mut prop = demo_props()[1].clone();
        prop.position.y = 2.0;
        for _ in 0..300 {
            prop.fixed_update(1.0 / 60.0);
        }
        assert!((prop.position.y - prop.half_extent).abs() < 1e-4);
        assert_eq!(prop.velocity.y, 0.0);
    }

    #[test]
    fn prop_teleport_rotates_velocity() {
        let mut prop = demo_props()[0].clone();
        let level = demo_level();
        let (a, b) = level.portal_pairs[0];
        let delta = rift_shared::pose::rotation_delta(&a.pose, &b.pose);
        let before = prop.velocity;
        prop.teleport(PortalId(0), PortalId(1), prop.pose(), delta);
        // A half-turn about Y flips the slide direction.
        assert!((prop.velocity - Vec3::new(-before.x, before.y, -before.z)).length() < 1e-4);
    }
}

use glam::{Mat4, Vec3};

use crate::pose::Pose;

#[derive(Debug, Copy, Clone)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }
}

/// Signed distance from `point` to the plane through `pose.position` with
/// normal `pose.forward()`. Positive on the side the plane faces.
pub fn signed_plane_offset(pose: &Pose, point: Vec3) -> f32 {
    (point - pose.position).dot(pose.forward())
}

pub type FrustumPlanes = [[f32; 4]; 6];

pub fn extract_frustum_planes(vp: Mat4) -> FrustumPlanes {
    let m = vp.to_cols_array_2d();
    let row0 = [m[0][0], m[1][0], m[2][0], m[3][0]];
    let row1 = [m[0][1], m[1][1], m[2][1], m[3][1]];
    let row2 = [m[0][2], m[1][2], m[2][2], m[3][2]];
    let row3 = [m[0][3], m[1][3], m[2][3], m[3][3]];

    let planes = [
        [row3[0] + row0[0], row3[1] + row0[1], row3[2] + row0[2], row3[3] + row0[3]],
        [row3[0] - row0[0], row3[1] - row0[1], row3[2] - row0[2], row3[3] - row0[3]],
        [row3[0] + row1[0], row3[1] + row1[1], row3[2] + row1[2], row3[3] + row1[3]],
        [row3[0] - row1[0], row3[1] - row1[1], row3[2] - row1[2], row3[3] - row1[3]],
        [row3[0] + row2[0], row3[1] + row2[1], row3[2] + row2[2], row3[3] + row2[3]],
        [row3[0] - row2[0], row3[1] - row2[1], row3[2] - row2[2], row3[3] - row2[3]],
    ];

    let mut result = [[0.0f32; 4]; 6];
    for (i, p) in planes.iter().enumerate() {
        let len = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
        if len > 0.0001 {
            result[i] = [p[0] / len, p[1] / len, p[2] / len, p[3] / len];
        }
    }
    result
}

pub fn sphere_in_frustum(planes: &FrustumPlanes, center: Vec3, radius: f32) -> bool {
    for plane in planes {
        let distance = plane[0] * center.x + plane[1] * center.y + plane[2] * center.z + plane[3];
        if distance < -radius {
            return false;
        }
    }
    true
}

pub fn aabb_in_frustum(planes: &FrustumPlanes, aabb: &Aabb) -> bool {
    let center = aabb.center();
    let half = aabb.half_extents();
    for plane in planes {
        let normal = Vec3::new(plane[0], plane[1], plane[2]);
        let distance = normal.dot(center) + plane[3];
        let projected_radius = half.x * plane[0].abs() + half.y * plane[1].abs() + half.z * plane[2].abs();
        if distance < -projected_radius {
            return false;
        }
    }
    true
}

pub fn safe_normalize(v: Vec3, fallback: Vec3) -> Vec3 {
    let n = v.normalize_or_zero();
    if n.length_squared() > 0.0 {
        n
    } else {
        fallback
    }
}

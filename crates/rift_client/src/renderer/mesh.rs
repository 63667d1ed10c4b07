use bytemuck::{Pod, Zeroable};
use rift_shared::physics::Aabb;

use crate::level::Level;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct LevelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

impl LevelVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LevelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: (2 * std::mem::size_of::<[f32; 3]>()) as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[derive(Debug, Default)]
pub struct LevelMesh {
    pub vertices: Vec<LevelVertex>,
    pub indices: Vec<u32>,
}

impl LevelMesh {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

pub fn build_level_mesh(level: &Level) -> LevelMesh {
    let mut mesh = LevelMesh::default();
    for level_box in &level.boxes {
        push_box(&mut mesh, &level_box.aabb, level_box.color);
    }
    mesh
}

/// Emits the six faces of an axis-aligned box with outward normals, CCW when
/// seen from outside.
pub fn push_box(mesh: &mut LevelMesh, aabb: &Aabb, color: [f32; 3]) {
    let (lo, hi) = (aabb.min, aabb.max);
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        (
            [1.0, 0.0, 0.0],
            [
                [hi.x, lo.y, hi.z],
                [hi.x, lo.y, lo.z],
                [hi.x, hi.y, lo.z],
                [hi.x, hi.y, hi.z],
            ],
        ),
        (
            [-1.0, 0.0, 0.0],
            [
                [lo.x, lo.y, lo.z],
                [lo.x, lo.y, hi.z],
                [lo.x, hi.y, hi.z],
                [lo.x, hi.y, lo.z],
            ],
        ),
        (
            [0.0, 1.0, 0.0],
            [
                [lo.x, hi.y, hi.z],
                [hi.x, hi.y, hi.z],
                [hi.x, hi.y, lo.z],
                [lo.x, hi.y, lo.z],
            ],
        ),
        (
            [0.0, -1.0, 0.0],
            [
                [lo.x, lo.y, lo.z],
                [hi.x, lo.y, lo.z],
                [hi.x, lo.y, hi.z],
                [lo.x, lo.y, hi.z],
            ],
        ),
        (
            [0.0, 0.0, 1.0],
            [
                [lo.x, lo.y, hi.z],
                [hi.x, lo.y, hi.z],
                [hi.x, hi.y, hi.z],
                [lo.x, hi.y, hi.z],
            ],
        ),
        (
            [0.0, 0.0, -1.0],
            [
                [hi.x, lo.y, lo.z],
                [lo.x, lo.y, lo.z],
                [lo.x, hi.y, lo.z],
                [hi.x, hi.y, lo.z],
            ],
        ),
    ];

    for (normal, corners) in faces {
        let base = mesh.vertices.len() as u32;
        for position in corners {
            mesh.vertices.push(LevelVertex {
                position,
                normal,
                color,
            });
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use rift_shared::physics::Aabb;

    use super::{build_level_mesh, push_box, LevelMesh};
    use crate::level::demo_level;

    #[test]
    fn box_emits_six_faces() {
        let mut mesh = LevelMesh::default();
        push_box(
            &mut mesh,
            &Aabb {
                min: Vec3::ZERO,
                max: Vec3::ONE,
            },
            [1.0, 1.0, 1.0],
        );
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
    }

    #[test]
    fn demo_level_mesh_is_nonempty_and_indexable() {
        let mesh = build_level_mesh(&demo_level());
        assert!(!mesh.is_empty());
        let max_index = mesh.indices.iter().copied().max().unwrap_or(0);
        assert!((max_index as usize) < mesh.vertices.len());
    }
}

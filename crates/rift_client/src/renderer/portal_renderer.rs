use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use rift_portal::registry::{PortalId, PortalRegistry};
use rift_shared::physics::safe_normalize;
use wgpu::util::DeviceExt;

use crate::renderer::CameraUniform;

const PORTAL_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const PORTAL_SURFACE_OFFSET: f32 = 0.01;
const FALLBACK_COLOR: [f32; 4] = [1.0, 0.0, 1.0, 1.0];

const PORTAL_TINTS: [[f32; 4]; 4] = [
    [1.0, 165.0 / 255.0, 0.0, 1.0],
    [0.0, 130.0 / 255.0, 1.0, 1.0],
    [0.2, 1.0, 0.4, 1.0],
    [1.0, 0.3, 0.5, 1.0],
];

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct SurfaceVertex {
    position: [f32; 3],
}

impl SurfaceVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<SurfaceVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            }],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct SurfaceParamsUniform {
    model: [[f32; 4]; 4],
    tint: [f32; 4],
    has_view: f32,
    fallback: f32,
    _padding: [f32; 2],
}

struct ViewTextures {
    size: (u32, u32),
    _color_textures: [wgpu::Texture; 2],
    color_views: [wgpu::TextureView; 2],
    sample_bind_groups: [wgpu::BindGroup; 2],
    _depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    /// Index of the most recently written color target. `begin_view_write`
    /// flips it, so mid-pass it names the texture under write.
    written: usize,
}

struct PortalSlot {
    params_buffer: wgpu::Buffer,
    params_bind_group: wgpu::BindGroup,
    view: Option<ViewTextures>,
    bound_source: Option<PortalId>,
    visible: bool,
    params: SurfaceParamsUniform,
}

/// Owns the per-portal view textures and the screen-space quad pipeline.
///
/// Each portal keeps two color targets and alternates between them, so a
/// recursion pass can sample the previous level's output while writing the
/// next without binding a texture to both ends of one render pass.
pub struct PortalSurfaceRenderer {
    pipeline: wgpu::RenderPipeline,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    params_bind_group_layout: wgpu::BindGroupLayout,
    camera_bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    quad_vertex_buffer: wgpu::Buffer,
    quad_index_buffer: wgpu::Buffer,
    quad_index_count: u32,
    placeholder_bind_group: wgpu::BindGroup,
    surface_format: wgpu::TextureFormat,
    slots: Vec<PortalSlot>,
    view_cameras: Vec<(wgpu::Buffer, wgpu::BindGroup)>,
    next_view_camera: usize,
}

impl PortalSurfaceRenderer {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Portal Surface Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/../../assets/shaders/portal_surface.wgsl"
                ))
                .into(),
            ),
        });

        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Portal Texture Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let params_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Portal Params Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Portal View Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Portal Surface Pipeline Layout"),
            bind_group_layouts: &[
                camera_bind_group_layout,
                &texture_bind_group_layout,
                &params_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Portal Surface Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[SurfaceVertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: PORTAL_DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let quad_vertices = [
            SurfaceVertex {
                position: [-1.0, -1.0, 0.0],
            },
            SurfaceVertex {
                position: [1.0, -1.0, 0.0],
            },
            SurfaceVertex {
                position: [1.0, 1.0, 0.0],
            },
            SurfaceVertex {
                position: [-1.0, 1.0, 0.0],
            },
        ];
        let quad_indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Portal Surface Vertex Buffer"),
            contents: bytemuck::cast_slice(&quad_vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Portal Surface Index Buffer"),
            contents: bytemuck::cast_slice(&quad_indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        // Bound while a portal has no rendered view yet; the shader falls
        // back to the tint in that case, so the content never shows.
        let placeholder_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Portal Placeholder Texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: surface_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let placeholder_view =
            placeholder_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let placeholder_bind_group = create_sample_bind_group(
            device,
            &texture_bind_group_layout,
            &placeholder_view,
            &sampler,
            "Portal Placeholder Bind Group",
        );

        Self {
            pipeline,
            texture_bind_group_layout,
            params_bind_group_layout,
            camera_bind_group_layout: camera_bind_group_layout.clone(),
            sampler,
            quad_vertex_buffer,
            quad_index_buffer,
            quad_index_count: quad_indices.len() as u32,
            placeholder_bind_group,
            surface_format,
            slots: Vec::new(),
            view_cameras: Vec::new(),
            next_view_camera: 0,
        }
    }

    pub fn ensure_portals(&mut self, device: &wgpu::Device, count: usize) {
        while self.slots.len() < count {
            let index = self.slots.len();
            let params = SurfaceParamsUniform {
                model: Mat4::IDENTITY.to_cols_array_2d(),
                tint: PORTAL_TINTS[index % PORTAL_TINTS.len()],
                has_view: 0.0,
                fallback: 0.0,
                _padding: [0.0; 2],
            };
            let label = format!("Portal Params Buffer {index}");
            let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&label),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let group_label = format!("Portal Params Bind Group {index}");
            let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&group_label),
                layout: &self.params_bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                }],
            });
            self.slots.push(PortalSlot {
                params_buffer,
                params_bind_group,
                view: None,
                bound_source: None,
                visible: true,
                params,
            });
        }
    }

    /// Writes this frame's quad params. Call once per frame before any pass.
    pub fn prepare(&mut self, queue: &wgpu::Queue, registry: &PortalRegistry) {
        self.next_view_camera = 0;
        for portal in registry.portals() {
            let Some(slot) = self.slots.get_mut(portal.id.index()) else {
                continue;
            };
            slot.params = SurfaceParamsUniform {
                model: surface_model_matrix(&portal.surface).to_cols_array_2d(),
                tint: PORTAL_TINTS[portal.id.index() % PORTAL_TINTS.len()],
                has_view: if slot.bound_source.is_some() { 1.0 } else { 0.0 },
                fallback: 0.0,
                _padding: [0.0; 2],
            };
            queue.write_buffer(&slot.params_buffer, 0, bytemuck::bytes_of(&slot.params));
        }
    }

    pub fn view_resolution(&self, portal: PortalId) -> Option<(u32, u32)> {
        self.slots
            .get(portal.index())
            .and_then(|slot| slot.view.as_ref())
            .map(|view| view.size)
    }

    pub fn recreate_view(&mut self, device: &wgpu::Device, portal: PortalId, width: u32, height: u32) {
        let Some(slot) = self.slots.get_mut(portal.index()) else {
            return;
        };
        // Dropping the old textures releases them before the replacements
        // are created.
        slot.view = None;
        slot.view = Some(create_view_textures(
            device,
            width,
            height,
            self.surface_format,
            &self.texture_bind_group_layout,
            &self.sampler,
            portal,
        ));
    }

    pub fn set_surface_visible(&mut self, portal: PortalId, visible: bool) {
        if let Some(slot) = self.slots.get_mut(portal.index()) {
            slot.visible = visible;
        }
    }

    pub fn bind_view(&mut self, queue: &wgpu::Queue, source: PortalId, surface: PortalId) {
        if let Some(slot) = self.slots.get_mut(surface.index()) {
            slot.bound_source = Some(source);
            if slot.params.has_view != 1.0 {
                slot.params.has_view = 1.0;
                queue.write_buffer(&slot.params_buffer, 0, bytemuck::bytes_of(&slot.params));
            }
        }
    }

    pub fn paint_fallback(&mut self, queue: &wgpu::Queue, surface: PortalId) {
        if let Some(slot) = self.slots.get_mut(surface.index()) {
            slot.params.fallback = 1.0;
            queue.write_buffer(&slot.params_buffer, 0, bytemuck::bytes_of(&slot.params));
        }
    }

    /// Flips the portal's ping-pong target and returns the (color, depth)
    /// attachment views for the pass about to be recorded.
    pub fn begin_view_write(
        &mut self,
        portal: PortalId,
    ) -> Option<(wgpu::TextureView, wgpu::TextureView)> {
        let view = self.slots.get_mut(portal.index())?.view.as_mut()?;
        view.written = 1 - view.written;
        Some((
            view.color_views[view.written].clone(),
            view.depth_view.clone(),
        ))
    }

    /// A distinct camera uniform per view pass; a shared buffer would be
    /// stomped by later recursion levels before the single frame submit.
    pub(crate) fn next_view_camera(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        uniform: &CameraUniform,
    ) -> wgpu::BindGroup {
        if self.next_view_camera == self.view_cameras.len() {
            let index = self.view_cameras.len();
            let label = format!("Portal View Camera Buffer {index}");
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&label),
                contents: bytemuck::bytes_of(uniform),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let group_label = format!("Portal View Camera Bind Group {index}");
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&group_label),
                layout: &self.camera_bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            self.view_cameras.push((buffer, bind_group));
        } else {
            let (buffer, _) = &self.view_cameras[self.next_view_camera];
            queue.write_buffer(buffer, 0, bytemuck::bytes_of(uniform));
        }

        let bind_group = self.view_cameras[self.next_view_camera].1.clone();
        self.next_view_camera += 1;
        bind_group
    }

    /// Draws every visible portal quad. `writing` names the portal whose view
    /// texture is the current render attachment, so quads sourcing it sample
    /// its other ping-pong half.
    pub fn draw_surfaces(
        &self,
        render_pass: &mut wgpu::RenderPass<'_>,
        camera_bind_group: &wgpu::BindGroup,
        writing: Option<PortalId>,
    ) -> u32 {
        let mut draw_calls = 0;
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, camera_bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.quad_index_buffer.slice(..), wgpu::IndexFormat::Uint16);

        for slot in &self.slots {
            if !slot.visible {
                continue;
            }

            let sample_bind_group = slot
                .bound_source
                .and_then(|source| {
                    let view = self.slots.get(source.index())?.view.as_ref()?;
                    let index = if writing == Some(source) {
                        1 - view.written
                    } else {
                        view.written
                    };
                    Some(&view.sample_bind_groups[index])
                })
                .unwrap_or(&self.placeholder_bind_group);

            render_pass.set_bind_group(1, sample_bind_group, &[]);
            render_pass.set_bind_group(2, &slot.params_bind_group, &[]);
            render_pass.draw_indexed(0..self.quad_index_count, 0, 0..1);
            draw_calls += 1;
        }

        draw_calls
    }
}

fn surface_model_matrix(surface: &rift_portal::registry::PortalSurface) -> Mat4 {
    let normal = safe_normalize(surface.pose.forward(), glam::Vec3::Z);
    let right = safe_normalize(surface.pose.right(), glam::Vec3::X)
        * surface.half_extents.x.max(0.001);
    let up = safe_normalize(surface.pose.up(), glam::Vec3::Y) * surface.half_extents.y.max(0.001);
    let translation = surface.pose.position + normal * PORTAL_SURFACE_OFFSET;

    Mat4::from_cols(
        right.extend(0.0),
        up.extend(0.0),
        normal.extend(0.0),
        translation.extend(1.0),
    )
}

fn create_sample_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    texture_view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(texture_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn create_view_textures(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    color_format: wgpu::TextureFormat,
    texture_bind_group_layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    portal: PortalId,
) -> ViewTextures {
    let size = wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    };

    let color_textures: [wgpu::Texture; 2] = std::array::from_fn(|half| {
        let label = format!("Portal View Color Texture {portal} {half}");
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: color_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        })
    });
    let color_views: [wgpu::TextureView; 2] = std::array::from_fn(|half| {
        color_textures[half].create_view(&wgpu::TextureViewDescriptor::default())
    });
    let sample_bind_groups: [wgpu::BindGroup; 2] = std::array::from_fn(|half| {
        let label = format!("Portal View Sample Bind Group {portal} {half}");
        create_sample_bind_group(
            device,
            texture_bind_group_layout,
            &color_views[half],
            sampler,
            &label,
        )
    });

    let depth_label = format!("Portal View Depth Texture {portal}");
    let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&depth_label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: PORTAL_DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

    ViewTextures {
        size: (size.width, size.height),
        _color_textures: color_textures,
        color_views,
        sample_bind_groups,
        _depth_texture: depth_texture,
        depth_view,
        written: 0,
    }
}

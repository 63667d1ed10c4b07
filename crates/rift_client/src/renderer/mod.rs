pub mod mesh;
pub mod pipeline;
pub mod portal_renderer;
pub mod prop_renderer;

use std::fmt;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use rift_portal::projector::{PortalViewTarget, RenderProjector};
use rift_portal::registry::{PortalConfigError, PortalId, PortalRegistry};
use rift_shared::physics::extract_frustum_planes;
use rift_shared::pose::Pose;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::camera::Camera;
use crate::level::{Level, Prop};
use crate::renderer::mesh::build_level_mesh;
use crate::renderer::pipeline::LevelPipeline;
use crate::renderer::portal_renderer::PortalSurfaceRenderer;
use crate::renderer::prop_renderer::PropRenderer;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SKY_CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.05,
    g: 0.07,
    b: 0.11,
    a: 1.0,
};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    camera_pos: [f32; 4],
}

impl CameraUniform {
    fn new(view_proj: glam::Mat4, camera_pos: glam::Vec3) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            camera_pos: [camera_pos.x, camera_pos.y, camera_pos.z, 0.0],
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderFrameStats {
    pub portal_view_passes: u32,
    pub portal_draw_calls: u32,
}

#[derive(Debug)]
struct DepthTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthTexture {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Rift Depth Texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[derive(Debug)]
pub enum RendererInitError {
    CreateSurface(wgpu::CreateSurfaceError),
    RequestAdapter(wgpu::RequestAdapterError),
    RequestDevice(wgpu::RequestDeviceError),
    UnsupportedSurface,
}

impl fmt::Display for RendererInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateSurface(err) => write!(f, "failed to create surface: {err}"),
            Self::RequestAdapter(err) => write!(f, "failed to request adapter: {err}"),
            Self::RequestDevice(err) => write!(f, "failed to request device: {err}"),
            Self::UnsupportedSurface => write!(f, "adapter does not support this surface"),
        }
    }
}

impl std::error::Error for RendererInitError {}

#[derive(Debug)]
pub enum RenderFrameError {
    Surface(wgpu::SurfaceError),
    PortalConfig(PortalConfigError),
}

impl fmt::Display for RenderFrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surface(err) => write!(f, "failed to acquire surface frame: {err}"),
            Self::PortalConfig(err) => write!(f, "portal configuration rejected: {err}"),
        }
    }
}

impl std::error::Error for RenderFrameError {}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    depth_texture: DepthTexture,
    level_pipeline: LevelPipeline,
    portal_surfaces: PortalSurfaceRenderer,
    prop_renderer: PropRenderer,
    camera_uniform_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    level_vertex_buffer: wgpu::Buffer,
    level_index_buffer: wgpu::Buffer,
    level_index_count: u32,
    /// Portal view textures are sized at this fraction of the display
    /// resolution.
    view_scale: f32,
    last_frame_stats: RenderFrameStats,
}

impl Renderer {
    pub fn new(
        window: Arc<Window>,
        level: &Level,
        view_scale: f32,
    ) -> Result<Self, RendererInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(RendererInitError::CreateSurface)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(RendererInitError::RequestAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Rift Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(RendererInitError::RequestDevice)?;

        let initial_size = window.inner_size();
        let surface_config = surface
            .get_default_config(&adapter, initial_size.width.max(1), initial_size.height.max(1))
            .ok_or(RendererInitError::UnsupportedSurface)?;

        surface.configure(&device, &surface_config);

        let level_pipeline = LevelPipeline::new(&device, surface_config.format, DEPTH_FORMAT);
        let portal_surfaces = PortalSurfaceRenderer::new(
            &device,
            surface_config.format,
            &level_pipeline.camera_bind_group_layout,
        );
        let prop_renderer = PropRenderer::new(
            &device,
            surface_config.format,
            DEPTH_FORMAT,
            &level_pipeline.camera_bind_group_layout,
        );

        let initial_uniform = CameraUniform::new(glam::Mat4::IDENTITY, glam::Vec3::ZERO);
        let camera_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Uniform Buffer"),
            contents: bytemuck::bytes_of(&initial_uniform),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &level_pipeline.camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_uniform_buffer.as_entire_binding(),
            }],
        });

        let level_mesh = build_level_mesh(level);
        let level_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Level Vertex Buffer"),
            contents: bytemuck::cast_slice(&level_mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let level_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Level Index Buffer"),
            contents: bytemuck::cast_slice(&level_mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let depth_texture = DepthTexture::new(&device, surface_config.width, surface_config.height);

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            depth_texture,
            level_pipeline,
            portal_surfaces,
            prop_renderer,
            camera_uniform_buffer,
            camera_bind_group,
            level_vertex_buffer,
            level_index_buffer,
            level_index_count: level_mesh.indices.len() as u32,
            view_scale: view_scale.clamp(0.25, 1.0),
            last_frame_stats: RenderFrameStats::default(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_texture = DepthTexture::new(&self.device, width, height);
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.surface_config.width.max(1) as f32 / self.surface_config.height.max(1) as f32
    }

    pub fn last_frame_stats(&self) -> RenderFrameStats {
        self.last_frame_stats
    }

    pub fn render_frame<'a>(
        &mut self,
        camera: &Camera,
        registry: &PortalRegistry,
        projector: &RenderProjector,
        props: impl Iterator<Item = &'a Prop>,
    ) -> Result<RenderFrameStats, RenderFrameError> {
        let frame = self
            .surface
            .get_current_texture()
            .map_err(RenderFrameError::Surface)?;
        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let view_proj = camera.view_projection_matrix();
        let frustum = extract_frustum_planes(view_proj);
        let uniform = CameraUniform::new(view_proj, camera.position);
        self.queue
            .write_buffer(&self.camera_uniform_buffer, 0, bytemuck::bytes_of(&uniform));

        self.prop_renderer.update(&self.queue, props);
        self.portal_surfaces.ensure_portals(&self.device, registry.len());
        self.portal_surfaces.prepare(&self.queue, registry);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Rift Command Encoder"),
            });

        let view_resolution = (
            ((self.surface_config.width as f32 * self.view_scale).round() as u32).max(1),
            ((self.surface_config.height as f32 * self.view_scale).round() as u32).max(1),
        );

        let mut stats = RenderFrameStats::default();
        {
            let mut portal_pass = PortalPass {
                device: &self.device,
                queue: &self.queue,
                encoder: &mut encoder,
                portal_surfaces: &mut self.portal_surfaces,
                level_pipeline: &self.level_pipeline,
                level_vertex_buffer: &self.level_vertex_buffer,
                level_index_buffer: &self.level_index_buffer,
                level_index_count: self.level_index_count,
                prop_renderer: &self.prop_renderer,
                camera,
            };
            stats.portal_view_passes = projector
                .render_all(
                    registry,
                    &camera.pose(),
                    &frustum,
                    view_resolution,
                    &mut portal_pass,
                )
                .map_err(RenderFrameError::PortalConfig)?;
        }

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Rift Opaque Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(SKY_CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(self.level_pipeline.pipeline());
            render_pass.set_bind_group(0, &self.camera_bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.level_vertex_buffer.slice(..));
            render_pass
                .set_index_buffer(self.level_index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..self.level_index_count, 0, 0..1);
            self.prop_renderer
                .render(&mut render_pass, &self.camera_bind_group);
        }

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Rift Portal Surface Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            stats.portal_draw_calls =
                self.portal_surfaces
                    .draw_surfaces(&mut render_pass, &self.camera_bind_group, None);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        self.last_frame_stats = stats;
        Ok(stats)
    }
}

/// One frame's worth of GPU plumbing handed to the projector. The projector
/// decides which portals to render and from where; this records the actual
/// off-screen passes.
struct PortalPass<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    encoder: &'a mut wgpu::CommandEncoder,
    portal_surfaces: &'a mut PortalSurfaceRenderer,
    level_pipeline: &'a LevelPipeline,
    level_vertex_buffer: &'a wgpu::Buffer,
    level_index_buffer: &'a wgpu::Buffer,
    level_index_count: u32,
    prop_renderer: &'a PropRenderer,
    camera: &'a Camera,
}

impl PortalViewTarget for PortalPass<'_> {
    fn view_resolution(&self, portal: PortalId) -> Option<(u32, u32)> {
        self.portal_surfaces.view_resolution(portal)
    }

    fn recreate_view(&mut self, portal: PortalId, width: u32, height: u32) {
        self.portal_surfaces
            .recreate_view(self.device, portal, width, height);
    }

    fn set_surface_visible(&mut self, portal: PortalId, visible: bool) {
        self.portal_surfaces.set_surface_visible(portal, visible);
    }

    fn render_view(&mut self, portal: PortalId, view: &Pose) {
        let Some((color_view, depth_view)) = self.portal_surfaces.begin_view_write(portal) else {
            return;
        };
        let uniform =
            CameraUniform::new(self.camera.view_projection_for_pose(view), view.position);
        let camera_bind_group =
            self.portal_surfaces
                .next_view_camera(self.device, self.queue, &uniform);

        let mut render_pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Portal View Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(SKY_CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(self.level_pipeline.pipeline());
        render_pass.set_bind_group(0, &camera_bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.level_vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.level_index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(0..self.level_index_count, 0, 0..1);
        self.prop_renderer.render(&mut render_pass, &camera_bind_group);
        // Nested portal quads sample the previous recursion level here.
        self.portal_surfaces
            .draw_surfaces(&mut render_pass, &camera_bind_group, Some(portal));
    }

    fn bind_view(&mut self, source: PortalId, surface: PortalId) {
        self.portal_surfaces.bind_view(self.queue, source, surface);
    }

    fn paint_fallback(&mut self, surface: PortalId) {
        self.portal_surfaces.paint_fallback(self.queue, surface);
    }
}

use rift_shared::physics::{aabb_in_frustum, FrustumPlanes};
use rift_shared::pose::{carry_between, Pose};
use tracing::trace;

use crate::registry::{PortalConfigError, PortalId, PortalRegistry};

pub const MAX_RECURSION_DEPTH: u32 = 8;

/// GPU-side seam for the projector. The core decides *what* to render and in
/// which order; the implementor owns textures, pipelines and passes. Each
/// portal owns one view texture which the *linked* portal's display surface
/// samples.
pub trait PortalViewTarget {
    /// Size of the portal's view texture, or `None` before first use.
    fn view_resolution(&self, portal: PortalId) -> Option<(u32, u32)>;

    /// Creates (or releases and recreates) the portal's view texture.
    fn recreate_view(&mut self, portal: PortalId, width: u32, height: u32);

    /// Toggles the portal's own display quad. The quad is hidden while the
    /// portal's camera renders so it cannot occlude its own view.
    fn set_surface_visible(&mut self, portal: PortalId, visible: bool);

    /// Renders the scene from `view` into the portal's view texture.
    fn render_view(&mut self, portal: PortalId, view: &Pose);

    /// Binds `source`'s view texture as the color source of `surface`'s
    /// display quad.
    fn bind_view(&mut self, source: PortalId, surface: PortalId);

    /// Diagnostic tint for a surface whose view was skipped this frame.
    fn paint_fallback(&mut self, _surface: PortalId) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered { passes: u32 },
    /// The linked surface is outside the primary frustum; the expensive
    /// render was skipped and the view texture untouched. Not an error.
    Culled,
}

/// Computes the secondary viewpoint for each portal and drives its off-screen
/// render. One instance serves every portal in the registry.
pub struct RenderProjector {
    recursion_depth: u32,
    diagnostics: bool,
}

impl RenderProjector {
    pub fn new(recursion_depth: u32) -> Self {
        Self {
            recursion_depth: recursion_depth.clamp(1, MAX_RECURSION_DEPTH),
            diagnostics: false,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn recursion_depth(&self) -> u32 {
        self.recursion_depth
    }

    /// Renders one portal's view for this frame. Called once per portal,
    /// after crossing detection has settled, immediately before the primary
    /// view is drawn.
    pub fn render(
        &self,
        registry: &PortalRegistry,
        id: PortalId,
        primary_view: &Pose,
        frustum: &FrustumPlanes,
        resolution: (u32, u32),
        target: &mut dyn PortalViewTarget,
    ) -> Result<RenderOutcome, PortalConfigError> {
        let portal = registry.get(id)?;
        let linked = registry.linked(id)?;

        // This portal's view is displayed on the linked portal's quad, so
        // that quad's bounds decide whether the render is worth doing.
        if !aabb_in_frustum(frustum, &linked.surface.bounds()) {
            trace!("{id}: linked surface culled, skipping view render");
            if self.diagnostics {
                target.paint_fallback(linked.id);
            }
            return Ok(RenderOutcome::Culled);
        }

        target.set_surface_visible(id, false);

        let width = resolution.0.max(1);
        let height = resolution.1.max(1);
        if target.view_resolution(id) != Some((width, height)) {
            target.recreate_view(id, width, height);
        }

        // The secondary camera sits relative to this portal exactly as the
        // primary viewer sits relative to the linked one. Each extra
        // recursion level applies the same carry again; rendering innermost
        // first lets outer passes sample the level below through the quad.
        let mut views = Vec::with_capacity(self.recursion_depth as usize);
        let mut view = *primary_view;
        for _ in 0..self.recursion_depth {
            view = carry_between(&linked.surface.pose, &portal.surface.pose, &view);
            views.push(view);
        }
        for view in views.iter().rev() {
            target.render_view(id, view);
        }

        target.bind_view(id, linked.id);
        target.set_surface_visible(id, true);

        Ok(RenderOutcome::Rendered {
            passes: views.len() as u32,
        })
    }

    /// Renders every portal in the registry, in id order.
    pub fn render_all(
        &self,
        registry: &PortalRegistry,
        primary_view: &Pose,
        frustum: &FrustumPlanes,
        resolution: (u32, u32),
        target: &mut dyn PortalViewTarget,
    ) -> Result<u32, PortalConfigError> {
        let mut rendered = 0;
        for id in registry.ids() {
            if let RenderOutcome::Rendered { passes } =
                self.render(registry, id, primary_view, frustum, resolution, target)?
            {
                rendered += passes;
            }
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Quat, Vec2, Vec3};
    use rift_shared::physics::extract_frustum_planes;
    use rift_shared::pose::{carry_between, Pose};

    use crate::registry::{PortalConfigError, PortalId, PortalRegistry, PortalSurface};

    use super::{PortalViewTarget, RenderOutcome, RenderProjector};

    const A: PortalId = PortalId(0);
    const B: PortalId = PortalId(1);

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Recreate(PortalId, u32, u32),
        SurfaceVisible(PortalId, bool),
        RenderView(PortalId, Pose),
        Bind(PortalId, PortalId),
        Fallback(PortalId),
    }

    #[derive(Default)]
    struct MockTarget {
        resolutions: Vec<(PortalId, (u32, u32))>,
        ops: Vec<Op>,
    }

    impl PortalViewTarget for MockTarget {
        fn view_resolution(&self, portal: PortalId) -> Option<(u32, u32)> {
            self.resolutions
                .iter()
                .find(|(id, _)| *id == portal)
                .map(|(_, res)| *res)
        }

        fn recreate_view(&mut self, portal: PortalId, width: u32, height: u32) {
            self.resolutions.retain(|(id, _)| *id != portal);
            self.resolutions.push((portal, (width, height)));
            self.ops.push(Op::Recreate(portal, width, height));
        }

        fn set_surface_visible(&mut self, portal: PortalId, visible: bool) {
            self.ops.push(Op::SurfaceVisible(portal, visible));
        }

        fn render_view(&mut self, portal: PortalId, view: &Pose) {
            self.ops.push(Op::RenderView(portal, *view));
        }

        fn bind_view(&mut self, source: PortalId, surface: PortalId) {
            self.ops.push(Op::Bind(source, surface));
        }

        fn paint_fallback(&mut self, surface: PortalId) {
            self.ops.push(Op::Fallback(surface));
        }
    }

    /// A at the origin facing -Z, B at (10,0,0) facing -X.
    fn registry() -> PortalRegistry {
        PortalRegistry::from_pairs(vec![(
            PortalSurface {
                pose: Pose::new(Vec3::ZERO, Quat::IDENTITY),
                half_extents: Vec2::new(1.0, 2.0),
            },
            PortalSurface {
                pose: Pose::new(
                    Vec3::new(10.0, 0.0, 0.0),
                    Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
                ),
                half_extents: Vec2::new(1.0, 2.0),
            },
        )])
        .unwrap()
    }

    fn frustum_looking(from: Vec3, forward: Vec3) -> rift_shared::physics::FrustumPlanes {
        let view = Mat4::look_to_rh(from, forward, Vec3::Y);
        let proj = Mat4::perspective_rh(70.0_f32.to_radians(), 16.0 / 9.0, 0.1, 200.0);
        extract_frustum_planes(proj * view)
    }

    #[test]
    fn render_follows_the_required_side_effect_order() {
        let registry = registry();
        let projector = RenderProjector::new(1);
        let mut target = MockTarget::default();
        // Viewer in front of B (on B's forward side, -X of it), looking at B.
        let viewer = Pose::new(Vec3::new(7.0, 0.0, 0.0), Quat::from_rotation_y(-std::f32::consts::FRAC_PI_2));
        let frustum = frustum_looking(viewer.position, Vec3::X);

        let outcome = projector
            .render(&registry, A, &viewer, &frustum, (1280, 720), &mut target)
            .unwrap();

        assert_eq!(outcome, RenderOutcome::Rendered { passes: 1 });
        assert_eq!(target.ops.len(), 5);
        assert_eq!(target.ops[0], Op::SurfaceVisible(A, false));
        assert_eq!(target.ops[1], Op::Recreate(A, 1280, 720));
        assert!(matches!(target.ops[2], Op::RenderView(A, _)));
        assert_eq!(target.ops[3], Op::Bind(A, B));
        assert_eq!(target.ops[4], Op::SurfaceVisible(A, true));
    }

    #[test]
    fn view_pose_mirrors_the_viewer_through_the_pair() {
        let registry = registry();
        let projector = RenderProjector::new(1);
        let mut target = MockTarget::default();
        // Three units in front of B along its forward (-X).
        let viewer = Pose::new(Vec3::new(7.0, 0.5, 0.0), Quat::from_rotation_y(-std::f32::consts::FRAC_PI_2));
        let frustum = frustum_looking(viewer.position, Vec3::X);

        projector
            .render(&registry, A, &viewer, &frustum, (640, 480), &mut target)
            .unwrap();

        let Some(Op::RenderView(_, view)) = target
            .ops
            .iter()
            .find(|op| matches!(op, Op::RenderView(..)))
        else {
            panic!("no view was rendered");
        };

        let a = registry.get(A).unwrap().surface.pose;
        let b = registry.get(B).unwrap().surface.pose;
        let expected = carry_between(&b, &a, &viewer);
        assert!((view.position - expected.position).length() < 1e-4);
        // Viewer is 3 in front of B, so the portal camera sits 3 in front of
        // A (A faces -Z), at the viewer's height.
        assert!((view.position - Vec3::new(0.0, 0.5, -3.0)).length() < 1e-4);
    }

    #[test]
    fn culled_surface_skips_render_and_texture() {
        let registry = registry();
        let projector = RenderProjector::new(1);
        let mut target = MockTarget::default();
        let viewer = Pose::new(Vec3::new(7.0, 0.0, 0.0), Quat::IDENTITY);
        // Looking straight away from B.
        let frustum = frustum_looking(viewer.position, Vec3::NEG_X);

        let outcome = projector
            .render(&registry, A, &viewer, &frustum, (1280, 720), &mut target)
            .unwrap();

        assert_eq!(outcome, RenderOutcome::Culled);
        assert!(target.ops.is_empty());
        assert_eq!(target.view_resolution(A), None);
    }

    #[test]
    fn diagnostics_paint_fallback_on_culled_surface() {
        let registry = registry();
        let projector = RenderProjector::new(1).with_diagnostics(true);
        let mut target = MockTarget::default();
        let viewer = Pose::new(Vec3::new(7.0, 0.0, 0.0), Quat::IDENTITY);
        let frustum = frustum_looking(viewer.position, Vec3::NEG_X);

        projector
            .render(&registry, A, &viewer, &frustum, (1280, 720), &mut target)
            .unwrap();
        assert_eq!(target.ops, vec![Op::Fallback(B)]);
    }

    #[test]
    fn resolution_change_recreates_texture_and_reuse_does_not() {
        let registry = registry();
        let projector = RenderProjector::new(1);
        let mut target = MockTarget::default();
        let viewer = Pose::new(Vec3::new(7.0, 0.0, 0.0), Quat::from_rotation_y(-std::f32::consts::FRAC_PI_2));
        let frustum = frustum_looking(viewer.position, Vec3::X);

        for _ in 0..3 {
            projector
                .render(&registry, A, &viewer, &frustum, (1280, 720), &mut target)
                .unwrap();
        }
        let recreates = |target: &MockTarget| {
            target
                .ops
                .iter()
                .filter(|op| matches!(op, Op::Recreate(..)))
                .count()
        };
        assert_eq!(recreates(&target), 1);

        projector
            .render(&registry, A, &viewer, &frustum, (1920, 1080), &mut target)
            .unwrap();
        assert_eq!(recreates(&target), 2);
        assert_eq!(target.view_resolution(A), Some((1920, 1080)));
    }

    #[test]
    fn recursion_renders_innermost_level_first() {
        let registry = registry();
        let projector = RenderProjector::new(3);
        let mut target = MockTarget::default();
        let viewer = Pose::new(Vec3::new(7.0, 0.0, 0.0), Quat::from_rotation_y(-std::f32::consts::FRAC_PI_2));
        let frustum = frustum_looking(viewer.position, Vec3::X);

        let outcome = projector
            .render(&registry, A, &viewer, &frustum, (640, 480), &mut target)
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Rendered { passes: 3 });

        let views: Vec<Pose> = target
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::RenderView(_, view) => Some(*view),
                _ => None,
            })
            .collect();
        assert_eq!(views.len(), 3);

        let a = registry.get(A).unwrap().surface.pose;
        let b = registry.get(B).unwrap().surface.pose;
        let level1 = carry_between(&b, &a, &viewer);
        let level2 = carry_between(&b, &a, &level1);
        // Deepest level is drawn first, the direct view last.
        assert!((views[0].position - carry_between(&b, &a, &level2).position).length() < 1e-4);
        assert!((views[2].position - level1.position).length() < 1e-4);
    }

    #[test]
    fn unknown_portal_is_a_configuration_error() {
        let registry = registry();
        let projector = RenderProjector::new(1);
        let mut target = MockTarget::default();
        let viewer = Pose::IDENTITY;
        let frustum = frustum_looking(Vec3::ZERO, Vec3::NEG_Z);

        let err = projector
            .render(&registry, PortalId(9), &viewer, &frustum, (64, 64), &mut target)
            .unwrap_err();
        assert_eq!(err, PortalConfigError::UnknownPortal(PortalId(9)));
    }

    #[test]
    fn depth_is_clamped_to_a_sane_range() {
        assert_eq!(RenderProjector::new(0).recursion_depth(), 1);
        assert_eq!(RenderProjector::new(100).recursion_depth(), 8);
    }
}

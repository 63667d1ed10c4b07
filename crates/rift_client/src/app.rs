use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use glam::Vec2;
use rift_core::events::{self, EventReceiver};
use rift_core::frame::FrameClock;
use rift_portal::projector::RenderProjector;
use rift_portal::registry::{PortalConfigError, PortalId, PortalRegistry};
use rift_portal::tracker::{CrossingTracker, PortalEvent, TravelerAccess};
use rift_portal::traveler::{Teleportable, TravelerId};
use rift_shared::physics::Aabb;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

use crate::camera::Camera;
use crate::input::InputState;
use crate::level::{demo_level, demo_props, portal_trigger_bounds, Level, Prop};
use crate::player::{MoveInput, Player};
use crate::renderer::{RenderFrameError, Renderer};
use crate::settings::{load_or_create_settings, ClientSettings, SETTINGS_FILE};

const TICK_RATE_HZ: f32 = 60.0;
const PLAYER_ID: TravelerId = TravelerId(0);

/// Everything the crossing tracker may need to move, behind one mutable
/// access point.
struct Travelers {
    player: Player,
    props: FxHashMap<TravelerId, Prop>,
}

impl TravelerAccess for Travelers {
    fn traveler_mut(&mut self, id: TravelerId) -> Option<&mut dyn Teleportable> {
        if id == PLAYER_ID {
            Some(&mut self.player)
        } else {
            self.props
                .get_mut(&id)
                .map(|prop| prop as &mut dyn Teleportable)
        }
    }
}

pub struct ClientApp {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    settings: ClientSettings,
    level: Level,
    registry: PortalRegistry,
    tracker: CrossingTracker,
    projector: RenderProjector,
    portal_events: EventReceiver<PortalEvent>,
    travelers: Travelers,
    camera: Camera,
    input: InputState,
    clock: FrameClock,
    last_frame: Option<Instant>,
    in_trigger: FxHashSet<(PortalId, TravelerId)>,
    cursor_grabbed: bool,
}

impl ClientApp {
    fn new() -> Result<Self, PortalConfigError> {
        let settings = load_or_create_settings(Path::new(SETTINGS_FILE));
        let level = demo_level();
        let registry = level.build_registry()?;

        let (event_sender, portal_events) = events::channel();
        let tracker = CrossingTracker::with_events(&registry, event_sender);
        let projector = RenderProjector::new(settings.portal_recursion)
            .with_diagnostics(settings.portal_diagnostics);

        let player = Player::spawn_at(level.spawn);
        let props: FxHashMap<TravelerId, Prop> = demo_props()
            .into_iter()
            .enumerate()
            .map(|(index, prop)| (TravelerId(index as u64 + 1), prop))
            .collect();

        let camera = Camera {
            fov: settings.fov.to_radians(),
            ..Camera::default()
        };

        Ok(Self {
            window: None,
            renderer: None,
            settings,
            level,
            registry,
            tracker,
            projector,
            portal_events,
            travelers: Travelers { player, props },
            camera,
            input: InputState::default(),
            clock: FrameClock::new(TICK_RATE_HZ),
            last_frame: None,
            in_trigger: FxHashSet::default(),
            cursor_grabbed: false,
        })
    }

    fn set_cursor_grab(&mut self, enabled: bool) {
        let Some(window) = self.window.as_ref() else {
            return;
        };

        if enabled {
            if let Err(err) = window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
            {
                warn!("failed to grab cursor: {err}");
                return;
            }
        } else {
            let _ = window.set_cursor_grab(CursorGrabMode::None);
        }

        window.set_cursor_visible(!enabled);
        self.cursor_grabbed = enabled;
    }

    fn toggle_diagnostics(&mut self) {
        self.settings.portal_diagnostics = !self.settings.portal_diagnostics;
        self.projector = RenderProjector::new(self.settings.portal_recursion)
            .with_diagnostics(self.settings.portal_diagnostics);
        info!(
            "portal diagnostics {}",
            if self.settings.portal_diagnostics {
                "enabled"
            } else {
                "disabled"
            }
        );
    }

    fn fixed_tick(&mut self, first_tick_of_frame: bool) {
        let dt = self.clock.fixed_dt();

        let axis = |positive: KeyCode, negative: KeyCode| -> f32 {
            let mut value = 0.0;
            if self.input.is_pressed(positive) {
                value += 1.0;
            }
            if self.input.is_pressed(negative) {
                value -= 1.0;
            }
            value
        };
        let move_input = MoveInput {
            movement: Vec2::new(
                axis(KeyCode::KeyD, KeyCode::KeyA),
                axis(KeyCode::KeyW, KeyCode::KeyS),
            ),
            // Edge-triggered actions fire on the first tick only, so a slow
            // frame does not double a jump or dash.
            jump: first_tick_of_frame && self.input.just_pressed(KeyCode::Space),
            dash: first_tick_of_frame && self.input.just_pressed(KeyCode::KeyQ),
            run: self.input.is_pressed(KeyCode::ShiftLeft),
            crouch: self.input.is_pressed(KeyCode::ControlLeft),
        };

        self.travelers.player.fixed_update(&move_input, dt);
        for prop in self.travelers.props.values_mut() {
            prop.fixed_update(dt);
        }

        self.update_trigger_overlaps();
        self.run_crossing_pass();
    }

    /// Edge-detects world-space overlap between each traveler and each
    /// portal's threshold volume, feeding enter/exit into the tracker.
    fn update_trigger_overlaps(&mut self) {
        let mut traveler_bounds: Vec<(TravelerId, Aabb)> =
            vec![(PLAYER_ID, self.travelers.player.aabb())];
        for (id, prop) in &self.travelers.props {
            traveler_bounds.push((*id, prop.aabb()));
        }

        for portal in self.registry.portals() {
            let trigger = portal_trigger_bounds(&portal.surface);
            for (traveler_id, bounds) in &traveler_bounds {
                let key = (portal.id, *traveler_id);
                let overlapping = bounds.intersects(&trigger);
                let was_overlapping = self.in_trigger.contains(&key);
                if overlapping == was_overlapping {
                    continue;
                }

                let Some(traveler) = self.travelers.traveler_mut(*traveler_id) else {
                    continue;
                };
                let result = if overlapping {
                    self.in_trigger.insert(key);
                    self.tracker
                        .on_trigger_enter(&self.registry, portal.id, *traveler_id, traveler)
                } else {
                    self.in_trigger.remove(&key);
                    self.tracker
                        .on_trigger_exit(&self.registry, portal.id, *traveler_id, traveler)
                };
                if let Err(err) = result {
                    error!("trigger update rejected: {err}");
                }
            }
        }
    }

    fn run_crossing_pass(&mut self) {
        match self.tracker.tick(&self.registry, &mut self.travelers) {
            Ok(0) => {}
            Ok(crossings) => {
                // A crossing moves the traveler to the far side of the other
                // portal, so its trigger overlap has to be re-derived before
                // the next enter/exit edge.
                debug!("{crossings} portal crossing(s) this step");
                self.refresh_trigger_overlaps_after_teleport();
            }
            Err(err) => error!("crossing pass rejected: {err}"),
        }
    }

    fn refresh_trigger_overlaps_after_teleport(&mut self) {
        let mut stale: Vec<(PortalId, TravelerId)> = Vec::new();
        for key in &self.in_trigger {
            let (portal_id, traveler_id) = *key;
            let Ok(portal) = self.registry.get(portal_id) else {
                continue;
            };
            let bounds = match traveler_id {
                PLAYER_ID => self.travelers.player.aabb(),
                other => match self.travelers.props.get(&other) {
                    Some(prop) => prop.aabb(),
                    None => {
                        stale.push(*key);
                        continue;
                    }
                },
            };
            if !bounds.intersects(&portal_trigger_bounds(&portal.surface)) {
                stale.push(*key);
            }
        }
        for key in stale {
            self.in_trigger.remove(&key);
        }
    }

    fn drain_portal_events(&mut self) {
        for event in self.portal_events.drain() {
            match event {
                PortalEvent::ThresholdEntered { portal, traveler } => {
                    debug!("{traveler} entered {portal} threshold");
                }
                PortalEvent::ThresholdExited { portal, traveler } => {
                    debug!("{traveler} exited {portal} threshold");
                }
                PortalEvent::Teleported {
                    from,
                    to,
                    traveler,
                    ..
                } => {
                    info!("{traveler} teleported {from} -> {to}");
                }
            }
        }
    }

    fn update_and_render(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let frame_dt = self
            .last_frame
            .map(|last| (now - last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_frame = Some(now);

        if self.cursor_grabbed {
            self.travelers
                .player
                .update_look(self.input.mouse_delta, self.settings.mouse_sensitivity);
        }

        let ticks = self.clock.advance(frame_dt);
        for tick in 0..ticks {
            self.fixed_tick(tick == 0);
        }
        // Edge-triggered keys stay latched through zero-tick frames; a fast
        // display would otherwise drop most taps before a tick sampled them.
        if ticks > 0 {
            self.input.clear_just_pressed();
        }
        // Late-update pass: catches a crossing that look rotation or a prior
        // tick's migration left unresolved before this frame renders.
        self.run_crossing_pass();
        self.drain_portal_events();

        let eye = self.travelers.player.eye_pose();
        self.camera.position = eye.position;
        self.camera.yaw = self.travelers.player.yaw;
        self.camera.pitch = self.travelers.player.pitch;
        // A tighter near plane while straddling a threshold keeps the portal
        // quad from clipping at the moment of crossing.
        self.camera.near = if self.travelers.player.in_threshold() {
            0.02
        } else {
            0.1
        };

        if let Some(renderer) = self.renderer.as_mut() {
            self.camera.aspect = renderer.aspect_ratio();
            match renderer.render_frame(
                &self.camera,
                &self.registry,
                &self.projector,
                self.travelers.props.values(),
            ) {
                Ok(_) => {}
                Err(RenderFrameError::Surface(
                    wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
                )) => {
                    if let Some(window) = self.window.as_ref() {
                        let size = window.inner_size();
                        renderer.resize(size.width, size.height);
                    }
                }
                Err(RenderFrameError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                    error!("surface out of memory; shutting down");
                    event_loop.exit();
                }
                Err(err) => warn!("frame skipped: {err}"),
            }
        }

        self.input.clear_mouse_delta();
    }
}

impl ApplicationHandler for ClientApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes().with_title("Rift");
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                match Renderer::new(window.clone(), &self.level, self.settings.portal_view_scale) {
                    Ok(renderer) => {
                        let size = window.inner_size();
                        if size.width > 0 && size.height > 0 {
                            self.camera.aspect = size.width as f32 / size.height as f32;
                        }
                        info!(
                            "window and renderer initialized, {} portals registered",
                            self.registry.len()
                        );
                        self.window = Some(window);
                        self.renderer = Some(renderer);
                        self.last_frame = Some(Instant::now());
                        self.set_cursor_grab(true);
                    }
                    Err(err) => {
                        error!("failed to initialize renderer: {err}");
                        event_loop.exit();
                    }
                }
            }
            Err(err) => {
                error!("failed to create window: {err}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().map(|window| window.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("close requested; shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
                if size.width > 0 && size.height > 0 {
                    self.camera.aspect = size.width as f32 / size.height as f32;
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                match event.state {
                    ElementState::Pressed => {
                        self.input.press_key(code);
                        match code {
                            KeyCode::Escape => self.set_cursor_grab(false),
                            KeyCode::F3 => self.toggle_diagnostics(),
                            _ => {}
                        }
                    }
                    ElementState::Released => self.input.release_key(code),
                }
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                ..
            } => {
                if !self.cursor_grabbed {
                    self.set_cursor_grab(true);
                }
            }
            WindowEvent::RedrawRequested => {
                self.update_and_render(event_loop);
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if !self.cursor_grabbed {
            return;
        }

        if let DeviceEvent::MouseMotion { delta } = event {
            self.input
                .add_mouse_delta(Vec2::new(delta.0 as f32, delta.1 as f32));
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

pub fn run() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            error!("failed to create event loop: {err}");
            return;
        }
    };

    let mut app = match ClientApp::new() {
        Ok(app) => app,
        Err(err) => {
            error!("portal configuration rejected: {err}");
            return;
        }
    };
    if let Err(err) = event_loop.run_app(&mut app) {
        error!("event loop exited with error: {err}");
    }
}

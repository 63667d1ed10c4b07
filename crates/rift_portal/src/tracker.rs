use glam::Quat;
use rift_core::events::EventSender;
use rift_shared::physics::signed_plane_offset;
use rift_shared::pose::{carry_between, rotation_delta};
use tracing::{debug, trace};

use crate::registry::{PortalConfigError, PortalId, PortalRegistry};
use crate::traveler::{Teleportable, TravelerId};

/// Notifications for collaborators outside the simulation (HUD, audio,
/// diagnostics). Advisory only; the tracker works the same with nobody
/// listening.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PortalEvent {
    ThresholdEntered {
        portal: PortalId,
        traveler: TravelerId,
    },
    ThresholdExited {
        portal: PortalId,
        traveler: TravelerId,
    },
    Teleported {
        from: PortalId,
        to: PortalId,
        traveler: TravelerId,
        rotation_delta: Quat,
    },
}

/// The tracker resolves traveler ids to live objects through this seam so it
/// stays independent of how the host stores its entities.
pub trait TravelerAccess {
    fn traveler_mut(&mut self, id: TravelerId) -> Option<&mut dyn Teleportable>;
}

#[derive(Debug, Clone, Copy)]
pub struct TrackedEntry {
    pub traveler: TravelerId,
    pub previous_offset: f32,
}

/// Per-portal tracked sets plus the crossing state machine:
/// Untracked -> Tracked -> (Untracked | migrated to the linked portal's set).
/// A traveler is in at most one set at any time; a crossing removes it here
/// and registers it with the partner in the same step.
pub struct CrossingTracker {
    tracked: Vec<Vec<TrackedEntry>>,
    events: Option<EventSender<PortalEvent>>,
}

impl CrossingTracker {
    pub fn new(registry: &PortalRegistry) -> Self {
        Self {
            tracked: vec![Vec::new(); registry.len()],
            events: None,
        }
    }

    pub fn with_events(registry: &PortalRegistry, events: EventSender<PortalEvent>) -> Self {
        Self {
            tracked: vec![Vec::new(); registry.len()],
            events: Some(events),
        }
    }

    pub fn is_tracked(&self, portal: PortalId, traveler: TravelerId) -> bool {
        self.tracked
            .get(portal.index())
            .is_some_and(|entries| entries.iter().any(|entry| entry.traveler == traveler))
    }

    pub fn tracked(&self, portal: PortalId) -> &[TrackedEntry] {
        self.tracked
            .get(portal.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The portal currently tracking `traveler`, if any.
    pub fn owner_of(&self, traveler: TravelerId) -> Option<PortalId> {
        self.tracked.iter().enumerate().find_map(|(index, entries)| {
            entries
                .iter()
                .any(|entry| entry.traveler == traveler)
                .then_some(PortalId(index as u32))
        })
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.iter().map(Vec::len).sum()
    }

    /// Trigger-volume overlap began. Entering while already tracked is a
    /// no-op, so jittery overlap events cannot double-register a traveler.
    pub fn on_trigger_enter(
        &mut self,
        registry: &PortalRegistry,
        portal: PortalId,
        id: TravelerId,
        traveler: &mut dyn Teleportable,
    ) -> Result<(), PortalConfigError> {
        let portal_pose = registry.get(portal)?.surface.pose;
        if self.is_tracked(portal, id) {
            trace!("{id} re-entered {portal} while tracked; ignoring");
            return Ok(());
        }

        let offset = signed_plane_offset(&portal_pose, traveler.pose().position);
        self.tracked[portal.index()].push(TrackedEntry {
            traveler: id,
            previous_offset: offset,
        });
        traveler.enter_portal_threshold();
        self.emit(PortalEvent::ThresholdEntered {
            portal,
            traveler: id,
        });
        debug!("{id} entered {portal} threshold at offset {offset:.3}");
        Ok(())
    }

    /// Trigger-volume overlap ended without a crossing: the traveler backed
    /// out on the side it came in from. Exiting while untracked is a no-op.
    pub fn on_trigger_exit(
        &mut self,
        registry: &PortalRegistry,
        portal: PortalId,
        id: TravelerId,
        traveler: &mut dyn Teleportable,
    ) -> Result<(), PortalConfigError> {
        registry.get(portal)?;
        let entries = &mut self.tracked[portal.index()];
        let Some(index) = entries.iter().position(|entry| entry.traveler == id) else {
            return Ok(());
        };

        entries.remove(index);
        traveler.exit_portal_threshold();
        self.emit(PortalEvent::ThresholdExited {
            portal,
            traveler: id,
        });
        debug!("{id} left {portal} threshold without crossing");
        Ok(())
    }

    /// Re-evaluates every tracked traveler once. Runs each physics tick and
    /// again in late-update, always before the frame's portal render passes.
    /// Returns the number of crossings performed.
    ///
    /// Each portal's set is detached before evaluation, so removals cannot
    /// skip or double-process a neighbor. A traveler migrated into a set that
    /// is evaluated later in the same call is seen there with its freshly
    /// seeded offset, compares equal-sign, and is left alone.
    pub fn tick(
        &mut self,
        registry: &PortalRegistry,
        travelers: &mut dyn TravelerAccess,
    ) -> Result<u32, PortalConfigError> {
        let mut crossings = 0;

        for portal_index in 0..self.tracked.len() {
            let portal_id = PortalId(portal_index as u32);
            let portal = registry.get(portal_id)?;
            let portal_pose = portal.surface.pose;
            let linked_id = portal.linked;
            let linked_pose = registry.get(linked_id)?.surface.pose;

            let entries = std::mem::take(&mut self.tracked[portal_index]);
            let mut retained = Vec::with_capacity(entries.len());

            for mut entry in entries {
                let Some(traveler) = travelers.traveler_mut(entry.traveler) else {
                    debug!("{} despawned while tracked by {portal_id}", entry.traveler);
                    continue;
                };

                let pose = traveler.pose();
                let offset = signed_plane_offset(&portal_pose, pose.position);
                let crossed = (offset < 0.0) != (entry.previous_offset < 0.0);
                if !crossed {
                    entry.previous_offset = offset;
                    retained.push(entry);
                    continue;
                }

                let new_pose = carry_between(&portal_pose, &linked_pose, &pose);
                let delta = rotation_delta(&portal_pose, &linked_pose);
                traveler.teleport(portal_id, linked_id, new_pose, delta);

                let seeded = signed_plane_offset(&linked_pose, new_pose.position);
                self.tracked[linked_id.index()].push(TrackedEntry {
                    traveler: entry.traveler,
                    previous_offset: seeded,
                });
                self.emit(PortalEvent::Teleported {
                    from: portal_id,
                    to: linked_id,
                    traveler: entry.traveler,
                    rotation_delta: delta,
                });
                debug!(
                    "{} crossed {portal_id} -> {linked_id}, seeded offset {seeded:.3}",
                    entry.traveler
                );
                crossings += 1;
            }

            debug_assert!(self.tracked[portal_index].is_empty());
            self.tracked[portal_index] = retained;
        }

        Ok(crossings)
    }

    fn emit(&self, event: PortalEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec2, Vec3};
    use rift_core::events;
    use rift_shared::physics::signed_plane_offset;
    use rift_shared::pose::Pose;

    use crate::registry::{PortalId, PortalRegistry, PortalSurface};
    use crate::traveler::{Teleportable, TravelerId};

    use super::{CrossingTracker, PortalEvent, TravelerAccess};

    const A: PortalId = PortalId(0);
    const B: PortalId = PortalId(1);

    struct TestTraveler {
        pose: Pose,
        velocity: Vec3,
        enters: u32,
        exits: u32,
        teleports: u32,
        last_route: Option<(PortalId, PortalId)>,
    }

    impl TestTraveler {
        fn at(position: Vec3) -> Self {
            Self {
                pose: Pose::from_position(position),
                velocity: Vec3::ZERO,
                enters: 0,
                exits: 0,
                teleports: 0,
                last_route: None,
            }
        }
    }

    impl Teleportable for TestTraveler {
        fn pose(&self) -> Pose {
            self.pose
        }

        fn teleport(&mut self, from: PortalId, to: PortalId, new_pose: Pose, rotation_delta: Quat) {
            self.pose = new_pose;
            self.velocity = rotation_delta * self.velocity;
            self.teleports += 1;
            self.last_route = Some((from, to));
        }

        fn enter_portal_threshold(&mut self) {
            self.enters += 1;
        }

        fn exit_portal_threshold(&mut self) {
            self.exits += 1;
        }
    }

    struct World {
        travelers: Vec<TestTraveler>,
    }

    impl World {
        fn id(index: usize) -> TravelerId {
            TravelerId(index as u64)
        }
    }

    impl TravelerAccess for World {
        fn traveler_mut(&mut self, id: TravelerId) -> Option<&mut dyn Teleportable> {
            self.travelers
                .get_mut(id.0 as usize)
                .map(|traveler| traveler as &mut dyn Teleportable)
        }
    }

    /// Portal A at the origin facing -Z; portal B at (10,0,0) facing -X.
    fn two_portal_registry() -> PortalRegistry {
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

    fn enter(
        tracker: &mut CrossingTracker,
        registry: &PortalRegistry,
        world: &mut World,
        portal: PortalId,
        index: usize,
    ) {
        tracker
            .on_trigger_enter(registry, portal, World::id(index), &mut world.travelers[index])
            .unwrap();
    }

    #[test]
    fn duplicate_enter_is_suppressed() {
        let registry = two_portal_registry();
        let mut tracker = CrossingTracker::new(&registry);
        let mut world = World {
            travelers: vec![TestTraveler::at(Vec3::new(0.0, 0.0, -0.5))],
        };

        enter(&mut tracker, &registry, &mut world, A, 0);
        enter(&mut tracker, &registry, &mut world, A, 0);

        assert_eq!(tracker.tracked(A).len(), 1);
        assert_eq!(world.travelers[0].enters, 1);
    }

    #[test]
    fn exit_of_untracked_traveler_is_a_noop() {
        let registry = two_portal_registry();
        let mut tracker = CrossingTracker::new(&registry);
        let mut world = World {
            travelers: vec![TestTraveler::at(Vec3::ZERO)],
        };

        tracker
            .on_trigger_exit(&registry, A, World::id(0), &mut world.travelers[0])
            .unwrap();
        assert_eq!(world.travelers[0].exits, 0);
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[test]
    fn backing_out_notifies_and_clears_without_teleport() {
        let registry = two_portal_registry();
        let mut tracker = CrossingTracker::new(&registry);
        let mut world = World {
            travelers: vec![TestTraveler::at(Vec3::new(0.0, 0.0, -0.5))],
        };

        enter(&mut tracker, &registry, &mut world, A, 0);
        // Still on the entry side, just further away.
        world.travelers[0].pose.position = Vec3::new(0.0, 0.0, -1.4);
        tracker.tick(&registry, &mut world).unwrap();
        tracker
            .on_trigger_exit(&registry, A, World::id(0), &mut world.travelers[0])
            .unwrap();

        assert_eq!(world.travelers[0].exits, 1);
        assert_eq!(world.travelers[0].teleports, 0);
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[test]
    fn same_side_ticks_never_teleport() {
        let registry = two_portal_registry();
        let mut tracker = CrossingTracker::new(&registry);
        let mut world = World {
            travelers: vec![TestTraveler::at(Vec3::new(0.0, 0.0, -0.5))],
        };

        enter(&mut tracker, &registry, &mut world, A, 0);
        tracker.tick(&registry, &mut world).unwrap();
        tracker.tick(&registry, &mut world).unwrap();

        assert_eq!(world.travelers[0].teleports, 0);
        assert!(tracker.is_tracked(A, World::id(0)));
    }

    #[test]
    fn crossing_teleports_and_migrates_tracking() {
        let registry = two_portal_registry();
        let mut tracker = CrossingTracker::new(&registry);
        // Offset +0.5 along A's forward (-Z).
        let mut world = World {
            travelers: vec![TestTraveler::at(Vec3::new(0.0, 0.0, -0.5))],
        };
        world.travelers[0].velocity = Vec3::new(0.0, 0.0, 1.0);

        enter(&mut tracker, &registry, &mut world, A, 0);
        // Next tick the traveler has pushed through to offset -0.3.
        world.travelers[0].pose.position = Vec3::new(0.0, 0.0, 0.3);
        let crossings = tracker.tick(&registry, &mut world).unwrap();

        assert_eq!(crossings, 1);
        assert_eq!(world.travelers[0].teleports, 1);
        assert_eq!(world.travelers[0].last_route, Some((A, B)));
        assert!(!tracker.is_tracked(A, World::id(0)));
        assert!(tracker.is_tracked(B, World::id(0)));

        // Pose was rewritten into B's frame: 0.3 behind B's plane.
        let b_pose = registry.get(B).unwrap().surface.pose;
        let new_position = world.travelers[0].pose.position;
        assert!((new_position - Vec3::new(10.3, 0.0, 0.0)).length() < 1e-4);
        let seeded = tracker.tracked(B)[0].previous_offset;
        assert!((seeded - signed_plane_offset(&b_pose, new_position)).abs() < 1e-6);
        assert!(seeded < 0.0);

        // Velocity was re-expressed through the rotation delta: movement
        // into A (world +Z) comes out of B along its outgoing axis (world +X).
        assert!((world.travelers[0].velocity - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn migrated_traveler_does_not_reteleport_in_same_tick() {
        let registry = two_portal_registry();
        let mut tracker = CrossingTracker::new(&registry);
        let mut world = World {
            travelers: vec![TestTraveler::at(Vec3::new(0.0, 0.0, -0.5))],
        };

        enter(&mut tracker, &registry, &mut world, A, 0);
        world.travelers[0].pose.position = Vec3::new(0.0, 0.0, 0.3);
        tracker.tick(&registry, &mut world).unwrap();
        // A second evaluation with no movement must leave it on B.
        tracker.tick(&registry, &mut world).unwrap();

        assert_eq!(world.travelers[0].teleports, 1);
        assert!(tracker.is_tracked(B, World::id(0)));
    }

    #[test]
    fn bystander_entry_is_untouched_by_anothers_crossing() {
        let registry = two_portal_registry();
        let mut tracker = CrossingTracker::new(&registry);
        let mut world = World {
            travelers: vec![
                TestTraveler::at(Vec3::new(0.0, 0.0, -0.5)),
                TestTraveler::at(Vec3::new(0.4, 0.0, -0.9)),
            ],
        };

        enter(&mut tracker, &registry, &mut world, A, 0);
        enter(&mut tracker, &registry, &mut world, A, 1);
        world.travelers[0].pose.position = Vec3::new(0.0, 0.0, 0.3);
        tracker.tick(&registry, &mut world).unwrap();

        assert!(tracker.is_tracked(B, World::id(0)));
        assert!(tracker.is_tracked(A, World::id(1)));
        assert_eq!(world.travelers[1].teleports, 0);
        let entry = tracker.tracked(A)[0];
        assert_eq!(entry.traveler, World::id(1));
        assert!((entry.previous_offset - 0.9).abs() < 1e-6);
    }

    #[test]
    fn mid_iteration_removal_processes_every_entry_once() {
        let registry = two_portal_registry();
        let mut tracker = CrossingTracker::new(&registry);
        let mut world = World {
            travelers: vec![
                TestTraveler::at(Vec3::new(-0.4, 0.0, -0.5)),
                TestTraveler::at(Vec3::new(0.0, 0.0, -0.5)),
                TestTraveler::at(Vec3::new(0.4, 0.0, -0.5)),
            ],
        };

        for index in 0..3 {
            enter(&mut tracker, &registry, &mut world, A, index);
        }
        // Only the middle traveler crosses; its removal must not make the
        // iteration skip the third or re-run the first.
        world.travelers[1].pose.position = Vec3::new(0.0, 0.0, 0.2);
        world.travelers[0].pose.position = Vec3::new(-0.4, 0.0, -0.7);
        world.travelers[2].pose.position = Vec3::new(0.4, 0.0, -0.2);
        tracker.tick(&registry, &mut world).unwrap();

        let remaining = tracker.tracked(A);
        assert_eq!(remaining.len(), 2);
        assert!((remaining[0].previous_offset - 0.7).abs() < 1e-6);
        assert!((remaining[1].previous_offset - 0.2).abs() < 1e-6);
        assert!(tracker.is_tracked(B, World::id(1)));
    }

    #[test]
    fn traveler_is_always_in_exactly_one_set() {
        let registry = two_portal_registry();
        let mut tracker = CrossingTracker::new(&registry);
        let mut world = World {
            travelers: vec![TestTraveler::at(Vec3::new(0.0, 0.0, -0.5))],
        };
        let id = World::id(0);

        enter(&mut tracker, &registry, &mut world, A, 0);
        assert_eq!(tracker.owner_of(id), Some(A));
        assert_eq!(tracker.tracked_count(), 1);

        world.travelers[0].pose.position = Vec3::new(0.0, 0.0, 0.3);
        tracker.tick(&registry, &mut world).unwrap();
        assert_eq!(tracker.owner_of(id), Some(B));
        assert_eq!(tracker.tracked_count(), 1);

        tracker
            .on_trigger_exit(&registry, B, id, &mut world.travelers[0])
            .unwrap();
        assert_eq!(tracker.owner_of(id), None);
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[test]
    fn despawned_traveler_is_dropped_from_tracking() {
        let registry = two_portal_registry();
        let mut tracker = CrossingTracker::new(&registry);
        let mut world = World {
            travelers: vec![TestTraveler::at(Vec3::new(0.0, 0.0, -0.5))],
        };

        enter(&mut tracker, &registry, &mut world, A, 0);
        let mut empty = World {
            travelers: Vec::new(),
        };
        tracker.tick(&registry, &mut empty).unwrap();
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[test]
    fn events_report_the_full_lifecycle() {
        let registry = two_portal_registry();
        let (tx, rx) = events::channel();
        let mut tracker = CrossingTracker::with_events(&registry, tx);
        let mut world = World {
            travelers: vec![TestTraveler::at(Vec3::new(0.0, 0.0, -0.5))],
        };
        let id = World::id(0);

        enter(&mut tracker, &registry, &mut world, A, 0);
        world.travelers[0].pose.position = Vec3::new(0.0, 0.0, 0.3);
        tracker.tick(&registry, &mut world).unwrap();
        tracker
            .on_trigger_exit(&registry, B, id, &mut world.travelers[0])
            .unwrap();

        let drained = rx.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(
            drained[0],
            PortalEvent::ThresholdEntered {
                portal: A,
                traveler: id
            }
        );
        assert!(matches!(
            drained[1],
            PortalEvent::Teleported {
                from: A,
                to: B,
                ..
            }
        ));
        assert_eq!(
            drained[2],
            PortalEvent::ThresholdExited {
                portal: B,
                traveler: id
            }
        );
    }
}

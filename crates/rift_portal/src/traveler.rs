use std::fmt;

use glam::Quat;
use rift_shared::pose::Pose;

use crate::registry::PortalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TravelerId(pub u64);

impl fmt::Display for TravelerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "traveler#{}", self.0)
    }
}

/// Capability contract for anything a portal can move. The tracker is
/// polymorphic over this; it never sees a concrete traveler type.
pub trait Teleportable {
    fn pose(&self) -> Pose;

    /// Overwrites the traveler's pose. `from` and `to` identify the pair the
    /// traveler just passed through, for implementors that react per-pair.
    /// `rotation_delta` is the portal-to-portal rotation; implementors with
    /// physics state re-express their velocity and angular velocity through
    /// it. The tracker itself never touches collaborator velocity.
    fn teleport(&mut self, from: PortalId, to: PortalId, new_pose: Pose, rotation_delta: Quat);

    /// The traveler is now touching a portal's threshold region. Typical use:
    /// switch to clipped rendering so the model does not poke through the
    /// surface.
    fn enter_portal_threshold(&mut self) {}

    /// The traveler left the threshold region without crossing; restore
    /// normal rendering.
    fn exit_portal_threshold(&mut self) {}
}

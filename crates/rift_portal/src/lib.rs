pub mod projector;
pub mod registry;
pub mod tracker;
pub mod traveler;

pub use projector::{PortalViewTarget, RenderOutcome, RenderProjector};
pub use registry::{Portal, PortalConfigError, PortalDesc, PortalId, PortalRegistry, PortalSurface};
pub use tracker::{CrossingTracker, PortalEvent, TravelerAccess};
pub use traveler::{Teleportable, TravelerId};

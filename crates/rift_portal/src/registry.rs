use std::fmt;

use glam::Vec2;
use rift_shared::physics::Aabb;
use rift_shared::pose::Pose;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortalId(pub u32);

impl PortalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PortalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "portal#{}", self.0)
    }
}

/// The renderable quad a portal view is displayed on. The pose's forward
/// axis is the surface normal; half extents span the quad in its local
/// right/up plane.
#[derive(Debug, Clone, Copy)]
pub struct PortalSurface {
    pub pose: Pose,
    pub half_extents: Vec2,
}

impl PortalSurface {
    /// Conservative world-space bounds of the quad, used for frustum culling.
    /// A little thickness keeps edge-on views from degenerating.
    pub fn bounds(&self) -> Aabb {
        const SURFACE_THICKNESS: f32 = 0.05;

        let right = self.pose.right() * self.half_extents.x;
        let up = self.pose.up() * self.half_extents.y;
        let normal = self.pose.forward() * SURFACE_THICKNESS;

        let mut min = self.pose.position;
        let mut max = self.pose.position;
        for sr in [-1.0f32, 1.0] {
            for su in [-1.0f32, 1.0] {
                for sn in [-1.0f32, 1.0] {
                    let corner = self.pose.position + right * sr + up * su + normal * sn;
                    min = min.min(corner);
                    max = max.max(corner);
                }
            }
        }
        Aabb { min, max }
    }

    pub fn bounding_radius(&self) -> f32 {
        self.half_extents.length().max(0.5)
    }
}

/// Pre-validation portal description, as loaded from level data. Both fields
/// are optional there; [`PortalRegistry::new`] is where missing pieces become
/// hard errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortalDesc {
    pub surface: Option<PortalSurface>,
    pub linked: Option<PortalId>,
}

#[derive(Debug, Clone)]
pub struct Portal {
    pub id: PortalId,
    pub surface: PortalSurface,
    pub linked: PortalId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalConfigError {
    MissingSurface(PortalId),
    MissingLink(PortalId),
    LinkOutOfRange { portal: PortalId, linked: PortalId },
    SelfLink(PortalId),
    NonMutualLink { portal: PortalId, linked: PortalId },
    UnknownPortal(PortalId),
}

impl fmt::Display for PortalConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSurface(id) => write!(f, "{id} has no display surface"),
            Self::MissingLink(id) => write!(f, "{id} has no linked partner"),
            Self::LinkOutOfRange { portal, linked } => {
                write!(f, "{portal} links to nonexistent {linked}")
            }
            Self::SelfLink(id) => write!(f, "{id} is linked to itself"),
            Self::NonMutualLink { portal, linked } => {
                write!(f, "{portal} links to {linked}, but not back")
            }
            Self::UnknownPortal(id) => write!(f, "{id} is not registered"),
        }
    }
}

impl std::error::Error for PortalConfigError {}

/// Holds every portal and its mutual linkage. Construction fails loudly on a
/// half-configured portal; a registry that exists is fully linked, so the
/// tracker and projector never have to consider an unpaired portal.
#[derive(Debug, Clone)]
pub struct PortalRegistry {
    portals: Vec<Portal>,
}

impl PortalRegistry {
    pub fn new(descs: Vec<PortalDesc>) -> Result<Self, PortalConfigError> {
        let mut portals = Vec::with_capacity(descs.len());
        for (index, desc) in descs.iter().enumerate() {
            let id = PortalId(index as u32);
            let surface = desc.surface.ok_or(PortalConfigError::MissingSurface(id))?;
            let linked = desc.linked.ok_or(PortalConfigError::MissingLink(id))?;
            if linked.index() >= descs.len() {
                return Err(PortalConfigError::LinkOutOfRange { portal: id, linked });
            }
            if linked == id {
                return Err(PortalConfigError::SelfLink(id));
            }
            portals.push(Portal { id, surface, linked });
        }

        for portal in &portals {
            let partner = &portals[portal.linked.index()];
            if partner.linked != portal.id {
                return Err(PortalConfigError::NonMutualLink {
                    portal: portal.id,
                    linked: portal.linked,
                });
            }
        }

        info!("portal registry validated: {} portals", portals.len());
        Ok(Self { portals })
    }

    /// Convenience constructor for the common case of mutually linked pairs.
    pub fn from_pairs(pairs: Vec<(PortalSurface, PortalSurface)>) -> Result<Self, PortalConfigError> {
        let mut descs = Vec::with_capacity(pairs.len() * 2);
        for (index, (first, second)) in pairs.into_iter().enumerate() {
            let a = PortalId((index * 2) as u32);
            let b = PortalId((index * 2 + 1) as u32);
            descs.push(PortalDesc {
                surface: Some(first),
                linked: Some(b),
            });
            descs.push(PortalDesc {
                surface: Some(second),
                linked: Some(a),
            });
        }
        Self::new(descs)
    }

    pub fn len(&self) -> usize {
        self.portals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portals.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = PortalId> + '_ {
        self.portals.iter().map(|portal| portal.id)
    }

    pub fn portals(&self) -> &[Portal] {
        &self.portals
    }

    pub fn get(&self, id: PortalId) -> Result<&Portal, PortalConfigError> {
        self.portals
            .get(id.index())
            .ok_or(PortalConfigError::UnknownPortal(id))
    }

    pub fn linked(&self, id: PortalId) -> Result<&Portal, PortalConfigError> {
        let portal = self.get(id)?;
        self.get(portal.linked)
    }

    /// Moves a portal's surface. Linkage is untouched.
    pub fn set_surface_pose(&mut self, id: PortalId, pose: Pose) -> Result<(), PortalConfigError> {
        let index = self.get(id)?.id.index();
        self.portals[index].surface.pose = pose;
        Ok(())
    }

    /// Re-pairs `a` with `b`, and their former partners with each other, in
    /// one step. Every back-reference is rewritten together so the mutual
    /// invariant never has a window where it is broken.
    pub fn relink(&mut self, a: PortalId, b: PortalId) -> Result<(), PortalConfigError> {
        if a == b {
            return Err(PortalConfigError::SelfLink(a));
        }
        let old_a = self.get(a)?.linked;
        let old_b = self.get(b)?.linked;
        if old_a == b {
            return Ok(());
        }

        self.portals[a.index()].linked = b;
        self.portals[b.index()].linked = a;
        self.portals[old_a.index()].linked = old_b;
        self.portals[old_b.index()].linked = old_a;
        info!("relinked {a} <-> {b} (former partners {old_a} <-> {old_b})");
        Ok(())
    }
}

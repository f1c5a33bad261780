use std::f32::consts::PI;

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use postern_math::rigid::RigidTransform;

/// Lateral slack around the opening when deciding whether a plane crossing
/// actually went through the portal and not past its edge.
const OPENING_MARGIN: f32 = 0.3;
/// Half-depth of the influence volume either side of a portal surface.
const INFLUENCE_HALF_DEPTH: f32 = 1.5;

/// Two anchors tied together: `local` marks the opening an observer walks
/// up to, `remote` marks the exactly corresponding point on the destination
/// side. The surface plane passes through each anchor with the anchor's
/// forward axis as its outward normal, so approaching observers sit at
/// positive local Z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortalLink {
    pub local: RigidTransform,
    pub remote: RigidTransform,
    /// Half-width and half-height of the rectangular opening.
    #[serde(default = "default_half_extents")]
    pub half_extents: Vec2,
    /// Whether crossing this portal changes the apparent world scale.
    #[serde(default)]
    pub is_scaling_portal: bool,
    /// Direction of the scale change: crossing lands in the scaled-up world
    /// when set.
    #[serde(default)]
    pub is_scaling_up: bool,
}

fn default_half_extents() -> Vec2 {
    Vec2::new(0.5, 1.0)
}

/// Re-expresses `observer` relative to the `remote` anchor, then back into
/// world space through the `local` anchor. Identical anchors map a pose to
/// itself.
pub fn map_pose(
    local: &RigidTransform,
    remote: &RigidTransform,
    observer: &RigidTransform,
) -> RigidTransform {
    let relative_rotation = (local.rotation * remote.rotation.conjugate()).normalize();
    RigidTransform {
        position: local.transform_point(remote.inverse_transform_point(observer.position)),
        rotation: (relative_rotation * observer.rotation).normalize(),
    }
}

impl PortalLink {
    pub fn new(local: RigidTransform, remote: RigidTransform) -> Self {
        Self {
            local,
            remote,
            half_extents: default_half_extents(),
            is_scaling_portal: false,
            is_scaling_up: false,
        }
    }

    /// Pose a camera must take on the destination side to reproduce the
    /// view of an eye standing at the entrance.
    pub fn view_pose(&self, eye: &RigidTransform) -> RigidTransform {
        map_pose(&self.remote, &self.local, eye)
    }

    /// Applies the entrance-to-destination mapping `depth + 1` times,
    /// feeding each result back in. The deeper images of a portal visible
    /// inside its own remote view sit at these chained poses.
    pub fn chain_pose(&self, eye: &RigidTransform, depth: u32) -> RigidTransform {
        let mut pose = self.view_pose(eye);
        for _ in 0..depth {
            pose = self.view_pose(&pose);
        }
        pose.normalized()
    }

    /// Outward normal on the destination side, the direction an observer
    /// faces away from the surface after emerging.
    pub fn exit_normal(&self) -> Vec3 {
        -self.remote.forward()
    }

    /// Maps a world point through the crossing, including the half-turn
    /// that makes walking into the front of one surface come out of the
    /// front of the other, then pushes it `exit_offset` along the exit
    /// normal so the landed point sits clear of the destination surface.
    pub fn teleport_point(&self, point: Vec3, exit_offset: f32) -> Vec3 {
        let flip = Quat::from_rotation_y(PI);
        self.remote
            .transform_point(flip * self.local.inverse_transform_point(point))
            + self.exit_normal() * exit_offset
    }

    /// Full-pose version of `teleport_point`. The whole thing is one rigid
    /// map, so poses carried by a common parent stay rigid relative to each
    /// other when each is passed through with the same offset.
    pub fn teleport_pose(&self, pose: &RigidTransform, exit_offset: f32) -> RigidTransform {
        let flip = Quat::from_rotation_y(PI);
        let relative_rotation = (self.remote.rotation * self.local.rotation.conjugate()).normalize();
        RigidTransform {
            position: self.teleport_point(pose.position, exit_offset),
            rotation: (flip * relative_rotation * pose.rotation).normalize(),
        }
    }

    /// Signed depth of `point` along the entrance surface normal. Positive
    /// is the approach side; a crossing is the transition to non-positive.
    pub fn entry_depth(&self, point: Vec3) -> f32 {
        self.local.inverse_transform_point(point).z
    }

    /// Whether a point on the surface plane lies within the opening
    /// rectangle, with a little margin for fast-moving observers.
    pub fn opening_contains(&self, point: Vec3) -> bool {
        let local = self.local.inverse_transform_point(point);
        local.x.abs() <= self.half_extents.x + OPENING_MARGIN
            && local.y.abs() <= self.half_extents.y + OPENING_MARGIN
    }

    pub fn entry_volume_contains(&self, point: Vec3) -> bool {
        volume_contains(&self.local, self.half_extents, point)
    }

    pub fn exit_volume_contains(&self, point: Vec3) -> bool {
        volume_contains(&self.remote, self.half_extents, point)
    }
}

/// Box test around a surface anchor: the opening rectangle plus margin,
/// extruded [`INFLUENCE_HALF_DEPTH`] to either side.
fn volume_contains(anchor: &RigidTransform, half_extents: Vec2, point: Vec3) -> bool {
    let local = anchor.inverse_transform_point(point);
    local.x.abs() <= half_extents.x + OPENING_MARGIN
        && local.y.abs() <= half_extents.y + OPENING_MARGIN
        && local.z.abs() <= INFLUENCE_HALF_DEPTH
}

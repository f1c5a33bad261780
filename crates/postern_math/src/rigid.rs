use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A rigid pose in world space: translation plus unit rotation, no scale.
///
/// Portal anchors, eyes, and observers are all poses of this kind, and the
/// mapping between portal sides is a pure composition of them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RigidTransform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation: rotation.normalize(),
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Direction the pose faces, `rotation * +Z`.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Maps a point in this pose's local frame into world space.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.position
    }

    /// Maps a world-space point into this pose's local frame.
    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation.conjugate() * (point - self.position)
    }

    pub fn inverse(&self) -> Self {
        let inv_rotation = self.rotation.conjugate();
        Self {
            position: inv_rotation * -self.position,
            rotation: inv_rotation,
        }
    }

    /// `self * other`, applying `other` inside this pose's frame.
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(other.position),
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    /// Re-normalizes the rotation. Long chains of composed poses drift away
    /// from unit length otherwise.
    pub fn normalized(&self) -> Self {
        Self {
            position: self.position,
            rotation: self.rotation.normalize(),
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// View matrix for a camera sitting at this pose and looking along its
    /// forward axis. Pairs with right-handed projections, which expect
    /// viewed points at negative view-space Z.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), self.up())
    }
}

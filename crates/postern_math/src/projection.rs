use glam::{Mat4, Vec4};
use serde::{Deserialize, Serialize};

/// Symmetric perspective intrinsics. Serves as the projection source when no
/// device-supplied per-eye matrix is available.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Perspective {
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Perspective {
    fn default() -> Self {
        Self {
            fov_y: 70.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Perspective {
    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y,
            self.aspect.max(0.0001),
            self.near.max(0.0001),
            self.far.max(self.near + 0.0001),
        )
    }
}

/// Rebuilds the near plane of `proj` so it coincides with a camera-space
/// clip plane (oblique depth projection).
///
/// A denominator close to zero means the plane cannot be represented in
/// this projection; the matrix comes back unchanged rather than blowing up.
pub fn apply_oblique_clip(proj: Mat4, clip_plane_camera: Vec4) -> Mat4 {
    let q = proj.inverse()
        * Vec4::new(
            clip_plane_camera.x.signum(),
            clip_plane_camera.y.signum(),
            1.0,
            1.0,
        );
    let denom = clip_plane_camera.dot(q);
    if denom.abs() < 1e-5 {
        return proj;
    }

    let c = clip_plane_camera * (2.0 / denom);
    let mut m = proj.to_cols_array_2d();
    m[0][2] = c.x - m[0][3];
    m[1][2] = c.y - m[1][3];
    m[2][2] = c.z - m[2][3];
    m[3][2] = c.w - m[3][3];
    Mat4::from_cols_array_2d(&m)
}

#[cfg(test)]
mod tests {
    use glam::{Vec3, Vec4};

    use super::{apply_oblique_clip, Perspective};
    use crate::plane::from_normal_point;

    fn ndc_depth(proj: glam::Mat4, camera_point: Vec3) -> f32 {
        let clip = proj * camera_point.extend(1.0);
        clip.z / clip.w
    }

    #[test]
    fn points_on_the_clip_plane_share_one_depth_after_obliquing() {
        let proj = Perspective {
            fov_y: 90.0_f32.to_radians(),
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
        }
        .matrix();

        let normal = Vec3::new(0.4, 0.0, 1.0).normalize();
        let anchor = Vec3::new(0.0, 0.0, -5.0);
        let plane = from_normal_point(normal, anchor);
        let oblique = apply_oblique_clip(proj, plane);

        let along = Vec3::new(1.0, 0.0, -0.4).normalize();
        let a = ndc_depth(oblique, anchor);
        let b = ndc_depth(oblique, anchor + along * 1.5);
        let c = ndc_depth(oblique, anchor - along * 2.0 + Vec3::new(0.0, 1.0, 0.0) * 0.5);
        assert!((a - b).abs() < 1e-4, "on-plane depths diverged: {a} vs {b}");
        assert!((a - c).abs() < 1e-4, "on-plane depths diverged: {a} vs {c}");
    }

    #[test]
    fn depth_grows_past_the_oblique_plane() {
        let proj = Perspective {
            fov_y: 90.0_f32.to_radians(),
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
        }
        .matrix();
        let plane = from_normal_point(Vec3::Z, Vec3::new(0.0, 0.0, -5.0));
        let oblique = apply_oblique_clip(proj, plane);

        let on_plane = ndc_depth(oblique, Vec3::new(0.0, 0.0, -5.0));
        let beyond = ndc_depth(oblique, Vec3::new(0.0, 0.0, -8.0));
        let far_out = ndc_depth(oblique, Vec3::new(0.0, 0.0, -90.0));
        assert!(beyond > on_plane);
        assert!(far_out > beyond);
    }

    #[test]
    fn degenerate_plane_leaves_the_projection_unchanged() {
        let proj = Perspective::default().matrix();
        assert_eq!(apply_oblique_clip(proj, Vec4::ZERO), proj);
    }

    #[test]
    fn perspective_matrix_survives_bad_intrinsics() {
        let broken = Perspective {
            fov_y: 1.2,
            aspect: 0.0,
            near: 0.0,
            far: -5.0,
        };
        assert!(broken.matrix().is_finite());
    }
}

use glam::{Mat4, Vec3, Vec4};

/// Normalizes `v`, falling back when the input has no usable length.
pub fn safe_normalize(v: Vec3, fallback: Vec3) -> Vec3 {
    let n = v.normalize_or_zero();
    if n.length_squared() > 0.0 {
        n
    } else {
        fallback
    }
}

/// Plane `ax + by + cz + d = 0` packed as `Vec4(a, b, c, d)`. Points on the
/// normal side have positive signed distance. A degenerate normal falls back
/// to +Z so callers never see NaN coefficients.
pub fn from_normal_point(normal: Vec3, point: Vec3) -> Vec4 {
    let n = safe_normalize(normal, Vec3::Z);
    Vec4::new(n.x, n.y, n.z, -n.dot(point))
}

/// Re-expresses a world-space plane in camera space.
///
/// Plane coefficients transform by the inverse transpose of the matrix that
/// transforms points, not by the matrix itself.
pub fn to_camera_space(world_to_camera: Mat4, plane_world: Vec4) -> Vec4 {
    world_to_camera.inverse().transpose() * plane_world
}

pub fn signed_distance(plane: Vec4, point: Vec3) -> f32 {
    plane.x * point.x + plane.y * point.y + plane.z * point.z + plane.w
}

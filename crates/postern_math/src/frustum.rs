use glam::{Mat4, Vec3};

pub type FrustumPlanes = [[f32; 4]; 6];

/// Extracts the six clipping planes of a view-projection matrix, normals
/// pointing inward.
pub fn extract_frustum_planes(vp: Mat4) -> FrustumPlanes {
    let m = vp.to_cols_array_2d();
    let row0 = [m[0][0], m[1][0], m[2][0], m[3][0]];
    let row1 = [m[0][1], m[1][1], m[2][1], m[3][1]];
    let row2 = [m[0][2], m[1][2], m[2][2], m[3][2]];
    let row3 = [m[0][3], m[1][3], m[2][3], m[3][3]];

    let planes = [
        [row3[0] + row0[0], row3[1] + row0[1], row3[2] + row0[2], row3[3] + row0[3]],
        [row3[0] - row0[0], row3[1] - row0[1], row3[2] - row0[2], row3[3] - row0[3]],
        [row3[0] + row1[0], row3[1] + row1[1], row3[2] + row1[2], row3[3] + row1[3]],
        [row3[0] - row1[0], row3[1] - row1[1], row3[2] - row1[2], row3[3] - row1[3]],
        [row3[0] + row2[0], row3[1] + row2[1], row3[2] + row2[2], row3[3] + row2[3]],
        [row3[0] - row2[0], row3[1] - row2[1], row3[2] - row2[2], row3[3] - row2[3]],
    ];

    let mut result = [[0.0f32; 4]; 6];
    for (i, p) in planes.iter().enumerate() {
        let len = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
        if len > 0.0001 {
            result[i] = [p[0] / len, p[1] / len, p[2] / len, p[3] / len];
        }
    }
    result
}

pub fn sphere_in_frustum(planes: &FrustumPlanes, center: Vec3, radius: f32) -> bool {
    for plane in planes {
        let distance = plane[0] * center.x + plane[1] * center.y + plane[2] * center.z + plane[3];
        if distance < -radius {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3};

    use super::{extract_frustum_planes, sphere_in_frustum};

    fn looking_down_negative_z() -> Mat4 {
        let projection =
            Mat4::perspective_rh(70.0_f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        projection * view
    }

    #[test]
    fn sphere_ahead_of_the_camera_is_inside() {
        let planes = extract_frustum_planes(looking_down_negative_z());
        assert!(sphere_in_frustum(&planes, Vec3::new(0.0, 0.0, -10.0), 1.0));
    }

    #[test]
    fn sphere_behind_the_camera_is_outside() {
        let planes = extract_frustum_planes(looking_down_negative_z());
        assert!(!sphere_in_frustum(&planes, Vec3::new(0.0, 0.0, 20.0), 1.0));
    }

    #[test]
    fn sphere_far_off_axis_is_outside_but_grazing_counts_as_inside() {
        let planes = extract_frustum_planes(looking_down_negative_z());
        assert!(!sphere_in_frustum(&planes, Vec3::new(200.0, 0.0, -10.0), 1.0));
        assert!(sphere_in_frustum(&planes, Vec3::new(8.0, 0.0, -10.0), 8.0));
    }
}

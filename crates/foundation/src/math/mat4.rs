//! Column-major 4x4 matrices (`m[col][row]`), matching WGSL/GLSL uniform layout.

use super::Vec3;

pub type Mat4 = [[f32; 4]; 4];

pub const MAT4_IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// `c = a * b`
pub fn mat4_mul(a: Mat4, b: Mat4) -> Mat4 {
    let mut c = [[0.0f32; 4]; 4];
    for col in 0..4 {
        for row in 0..4 {
            c[col][row] = a[0][row] * b[col][0]
                + a[1][row] * b[col][1]
                + a[2][row] * b[col][2]
                + a[3][row] * b[col][3];
        }
    }
    c
}

/// Right-handed perspective with a `[0, 1]` depth range.
pub fn mat4_perspective_rh_z0(fov_y_rad: f64, aspect: f64, near: f64, far: f64) -> Mat4 {
    let f = 1.0 / (0.5 * fov_y_rad).tan();
    let m00 = (f / aspect) as f32;
    let m11 = f as f32;
    let m22 = (far / (near - far)) as f32;
    let m23 = ((near * far) / (near - far)) as f32;

    [
        [m00, 0.0, 0.0, 0.0],
        [0.0, m11, 0.0, 0.0],
        [0.0, 0.0, m22, -1.0],
        [0.0, 0.0, m23, 0.0],
    ]
}

/// World-to-view matrix for a camera at `eye` looking at `target`.
pub fn mat4_look_at_rh(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    let f = (target - eye).normalize_or_zero();
    let s = f.cross(up).normalize_or_zero();
    let u = s.cross(f);

    [
        [s.x as f32, u.x as f32, -f.x as f32, 0.0],
        [s.y as f32, u.y as f32, -f.y as f32, 0.0],
        [s.z as f32, u.z as f32, -f.z as f32, 0.0],
        [-s.dot(eye) as f32, -u.dot(eye) as f32, f.dot(eye) as f32, 1.0],
    ]
}

pub fn mat4_rotation_x(angle_rad: f64) -> Mat4 {
    let (s, c) = (angle_rad.sin() as f32, angle_rad.cos() as f32);
    [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, c, s, 0.0],
        [0.0, -s, c, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

pub fn mat4_rotation_y(angle_rad: f64) -> Mat4 {
    let (s, c) = (angle_rad.sin() as f32, angle_rad.cos() as f32);
    [
        [c, 0.0, -s, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [s, 0.0, c, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Transforms a point (w = 1) without the perspective divide.
pub fn mat4_transform_point(m: Mat4, p: Vec3) -> Vec3 {
    let (x, y, z) = (p.x as f32, p.y as f32, p.z as f32);
    Vec3::new(
        (m[0][0] * x + m[1][0] * y + m[2][0] * z + m[3][0]) as f64,
        (m[0][1] * x + m[1][1] * y + m[2][1] * z + m[3][1]) as f64,
        (m[0][2] * x + m[1][2] * y + m[2][2] * z + m[3][2]) as f64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_mat_close(a: Mat4, b: Mat4, eps: f32) {
        for col in 0..4 {
            for row in 0..4 {
                let diff = (a[col][row] - b[col][row]).abs();
                assert!(diff <= eps, "m[{col}][{row}]: {} vs {}", a[col][row], b[col][row]);
            }
        }
    }

    #[test]
    fn look_at_moves_eye_to_origin() {
        let eye = Vec3::new(0.0, 0.0, -3.0);
        let view = mat4_look_at_rh(eye, Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0));
        let p = mat4_transform_point(view, eye);
        assert!(p.length() < 1e-5);
        // The target sits straight ahead on -z in view space.
        let t = mat4_transform_point(view, Vec3::ZERO);
        assert!((t.z + 3.0).abs() < 1e-5);
    }

    #[test]
    fn rotations_compose_with_identity() {
        let m = mat4_mul(mat4_rotation_y(0.7), mat4_rotation_x(-0.3));
        assert_mat_close(mat4_mul(m, MAT4_IDENTITY), m, 1e-6);
        assert_mat_close(mat4_mul(MAT4_IDENTITY, m), m, 1e-6);
    }

    #[test]
    fn rotation_y_quarter_turn_maps_z_to_x() {
        let p = mat4_transform_point(
            mat4_rotation_y(std::f64::consts::FRAC_PI_2),
            Vec3::new(0.0, 0.0, 1.0),
        );
        assert!((p.x - 1.0).abs() < 1e-6);
        assert!(p.z.abs() < 1e-6);
    }
}

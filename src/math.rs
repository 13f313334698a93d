use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, Rad, SquareMatrix, Vector3};

/// Relative determinant threshold below which a 3×3 block counts as singular.
/// The determinant is compared against the product of the column lengths, so
/// the test does not depend on the overall scale of the model.
pub const SINGULAR_TOLERANCE: f32 = 1e-6;

pub fn translation(x: f32, y: f32, z: f32) -> Matrix4<f32> {
    Matrix4::from_translation(Vector3::new(x, y, z))
}

pub fn uniform_scale(scale: f32) -> Matrix4<f32> {
    Matrix4::from_scale(scale)
}

/// Euler rotation applied as `Rx * Ry * Rz`.
pub fn euler_rotation(angle_x: f32, angle_y: f32, angle_z: f32) -> Matrix4<f32> {
    Matrix4::from_angle_x(Rad(angle_x))
        * Matrix4::from_angle_y(Rad(angle_y))
        * Matrix4::from_angle_z(Rad(angle_z))
}

/// Model transform: translate * scale * rotate.
pub fn compose(
    translation: &Matrix4<f32>,
    scale: &Matrix4<f32>,
    rotation: &Matrix4<f32>,
) -> Matrix4<f32> {
    translation * scale * rotation
}

/// Perspective projection for a right-handed view space mapping depth to [0, 1].
pub fn perspective_zero_to_one(fov_y: f32, aspect: f32, near: f32, far: f32) -> Matrix4<f32> {
    let f = 1.0 / (fov_y / 2.0).tan();
    let range = near - far;

    #[rustfmt::skip]
    let projection = Matrix4::new(
        f / aspect, 0.0, 0.0,                  0.0,
        0.0,        f,   0.0,                  0.0,
        0.0,        0.0, far / range,         -1.0,
        0.0,        0.0, near * far / range,   0.0,
    );
    projection
}

pub fn upper_left_3x3(m: &Matrix4<f32>) -> Matrix3<f32> {
    Matrix3::from_cols(m.x.truncate(), m.y.truncate(), m.z.truncate())
}

pub fn is_singular(m: &Matrix3<f32>) -> bool {
    let det = m.determinant();
    if !det.is_finite() {
        return true;
    }
    let volume = m.x.magnitude() * m.y.magnitude() * m.z.magnitude();
    det.abs() <= SINGULAR_TOLERANCE * volume
}

/// Adjugate inverse. The rows of the inverse are the pairwise column cross
/// products divided by the determinant.
pub fn invert3(m: &Matrix3<f32>) -> Option<Matrix3<f32>> {
    if is_singular(m) {
        return None;
    }
    let det = m.determinant();
    let rows = Matrix3::from_cols(m.y.cross(m.z), m.z.cross(m.x), m.x.cross(m.y)) / det;
    Some(rows.transpose())
}

/// transpose(inverse(upper-left 3×3 of `model`)), or `None` when that block
/// cannot be inverted.
pub fn normal_matrix(model: &Matrix4<f32>) -> Option<Matrix3<f32>> {
    invert3(&upper_left_3x3(model)).map(|inverse| inverse.transpose())
}

/// Column-major flattening, the order WGSL and the engine contract use.
pub fn to_column_array(m: &Matrix4<f32>) -> [f32; 16] {
    let columns: [[f32; 4]; 4] = (*m).into();
    let mut out = [0.0; 16];
    for (i, column) in columns.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(column);
    }
    out
}

pub fn from_column_array(values: &[f32; 16]) -> Matrix4<f32> {
    #[rustfmt::skip]
    let m = Matrix4::new(
        values[0],  values[1],  values[2],  values[3],
        values[4],  values[5],  values[6],  values[7],
        values[8],  values[9],  values[10], values[11],
        values[12], values[13], values[14], values[15],
    );
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32, tolerance: f32) {
        assert!((a - b).abs() <= tolerance, "{a} != {b} (tolerance {tolerance})");
    }

    // Reference path: full 4x4 inverse, transpose, then take the 3x3 block.
    fn reference_normal_matrix(model: &Matrix4<f32>) -> Matrix3<f32> {
        let inverse = model.invert().expect("test matrix must be invertible");
        upper_left_3x3(&inverse.transpose())
    }

    fn sample_models() -> Vec<Matrix4<f32>> {
        vec![
            Matrix4::identity(),
            compose(
                &translation(1.0, -2.0, 3.0),
                &uniform_scale(0.1),
                &euler_rotation(0.3, 1.2, -0.4),
            ),
            translation(0.5, 0.5, 0.5)
                * Matrix4::from_nonuniform_scale(3.0, 0.5, 1.5)
                * euler_rotation(-1.0, 0.2, 2.5),
            Matrix4::from_nonuniform_scale(0.5, 0.25, 2.0),
        ]
    }

    #[test]
    fn normal_matrix_matches_reference_direction() {
        let normals = [
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 1.0, 0.0).normalize(),
            Vector3::new(-0.3, 0.8, 0.52).normalize(),
        ];

        for model in sample_models() {
            let derived = normal_matrix(&model).expect("invertible");
            let reference = reference_normal_matrix(&model);
            for n in normals {
                let a = (derived * n).normalize();
                let b = (reference * n).normalize();
                assert_close(a.dot(b), 1.0, 1e-4);
            }
        }
    }

    #[test]
    fn transformed_normals_stay_perpendicular_under_nonuniform_scale() {
        let model = Matrix4::from_nonuniform_scale(4.0, 1.0, 1.0) * euler_rotation(0.0, 0.0, 0.7);
        let normal = Vector3::new(1.0, 1.0, 0.0).normalize();
        let tangent = Vector3::new(1.0, -1.0, 0.0).normalize();

        let linear = upper_left_3x3(&model);
        let n = normal_matrix(&model).expect("invertible") * normal;
        let t = linear * tangent;
        assert_close(n.normalize().dot(t.normalize()), 0.0, 1e-5);

        // Transforming the normal with the model matrix itself skews it.
        let skewed = linear * normal;
        assert!(skewed.normalize().dot(t.normalize()).abs() > 0.1);
    }

    #[test]
    fn singular_model_has_no_normal_matrix() {
        let flattened = Matrix4::from_nonuniform_scale(1.0, 0.0, 1.0);
        assert!(normal_matrix(&flattened).is_none());
        assert!(normal_matrix(&uniform_scale(0.0)).is_none());

        let mut nan = Matrix4::identity();
        nan.x.x = f32::NAN;
        assert!(normal_matrix(&nan).is_none());
    }

    #[test]
    fn tiny_uniform_scale_is_not_singular() {
        let n = normal_matrix(&uniform_scale(1e-4)).expect("invertible");
        assert_close(n.x.x, 1e4, 1.0);
        assert_close(n.y.x, 0.0, 1e-3);
    }

    #[test]
    fn invert3_produces_identity() {
        let m = upper_left_3x3(&(Matrix4::from_nonuniform_scale(2.0, 3.0, 0.5) * euler_rotation(0.4, -0.9, 1.3)));
        let product = m * invert3(&m).expect("invertible");
        let identity = Matrix3::<f32>::identity();
        for c in 0..3 {
            for r in 0..3 {
                assert_close(product[c][r], identity[c][r], 1e-5);
            }
        }
    }

    #[test]
    fn column_array_round_trips_translation() {
        let m = translation(4.0, 5.0, 6.0);
        let flat = to_column_array(&m);
        assert_eq!(&flat[12..15], &[4.0, 5.0, 6.0]);
        assert_eq!(from_column_array(&flat), m);
    }

    #[test]
    fn projection_maps_near_and_far_to_unit_depth() {
        let p = perspective_zero_to_one(std::f32::consts::FRAC_PI_4, 1.5, 0.1, 10.0);
        let near = p * cgmath::Vector4::new(0.0, 0.0, -0.1, 1.0);
        let far = p * cgmath::Vector4::new(0.0, 0.0, -10.0, 1.0);
        assert_close(near.z / near.w, 0.0, 1e-5);
        assert_close(far.z / far.w, 1.0, 1e-5);
    }
}

//! Plane-to-image homography estimation (normalized DLT).

use crate::optimization::SolverError;
use nalgebra::{DMatrix, Matrix3, Vector2, Vector3};

/// Similarity transform moving the centroid to the origin with mean distance `sqrt(2)`.
fn normalization_transform(points: &[Vector2<f64>]) -> Option<Matrix3<f64>> {
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector2::zeros(), |acc, p| acc + p) / n;
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if mean_dist <= f64::EPSILON {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some(Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    ))
}

fn transform_point(t: &Matrix3<f64>, p: &Vector2<f64>) -> Vector2<f64> {
    let q = t * Vector3::new(p.x, p.y, 1.0);
    Vector2::new(q.x / q.z, q.y / q.z)
}

/// Estimates `H` such that `image ~ H * [x, y, 1]` for board points on `z = 0`.
///
/// The result is scaled so that `H[(2, 2)] == 1` whenever that entry is not zero.
///
/// # Errors
///
/// * [`SolverError::NotEnoughPoints`] with fewer than 4 correspondences.
/// * [`SolverError::DegenerateConfiguration`] when the points are coincident or
///   the linear system has no usable solution.
pub fn estimate_homography(
    object_points: &[Vector3<f64>],
    image_points: &[Vector2<f64>],
) -> Result<Matrix3<f64>, SolverError> {
    let n = object_points.len();
    if n < 4 || image_points.len() != n {
        return Err(SolverError::NotEnoughPoints {
            required: 4,
            found: n.min(image_points.len()),
        });
    }

    let plane: Vec<Vector2<f64>> = object_points.iter().map(|p| p.xy()).collect();
    let t_object = normalization_transform(&plane).ok_or_else(|| {
        SolverError::DegenerateConfiguration("board points are coincident".to_string())
    })?;
    let t_image = normalization_transform(image_points).ok_or_else(|| {
        SolverError::DegenerateConfiguration("image points are coincident".to_string())
    })?;

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (pw, pi)) in plane.iter().zip(image_points.iter()).enumerate() {
        let w = transform_point(&t_object, pw);
        let m = transform_point(&t_image, pi);
        let (x, y, u, v) = (w.x, w.y, m.x, m.y);

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // Null vector of A from the normal equations, so 4 points still yield a full V
    let ata = a.tr_mul(&a);
    let svd = ata.svd(false, true);
    let v_t = svd.v_t.ok_or_else(|| {
        SolverError::DegenerateConfiguration("homography SVD failed".to_string())
    })?;
    let h = v_t.row(svd.singular_values.imin());

    let h_normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    let t_image_inv = t_image.try_inverse().ok_or_else(|| {
        SolverError::DegenerateConfiguration("singular image normalization".to_string())
    })?;
    let mut h_mat = t_image_inv * h_normalized * t_object;

    // normalise such that H[2,2] = 1
    let scale = h_mat[(2, 2)];
    if scale.abs() > f64::EPSILON {
        h_mat /= scale;
    }

    if h_mat.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::DegenerateConfiguration(
            "homography is not finite".to_string(),
        ));
    }

    Ok(h_mat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn apply(h: &Matrix3<f64>, p: &Vector3<f64>) -> Vector2<f64> {
        let q = h * Vector3::new(p.x, p.y, 1.0);
        Vector2::new(q.x / q.z, q.y / q.z)
    }

    #[test]
    fn test_scaling_homography() {
        let w = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let img = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(2.0, 2.0),
            Vector2::new(0.0, 2.0),
        ];

        let h = estimate_homography(&w, &img).unwrap();
        assert_relative_eq!(h[(0, 0)], 2.0, epsilon = 1e-9);
        assert_relative_eq!(h[(1, 1)], 2.0, epsilon = 1e-9);
        assert_relative_eq!(h[(0, 2)], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_recovers_perspective_homography() {
        let h_true = Matrix3::new(
            620.0, 35.0, 150.0, //
            -20.0, 590.0, 95.0, //
            0.02, -0.015, 1.0,
        );
        let object: Vec<_> = (0..54)
            .map(|i| Vector3::new((i % 9) as f64, (i / 9) as f64, 0.0))
            .collect();
        let image: Vec<_> = object.iter().map(|p| apply(&h_true, p)).collect();

        let h = estimate_homography(&object, &image).unwrap();
        assert_relative_eq!(h, h_true, max_relative = 1e-6);

        for (p, m) in object.iter().zip(image.iter()) {
            assert_relative_eq!(apply(&h, p), *m, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_rejects_too_few_points() {
        let w = vec![Vector3::new(0.0, 0.0, 0.0); 3];
        let img = vec![Vector2::new(0.0, 0.0); 3];
        assert!(matches!(
            estimate_homography(&w, &img),
            Err(SolverError::NotEnoughPoints { required: 4, found: 3 })
        ));
    }

    #[test]
    fn test_rejects_coincident_points() {
        let w = vec![Vector3::new(1.0, 1.0, 0.0); 6];
        let img: Vec<_> = (0..6).map(|i| Vector2::new(i as f64, 0.0)).collect();
        assert!(matches!(
            estimate_homography(&w, &img),
            Err(SolverError::DegenerateConfiguration(_))
        ));
    }
}

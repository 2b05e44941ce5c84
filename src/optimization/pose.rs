//! Board pose from a plane homography and known intrinsics.

use crate::camera::Intrinsics;
use crate::geometry::ViewPose;
use crate::optimization::SolverError;
use nalgebra::{Matrix3, Rotation3, Vector3};

/// Recovers the board-to-camera pose from `H = K [r1 r2 t]`.
///
/// The rotation is projected onto SO(3) with an SVD and the sign of the scale is
/// chosen so the board lies in front of the camera.
///
/// # Errors
///
/// [`SolverError::DegenerateConfiguration`] if `K` is singular or `H` has a zero column.
pub fn pose_from_homography(
    intrinsics: &Intrinsics,
    homography: &Matrix3<f64>,
) -> Result<ViewPose, SolverError> {
    let k_inv = intrinsics.matrix().try_inverse().ok_or_else(|| {
        SolverError::DegenerateConfiguration("intrinsic matrix is singular".to_string())
    })?;
    let m = k_inv * homography;

    let m1: Vector3<f64> = m.column(0).into_owned();
    let m2: Vector3<f64> = m.column(1).into_owned();
    let m3: Vector3<f64> = m.column(2).into_owned();

    let norm = (m1.norm() + m2.norm()) / 2.0;
    if norm <= f64::EPSILON {
        return Err(SolverError::DegenerateConfiguration(
            "homography has a zero column".to_string(),
        ));
    }
    let mut lambda = 1.0 / norm;
    if (m3 * lambda).z < 0.0 {
        lambda = -lambda;
    }

    let r1 = m1 * lambda;
    let r2 = m2 * lambda;
    let r3 = r1.cross(&r2);
    let translation = m3 * lambda;

    let mut approx = Matrix3::zeros();
    approx.set_column(0, &r1);
    approx.set_column(1, &r2);
    approx.set_column(2, &r3);

    let svd = approx.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => {
            return Err(SolverError::DegenerateConfiguration(
                "rotation SVD failed".to_string(),
            ))
        }
    };
    let mut rotation = u * v_t;
    if rotation.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed.set_column(2, &(-u.column(2)));
        rotation = u_fixed * v_t;
    }

    Ok(ViewPose::from_rotation_matrix(
        &Rotation3::from_matrix_unchecked(rotation),
        translation,
    ))
}

//! Closed-form intrinsic estimates from plane homographies.
//!
//! [`zhang_intrinsics`] solves for the image of the absolute conic from three
//! or more views. [`centered_intrinsics`] fixes the principal point at the
//! image centre and only solves for the focal lengths, which also works with a
//! single view. Both run on homographies pre-multiplied by a normalizing matrix
//! so the linear systems stay well conditioned.

use crate::camera::{Intrinsics, PinholeModel, Resolution};
use crate::optimization::SolverError;
use log::debug;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

/// Minimum number of views before Zhang's method is attempted.
pub const ZHANG_MIN_VIEWS: usize = 3;

/// `[[s, 0, w/2], [0, s, h/2], [0, 0, 1]]` with `s = (w + h) / 2`.
fn normalizing_matrix(resolution: Resolution) -> Matrix3<f64> {
    let w = resolution.width as f64;
    let h = resolution.height as f64;
    let s = (w + h) / 2.0;
    Matrix3::new(s, 0.0, w / 2.0, 0.0, s, h / 2.0, 0.0, 0.0, 1.0)
}

fn normalize_homographies(
    homographies: &[Matrix3<f64>],
    n: &Matrix3<f64>,
) -> Result<Vec<Matrix3<f64>>, SolverError> {
    let n_inv = n.try_inverse().ok_or_else(|| {
        SolverError::DegenerateConfiguration("image resolution is empty".to_string())
    })?;
    Ok(homographies
        .iter()
        .map(|h| {
            let hn = n_inv * h;
            let norm = hn.norm();
            if norm > f64::EPSILON {
                hn / norm
            } else {
                hn
            }
        })
        .collect())
}

/// Zhang's `v_ij` row built from homography columns `i` and `j`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> [f64; 6] {
    let hi = h.column(i);
    let hj = h.column(j);
    [
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ]
}

fn smallest_singular_vector(m: &DMatrix<f64>) -> Option<DVector<f64>> {
    let mtm = m.tr_mul(m);
    let svd = mtm.svd(false, true);
    let v_t = svd.v_t?;
    Some(v_t.row(svd.singular_values.imin()).transpose())
}

fn check_intrinsics(intrinsics: Intrinsics, method: &str) -> Result<Intrinsics, SolverError> {
    let values = [intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy];
    if values.iter().any(|v| !v.is_finite()) || intrinsics.fx <= 0.0 || intrinsics.fy <= 0.0 {
        return Err(SolverError::DegenerateConfiguration(format!(
            "{} produced invalid intrinsics {:?}",
            method, intrinsics
        )));
    }
    Ok(intrinsics)
}

/// Zhang's closed-form intrinsics with the zero-skew constraint.
///
/// # Errors
///
/// [`SolverError::NotEnoughViews`] with fewer than [`ZHANG_MIN_VIEWS`] homographies,
/// [`SolverError::DegenerateConfiguration`] when the views do not constrain the
/// conic (for example all boards parallel to the image plane).
pub fn zhang_intrinsics(
    homographies: &[Matrix3<f64>],
    resolution: Resolution,
) -> Result<Intrinsics, SolverError> {
    if homographies.len() < ZHANG_MIN_VIEWS {
        return Err(SolverError::NotEnoughViews {
            required: ZHANG_MIN_VIEWS,
            found: homographies.len(),
        });
    }

    let n = normalizing_matrix(resolution);
    let normalized = normalize_homographies(homographies, &n)?;

    let mut v = DMatrix::<f64>::zeros(2 * normalized.len() + 1, 6);
    for (k, h) in normalized.iter().enumerate() {
        let v12 = v_ij(h, 0, 1);
        let v11 = v_ij(h, 0, 0);
        let v22 = v_ij(h, 1, 1);
        for c in 0..6 {
            v[(2 * k, c)] = v12[c];
            v[(2 * k + 1, c)] = v11[c] - v22[c];
        }
    }
    // zero skew: B12 = 0
    v[(2 * normalized.len(), 1)] = 1.0;

    let b = smallest_singular_vector(&v).ok_or_else(|| {
        SolverError::DegenerateConfiguration("Zhang SVD failed".to_string())
    })?;
    let b = if b[0] < 0.0 { -b } else { b };
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    if denom.abs() < f64::EPSILON || b11.abs() < f64::EPSILON {
        return Err(SolverError::DegenerateConfiguration(
            "Zhang conic is singular".to_string(),
        ));
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    let alpha2 = lambda / b11;
    let beta2 = lambda * b11 / denom;
    if alpha2 <= 0.0 || beta2 <= 0.0 {
        return Err(SolverError::DegenerateConfiguration(
            "Zhang conic is not positive definite".to_string(),
        ));
    }
    let alpha = alpha2.sqrt();
    let beta = beta2.sqrt();
    let u0 = -b13 * alpha2 / lambda;

    let k_normalized = Matrix3::new(alpha, 0.0, u0, 0.0, beta, v0, 0.0, 0.0, 1.0);
    let intrinsics = Intrinsics::from_matrix(&(n * k_normalized));
    debug!("Zhang initial intrinsics: {:?}", intrinsics);

    check_intrinsics(intrinsics, "Zhang's method")
}

/// Focal lengths from the orthogonality and equal-norm constraints, principal
/// point at the image centre.
///
/// # Errors
///
/// [`SolverError::DegenerateConfiguration`] when every board is parallel to the image plane.
pub fn centered_intrinsics(
    homographies: &[Matrix3<f64>],
    resolution: Resolution,
) -> Result<Intrinsics, SolverError> {
    if homographies.is_empty() {
        return Err(SolverError::NotEnoughViews {
            required: 1,
            found: 0,
        });
    }

    let n = normalizing_matrix(resolution);
    let normalized = normalize_homographies(homographies, &n)?;

    let mut a = DMatrix::<f64>::zeros(2 * normalized.len(), 2);
    let mut rhs = DVector::<f64>::zeros(2 * normalized.len());
    for (k, hn) in normalized.iter().enumerate() {
        let h: Vector3<f64> = hn.column(0).into_owned();
        let v: Vector3<f64> = hn.column(1).into_owned();
        let d1 = (h + v) * 0.5;
        let d2 = (h - v) * 0.5;

        let (h, v, d1, d2) = (
            h.normalize(),
            v.normalize(),
            d1.normalize(),
            d2.normalize(),
        );

        a[(2 * k, 0)] = h.x * v.x;
        a[(2 * k, 1)] = h.y * v.y;
        rhs[2 * k] = -h.z * v.z;
        a[(2 * k + 1, 0)] = d1.x * d2.x;
        a[(2 * k + 1, 1)] = d1.y * d2.y;
        rhs[2 * k + 1] = -d1.z * d2.z;
    }

    let inv_f2 = a
        .clone()
        .svd(true, true)
        .solve(&rhs, 1e-12)
        .map_err(|e| SolverError::DegenerateConfiguration(e.to_string()))?;

    let (fx, fy) = if inv_f2[0] > 0.0 && inv_f2[1] > 0.0 {
        (1.0 / inv_f2[0].sqrt(), 1.0 / inv_f2[1].sqrt())
    } else {
        // Fall back to a single focal length for both axes
        let a_sum = a.column(0) + a.column(1);
        let denom = a_sum.norm_squared();
        let inv = if denom > f64::EPSILON {
            a_sum.dot(&rhs) / denom
        } else {
            0.0
        };
        if inv <= 0.0 {
            return Err(SolverError::DegenerateConfiguration(
                "boards are parallel to the image plane".to_string(),
            ));
        }
        let f = 1.0 / inv.sqrt();
        (f, f)
    };

    let k_normalized = Matrix3::new(fx, 0.0, 0.0, 0.0, fy, 0.0, 0.0, 0.0, 1.0);
    let intrinsics = Intrinsics::from_matrix(&(n * k_normalized));
    debug!("Centered initial intrinsics: {:?}", intrinsics);

    check_intrinsics(intrinsics, "centered estimate")
}

/// Distortion-free seed for refinement: Zhang's method when enough views are
/// available, otherwise (or if it fails) the centred estimate.
pub fn estimate_pinhole(
    homographies: &[Matrix3<f64>],
    resolution: Resolution,
) -> Result<PinholeModel, SolverError> {
    let intrinsics = if homographies.len() >= ZHANG_MIN_VIEWS {
        match zhang_intrinsics(homographies, resolution) {
            Ok(intrinsics) => intrinsics,
            Err(e) => {
                debug!("Zhang initialization failed ({}), using centered estimate", e);
                centered_intrinsics(homographies, resolution)?
            }
        }
    } else {
        centered_intrinsics(homographies, resolution)?
    };

    Ok(PinholeModel::new(intrinsics, resolution)?)
}

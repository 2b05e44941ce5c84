//! Implements the Radial-Tangential (RadTan) camera model.
//!
//! This module provides the [`RadTanModel`] struct, the model a calibration
//! run produces: a zero-skew intrinsic matrix plus the five Brown-Conrady
//! coefficients `[k1, k2, p1, p2, k3]`. It adheres to the [`CameraModel`]
//! trait defined in the parent `camera` module ([`crate::camera`]).

use crate::camera::{
    validation, CameraModel, CameraModelError, Intrinsics, PinholeModel, Resolution,
};
use nalgebra::{DVector, Matrix2, Matrix3, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of parameters in the flattened `[fx, fy, cx, cy, k1, k2, p1, p2, k3]` layout.
pub const RAD_TAN_PARAM_COUNT: usize = 9;

/// Represents a Radial-Tangential (RadTan) camera model.
///
/// The distortion coefficients are typically denoted as:
/// *   `k1`, `k2`, `k3`: Radial distortion coefficients.
/// *   `p1`, `p2`: Tangential distortion coefficients.
///
/// # Examples
///
/// ```rust
/// use nalgebra::DVector;
/// use chessboard_calib::camera::rad_tan::RadTanModel;
/// use chessboard_calib::camera::Resolution;
///
/// // Parameters: fx, fy, cx, cy, k1, k2, p1, p2, k3
/// let params = DVector::from_vec(vec![
///     500.0, 500.0, 320.0, 240.0, // Intrinsics
///     0.1, -0.05, 0.001, 0.001, 0.02 // Distortion (k1, k2, p1, p2, k3)
/// ]);
/// let resolution = Resolution { width: 640, height: 480 };
/// let rad_tan_model = RadTanModel::new(&params, resolution).unwrap();
///
/// assert_eq!(rad_tan_model.intrinsics.fx, 500.0);
/// assert_eq!(rad_tan_model.distortions[0], 0.1); // k1
/// assert_eq!(rad_tan_model.intrinsic_matrix()[(0, 2)], 320.0);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct RadTanModel {
    /// The intrinsic parameters of the camera, [`Intrinsics`] (fx, fy, cx, cy).
    pub intrinsics: Intrinsics,
    /// The resolution of the camera image, [`Resolution`] (width, height).
    pub resolution: Resolution,
    /// The 5 distortion coefficients: `[k1, k2, p1, p2, k3]`.
    pub distortions: [f64; 5],
}

impl RadTanModel {
    /// Creates a new [`RadTanModel`] from a vector of parameters.
    ///
    /// # Arguments
    ///
    /// * `parameters` - A `&DVector<f64>` containing the camera parameters in the order:
    ///   `fx, fy, cx, cy, k1, k2, p1, p2, k3`.
    /// * `resolution` - The image size the parameters were estimated for.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidParams`] if `parameters` does not hold exactly 9 values.
    /// * [`CameraModelError::FocalLengthMustBePositive`]
    /// * [`CameraModelError::PrincipalPointMustBeFinite`]
    /// * [`CameraModelError::DistortionMustBeFinite`]
    pub fn new(parameters: &DVector<f64>, resolution: Resolution) -> Result<Self, CameraModelError> {
        if parameters.len() != RAD_TAN_PARAM_COUNT {
            return Err(CameraModelError::InvalidParams(format!(
                "Expected {} RadTan parameters, got {}",
                RAD_TAN_PARAM_COUNT,
                parameters.len()
            )));
        }

        let model = RadTanModel {
            intrinsics: Intrinsics {
                fx: parameters[0],
                fy: parameters[1],
                cx: parameters[2],
                cy: parameters[3],
            },
            resolution,
            distortions: [
                parameters[4], // k1
                parameters[5], // k2
                parameters[6], // p1
                parameters[7], // p2
                parameters[8], // k3
            ],
        };

        model.validate_params()?;
        Ok(model)
    }

    /// Promotes a distortion-free estimate, starting every coefficient at zero.
    pub fn from_pinhole(pinhole: &PinholeModel) -> Self {
        RadTanModel {
            intrinsics: pinhole.get_intrinsics(),
            resolution: pinhole.get_resolution(),
            distortions: [0.0; 5],
        }
    }

    /// Flattens the model into `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`.
    pub fn parameters(&self) -> DVector<f64> {
        DVector::from_vec(vec![
            self.intrinsics.fx,
            self.intrinsics.fy,
            self.intrinsics.cx,
            self.intrinsics.cy,
            self.distortions[0],
            self.distortions[1],
            self.distortions[2],
            self.distortions[3],
            self.distortions[4],
        ])
    }

    /// The 3x3 intrinsic matrix (skew is always zero for this model).
    pub fn intrinsic_matrix(&self) -> Matrix3<f64> {
        self.intrinsics.matrix()
    }

    /// Applies radial and tangential distortion to a point on the normalized image plane.
    pub fn distort_normalized(&self, point: &Vector2<f64>) -> Vector2<f64> {
        let [k1, k2, p1, p2, k3] = self.distortions;
        let x = point.x;
        let y = point.y;

        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;

        Vector2::new(
            x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x),
            y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y,
        )
    }

    /// Maps a normalized point to pixel coordinates through distortion and `K`,
    /// without checking the image bounds.
    pub fn project_normalized(&self, point: &Vector2<f64>) -> Vector2<f64> {
        let distorted = self.distort_normalized(point);
        Vector2::new(
            self.intrinsics.fx * distorted.x + self.intrinsics.cx,
            self.intrinsics.fy * distorted.y + self.intrinsics.cy,
        )
    }

    /// Inverts [`RadTanModel::distort_normalized`] with Newton iterations.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::NumericalError`] when the Jacobian becomes singular or the
    /// iteration does not converge.
    pub fn undistort_normalized(
        &self,
        distorted: &Vector2<f64>,
    ) -> Result<Vector2<f64>, CameraModelError> {
        const EPS: f64 = 1e-10;
        const MAX_ITERATIONS: u32 = 100;

        let [k1, k2, p1, p2, k3] = self.distortions;

        // Start from the distorted point itself
        let mut point = *distorted;

        for _ in 0..MAX_ITERATIONS {
            let error = self.distort_normalized(&point) - distorted;
            if error.norm() < EPS {
                return Ok(point);
            }

            let x = point.x;
            let y = point.y;
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r4 * r2;
            // d(radial)/d(r2)
            let d_radial = k1 + 2.0 * k2 * r2 + 3.0 * k3 * r4;

            let j00 = radial + 2.0 * x * x * d_radial + 2.0 * p1 * y + 6.0 * p2 * x;
            let j01 = 2.0 * x * y * d_radial + 2.0 * p1 * x + 2.0 * p2 * y;
            let j10 = 2.0 * x * y * d_radial + 2.0 * p1 * x + 2.0 * p2 * y;
            let j11 = radial + 2.0 * y * y * d_radial + 6.0 * p1 * y + 2.0 * p2 * x;

            let jacobian = Matrix2::new(j00, j01, j10, j11);
            let delta = jacobian.try_inverse().ok_or_else(|| {
                CameraModelError::NumericalError("Jacobian is singular".to_string())
            })? * error;

            point -= delta;

            if delta.norm() < EPS {
                return Ok(point);
            }
        }

        Err(CameraModelError::NumericalError(format!(
            "Undistortion did not converge after {} iterations",
            MAX_ITERATIONS
        )))
    }
}

/// Provides a debug string representation for [`RadTanModel`].
impl fmt::Debug for RadTanModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RadTanModel [fx: {} fy: {} cx: {} cy: {} distortions: {:?} resolution: {}]",
            self.intrinsics.fx,
            self.intrinsics.fy,
            self.intrinsics.cx,
            self.intrinsics.cy,
            self.distortions,
            self.resolution,
        )
    }
}

impl CameraModel for RadTanModel {
    /// Checks the intrinsics and that every distortion coefficient is finite.
    fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_intrinsics(&self.intrinsics)?;
        validation::validate_distortion(&self.distortions)
    }

    fn get_resolution(&self) -> Resolution {
        self.resolution
    }

    fn get_intrinsics(&self) -> Intrinsics {
        self.intrinsics.clone()
    }
}

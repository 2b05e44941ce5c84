//! Rigid-body helpers and reprojection statistics.

use crate::camera::RadTanModel;
use crate::pattern::CalibrationSet;
use nalgebra::{Isometry3, RealField, Rotation3, Translation3, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum GeometryError {
    #[error("Zero projection points")]
    ZeroProjectionPoints,
    #[error("Expected {expected} view poses, got {found}")]
    PoseCountMismatch { expected: usize, found: usize },
}

/// Board-to-camera transform of one calibration view.
///
/// `rotation` is an axis-angle vector (direction is the axis, norm the angle in radians).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewPose {
    pub rotation: Vector3<f64>,
    pub translation: Vector3<f64>,
}

impl ViewPose {
    pub fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        ViewPose {
            rotation,
            translation,
        }
    }

    pub fn from_rotation_matrix(rotation: &Rotation3<f64>, translation: Vector3<f64>) -> Self {
        ViewPose {
            rotation: rotation.scaled_axis(),
            translation,
        }
    }

    /// Reads `[rx, ry, rz, tx, ty, tz]`.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        if values.len() != 6 {
            return None;
        }
        Some(ViewPose {
            rotation: Vector3::new(values[0], values[1], values[2]),
            translation: Vector3::new(values[3], values[4], values[5]),
        })
    }

    /// Flattens the pose into `[rx, ry, rz, tx, ty, tz]`.
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
            self.translation.x,
            self.translation.y,
            self.translation.z,
        ]
    }

    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.translation),
            UnitQuaternion::from_scaled_axis(self.rotation),
        )
    }

    /// Maps a board point into the camera frame.
    pub fn transform(&self, point: &Vector3<f64>) -> Vector3<f64> {
        rotate_axis_angle(&self.rotation, point) + self.translation
    }
}

/// Rotates `point` by the axis-angle vector `omega` (Rodrigues' formula).
///
/// Generic over the scalar so the same code runs on `f64` and on the dual numbers
/// used for automatic differentiation.
pub fn rotate_axis_angle<T: RealField>(omega: &Vector3<T>, point: &Vector3<T>) -> Vector3<T> {
    let theta2 = omega.norm_squared();
    let small: T = nalgebra::convert(1e-12);

    if theta2 > small {
        let theta = theta2.sqrt();
        let axis = omega / theta.clone();
        let (sin, cos) = theta.sin_cos();
        let one = T::one();

        let axis_cross = axis.cross(point);
        let axis_dot = axis.dot(point);

        point * cos.clone() + axis_cross * sin + axis * (axis_dot * (one - cos))
    } else {
        // First-order expansion near the identity
        point + omega.cross(point)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProjectionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl fmt::Debug for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Projection Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}

impl ProjectionError {
    /// Summarizes per-point reprojection distances in pixels.
    pub fn from_errors(errors: &[f64]) -> Result<Self, GeometryError> {
        if errors.is_empty() {
            return Err(GeometryError::ZeroProjectionPoints);
        }

        let n = errors.len() as f64;
        let mean = errors.iter().sum::<f64>() / n;

        let variance = errors.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let stddev = variance.sqrt();

        let rmse = (errors.iter().map(|x| x.powi(2)).sum::<f64>() / n).sqrt();

        let min = errors.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = errors.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        let mut sorted_errors = errors.to_vec();
        sorted_errors.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted_errors.len() / 2;
        let median = if sorted_errors.len() % 2 == 0 {
            (sorted_errors[mid - 1] + sorted_errors[mid]) / 2.0
        } else {
            sorted_errors[mid]
        };

        Ok(ProjectionError {
            rmse,
            min,
            max,
            mean,
            stddev,
            median,
        })
    }
}

/// Pixel distance between every observed corner and its reprojection through
/// `model` and the matching view pose.
pub fn reprojection_distances(
    model: &RadTanModel,
    set: &CalibrationSet,
    poses: &[ViewPose],
) -> Result<Vec<f64>, GeometryError> {
    if poses.len() != set.len() {
        return Err(GeometryError::PoseCountMismatch {
            expected: set.len(),
            found: poses.len(),
        });
    }

    let mut errors = Vec::with_capacity(set.len() * set.template().len());
    for (detection, pose) in set.detections().iter().zip(poses) {
        for (object, observed) in detection.correspondences() {
            let camera_point = pose.transform(object);
            if camera_point.z <= f64::EPSILON {
                continue;
            }
            let normalized = Vector2::new(
                camera_point.x / camera_point.z,
                camera_point.y / camera_point.z,
            );
            let projected = model.project_normalized(&normalized);
            errors.push((projected - observed).norm());
        }
    }
    Ok(errors)
}

pub fn compute_reprojection_error(
    model: &RadTanModel,
    set: &CalibrationSet,
    poses: &[ViewPose],
) -> Result<ProjectionError, GeometryError> {
    let errors = reprojection_distances(model, set, poses)?;
    ProjectionError::from_errors(&errors)
}
